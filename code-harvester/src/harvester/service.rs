//! Code harvesting.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::client::{ClientError, ClientFactory, MessagingClient, disconnect_quietly};
use crate::config::DEFAULT_OFFICIAL_SENDER_ID;
use crate::database::models::{AccountDbModel, VerificationCodeDbModel};
use crate::database::repositories::{AccountRepository, VerificationCodeRepository};
use crate::database::retry::retry_on_sqlite_busy;
use crate::database::time::window_start_ms;
use crate::session::{AccountLocks, canonical_phone, mask_phone};

use super::extract_codes;
use super::summary::{AccountRunResult, BatchSummary, RunStatus};

/// Harvest tuning.
#[derive(Debug, Clone)]
pub struct HarvestConfig {
    /// Messages older than this are ignored, and a code seen within it is a duplicate.
    pub dedup_window: Duration,
    /// How many of the newest messages are scanned.
    pub scan_limit: usize,
    /// Source tag stored with every code.
    pub service_tag: String,
    /// Account id that delivers login codes.
    pub sender_id: i64,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            dedup_window: Duration::from_secs(30 * 60),
            scan_limit: 10,
            service_tag: "telegram".to_string(),
            sender_id: DEFAULT_OFFICIAL_SENDER_ID,
        }
    }
}

/// Result of checking one account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum HarvestOutcome {
    /// The session is authorized and its messages were scanned.
    Scanned {
        /// Valid matches seen, recorded or not.
        matches: usize,
        /// Matches that were new and got inserted.
        inserted: usize,
    },
    /// The session is no longer signed in. Nothing was scanned.
    Invalidated,
    /// The check could not complete; treated as zero codes.
    Failed { reason: String },
}

impl HarvestOutcome {
    /// Match count, or `None` when the session was invalidated.
    pub fn count(&self) -> Option<usize> {
        match self {
            Self::Scanned { matches, .. } => Some(*matches),
            Self::Failed { .. } => Some(0),
            Self::Invalidated => None,
        }
    }

    pub fn inserted(&self) -> usize {
        match self {
            Self::Scanned { inserted, .. } => *inserted,
            _ => 0,
        }
    }
}

#[derive(Debug, Error)]
enum ScanError {
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Store(#[from] crate::Error),
}

/// Scans sessions for codes from the official sender and records new ones.
///
/// Only [`sync_account`](Self::sync_account) and the batch cycle touch the
/// account's active flag; [`check_account`](Self::check_account) itself never
/// mutates accounts.
pub struct CodeHarvester {
    clients: Arc<dyn ClientFactory>,
    accounts: Arc<dyn AccountRepository>,
    codes: Arc<dyn VerificationCodeRepository>,
    locks: Arc<AccountLocks>,
    config: HarvestConfig,
}

impl CodeHarvester {
    pub fn new(
        clients: Arc<dyn ClientFactory>,
        accounts: Arc<dyn AccountRepository>,
        codes: Arc<dyn VerificationCodeRepository>,
        locks: Arc<AccountLocks>,
        config: HarvestConfig,
    ) -> Self {
        Self {
            clients,
            accounts,
            codes,
            locks,
            config,
        }
    }

    pub fn config(&self) -> &HarvestConfig {
        &self.config
    }

    /// Scan one session for codes.
    ///
    /// Without `account_id` the account is looked up by phone. Codes are only
    /// recorded against a known account; a session with no account is scanned
    /// and its matches counted, but nothing is inserted.
    ///
    /// Serialized per account. Errors other than an explicit unauthorized
    /// signal degrade to [`HarvestOutcome::Failed`].
    #[instrument(skip(self), fields(phone = %mask_phone(phone)))]
    pub async fn check_account(
        &self,
        phone: &str,
        session_name: &str,
        account_id: Option<&str>,
    ) -> HarvestOutcome {
        let account_id = match account_id {
            Some(id) => Some(id.to_string()),
            None => match self.accounts.find_by_phone(&canonical_phone(phone)).await {
                Ok(account) => account.map(|a| a.id),
                Err(e) => {
                    warn!(error = %e, "Account lookup failed");
                    return HarvestOutcome::Failed {
                        reason: e.to_string(),
                    };
                }
            },
        };
        let _guard = self
            .locks
            .acquire(account_id.as_deref().unwrap_or(session_name))
            .await;

        let mut client = self.clients.create(session_name);
        let scanned = self
            .scan(client.as_mut(), phone, account_id.as_deref())
            .await;
        disconnect_quietly(client.as_mut(), session_name).await;

        match scanned {
            Ok(outcome) => {
                if let HarvestOutcome::Scanned { matches, inserted } = &outcome {
                    if *inserted > 0 {
                        info!(matches, inserted, "Recorded new codes");
                    } else {
                        debug!(matches, "No new codes");
                    }
                }
                outcome
            }
            Err(ScanError::Client(e)) if e.is_unauthorized() => {
                info!("Session is no longer authorized");
                HarvestOutcome::Invalidated
            }
            Err(ScanError::Client(e)) if e.is_transient() => {
                info!(error = %e, "Code check failed, will retry next cycle");
                HarvestOutcome::Failed {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                warn!(error = %e, "Code check failed");
                HarvestOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    async fn scan(
        &self,
        client: &mut dyn MessagingClient,
        phone: &str,
        account_id: Option<&str>,
    ) -> Result<HarvestOutcome, ScanError> {
        client.connect().await?;
        if !client.is_authorized().await? {
            info!("Session is no longer authorized");
            return Ok(HarvestOutcome::Invalidated);
        }

        let messages = client
            .recent_messages(self.config.sender_id, self.config.scan_limit)
            .await?;

        let now = Utc::now();
        let since_ms = window_start_ms(now, self.config.dedup_window);
        let mut matches = 0;
        let mut inserted = 0;

        for message in messages
            .iter()
            .filter(|m| m.date.timestamp_millis() >= since_ms)
        {
            for code in extract_codes(&message.text) {
                matches += 1;
                let Some(account_id) = account_id else {
                    continue;
                };
                if self
                    .codes
                    .exists_since(Some(account_id), phone, code, since_ms)
                    .await?
                {
                    continue;
                }

                let record = VerificationCodeDbModel::new(
                    Some(account_id.to_string()),
                    phone,
                    code,
                    message.text.as_str(),
                    Some(self.config.service_tag.clone()),
                    message.date,
                );
                retry_on_sqlite_busy("insert_verification_code", || self.codes.create(&record))
                    .await?;
                inserted += 1;
            }
        }

        if account_id.is_none() && matches > 0 {
            debug!(matches, "No account for this session, codes not recorded");
        }
        Ok(HarvestOutcome::Scanned { matches, inserted })
    }

    /// Check an account and apply the active-flag policy.
    ///
    /// `Invalidated` deactivates the account; an authorized scan reactivates
    /// it. A failed check leaves the flag alone.
    pub async fn sync_account(&self, account: &AccountDbModel) -> HarvestOutcome {
        let outcome = self
            .check_account(&account.phone, &account.session_name, Some(account.id.as_str()))
            .await;

        let wanted = match &outcome {
            HarvestOutcome::Invalidated => Some(false),
            HarvestOutcome::Scanned { .. } => Some(true),
            HarvestOutcome::Failed { .. } => None,
        };

        if let Some(active) = wanted.filter(|a| *a != account.is_active) {
            match self.accounts.set_active(&account.id, active).await {
                Ok(()) => info!(
                    account_id = %account.id,
                    phone = %mask_phone(&account.phone),
                    is_active = active,
                    "Account active flag changed"
                ),
                Err(e) => warn!(
                    account_id = %account.id,
                    error = %e,
                    "Failed to update account active flag"
                ),
            }
        }

        outcome
    }

    /// Check every active account, one at a time.
    pub async fn check_all_accounts(&self) -> crate::Result<BatchSummary> {
        let started = Instant::now();
        let accounts = self.accounts.list_active().await?;
        let mut summary = BatchSummary::new("harvest");

        for account in &accounts {
            let outcome = self.sync_account(account).await;
            let new_codes = outcome.inserted();
            let status = match outcome {
                HarvestOutcome::Scanned { .. } => RunStatus::Succeeded,
                HarvestOutcome::Invalidated => RunStatus::Unauthorized,
                HarvestOutcome::Failed { reason } => RunStatus::Failed { reason },
            };
            summary.push(AccountRunResult {
                account_id: account.id.clone(),
                phone: account.phone.clone(),
                status,
                new_codes,
            });
        }

        self.locks.prune();
        summary.elapsed = started.elapsed();
        Ok(summary)
    }
}

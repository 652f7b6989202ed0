//! Session keep-alive.
//!
//! A session left idle long enough expires upstream. Every few days each
//! active account makes one cheap authorized call to reset that clock.
//!
//! Unlike the harvester, this worker never changes an account's active flag,
//! even when it sees an unauthorized session. Deactivation is reserved for the
//! harvest path so that a single policy owns it.

use std::sync::Arc;

use tokio::time::Instant;
use tracing::{Instrument, debug, info, info_span, instrument, warn};

use crate::client::{ClientError, ClientFactory, MessagingClient, disconnect_quietly};
use crate::database::repositories::AccountRepository;
use crate::harvester::{AccountRunResult, BatchSummary, RunStatus};
use crate::session::{AccountLocks, canonical_phone, mask_phone};

/// Result of touching one session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeepAliveOutcome {
    Alive { user_id: i64 },
    Unauthorized,
    Failed { reason: String },
}

pub struct KeepAliveWorker {
    clients: Arc<dyn ClientFactory>,
    accounts: Arc<dyn AccountRepository>,
    locks: Arc<AccountLocks>,
}

impl KeepAliveWorker {
    pub fn new(
        clients: Arc<dyn ClientFactory>,
        accounts: Arc<dyn AccountRepository>,
        locks: Arc<AccountLocks>,
    ) -> Self {
        Self {
            clients,
            accounts,
            locks,
        }
    }

    /// Connect, confirm authorization and fetch the signed-in identity.
    ///
    /// Holds the account's lock, found by phone, for the whole call.
    /// Failures are logged and reported, never propagated.
    #[instrument(skip(self), fields(phone = %mask_phone(phone)))]
    pub async fn touch(&self, phone: &str, session_name: &str) -> KeepAliveOutcome {
        let key = match self.accounts.find_by_phone(&canonical_phone(phone)).await {
            Ok(Some(account)) => account.id,
            Ok(None) => session_name.to_string(),
            Err(e) => {
                warn!(error = %e, "Account lookup failed");
                return KeepAliveOutcome::Failed {
                    reason: e.to_string(),
                };
            }
        };
        self.touch_locked(&key, session_name).await
    }

    async fn touch_locked(&self, lock_key: &str, session_name: &str) -> KeepAliveOutcome {
        let _guard = self.locks.acquire(lock_key).await;

        let mut client = self.clients.create(session_name);
        let result = ping(client.as_mut()).await;
        disconnect_quietly(client.as_mut(), session_name).await;

        match result {
            Ok(Some(user_id)) => {
                debug!(user_id, "Session alive");
                KeepAliveOutcome::Alive { user_id }
            }
            Ok(None) => {
                warn!("Session is not authorized");
                KeepAliveOutcome::Unauthorized
            }
            Err(e) if e.is_unauthorized() => {
                warn!("Session is not authorized");
                KeepAliveOutcome::Unauthorized
            }
            Err(e) => {
                warn!(error = %e, "Keep-alive failed");
                KeepAliveOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    /// Touch every active account, one at a time.
    pub async fn keep_alive_all_accounts(&self) -> crate::Result<BatchSummary> {
        let started = Instant::now();
        let accounts = self.accounts.list_active().await?;
        info!(accounts = accounts.len(), "Starting keep-alive cycle");

        let mut summary = BatchSummary::new("keep_alive");
        for account in &accounts {
            let outcome = self
                .touch_locked(&account.id, &account.session_name)
                .instrument(info_span!("touch", phone = %mask_phone(&account.phone)))
                .await;
            let status = match outcome {
                KeepAliveOutcome::Alive { .. } => RunStatus::Succeeded,
                KeepAliveOutcome::Unauthorized => RunStatus::Unauthorized,
                KeepAliveOutcome::Failed { reason } => RunStatus::Failed { reason },
            };
            summary.push(AccountRunResult {
                account_id: account.id.clone(),
                phone: account.phone.clone(),
                status,
                new_codes: 0,
            });
        }

        self.locks.prune();
        summary.elapsed = started.elapsed();
        Ok(summary)
    }
}

async fn ping(client: &mut dyn MessagingClient) -> Result<Option<i64>, ClientError> {
    client.connect().await?;
    if !client.is_authorized().await? {
        return Ok(None);
    }
    Ok(Some(client.get_self().await?.id))
}

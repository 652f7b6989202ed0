//! Owner-facing account operations.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, instrument, warn};

use crate::database::models::{AccountDbModel, VerificationCodeDbModel};
use crate::database::repositories::{AccountRepository, VerificationCodeRepository};
use crate::database::time::window_start_ms;
use crate::harvester::{CodeHarvester, HarvestOutcome};
use crate::login::{LoginError, LoginOrchestrator};
use crate::session::{AccountLocks, canonical_phone, mask_phone, user_session_name};
use crate::{Error, Result};

/// Default look-back for [`AccountService::list_codes`].
pub const DEFAULT_CODE_LOOKBACK_HOURS: u32 = 24;

/// Default cap for [`AccountService::list_codes`].
pub const DEFAULT_CODE_LIST_LIMIT: u32 = 100;

/// Account lifecycle as seen by the platform user who owns the accounts.
///
/// Every lookup by account id is owner-scoped: an account owned by someone
/// else is reported as not found.
pub struct AccountService {
    login: Arc<LoginOrchestrator>,
    harvester: Arc<CodeHarvester>,
    accounts: Arc<dyn AccountRepository>,
    codes: Arc<dyn VerificationCodeRepository>,
    locks: Arc<AccountLocks>,
}

impl AccountService {
    pub fn new(
        login: Arc<LoginOrchestrator>,
        harvester: Arc<CodeHarvester>,
        accounts: Arc<dyn AccountRepository>,
        codes: Arc<dyn VerificationCodeRepository>,
        locks: Arc<AccountLocks>,
    ) -> Self {
        Self {
            login,
            harvester,
            accounts,
            codes,
            locks,
        }
    }

    pub async fn send_verification_code(&self, phone: &str) -> std::result::Result<(), LoginError> {
        self.login.send_verification_code(phone).await
    }

    /// Finish a login and attach (or re-attach) the account to `owner_id`.
    ///
    /// A re-login keeps the account row, points it at the new session and
    /// reactivates it. If the login cannot be attached to `owner_id`, the
    /// pending attempt is torn down before the error is returned.
    #[instrument(skip(self, code, password), fields(phone = %mask_phone(phone)))]
    pub async fn complete_login(
        &self,
        owner_id: &str,
        phone: &str,
        code: &str,
        password: Option<&str>,
    ) -> std::result::Result<AccountDbModel, LoginError> {
        let phone = canonical_phone(phone);
        let existing = match self.attach_target(owner_id, &phone).await {
            Ok(existing) => existing,
            Err(e) => {
                self.login.cancel(&phone).await;
                return Err(e);
            }
        };

        let target = user_session_name(owner_id, &phone);
        // No other connection may use the account's blob while it is replaced.
        let _guard = self
            .locks
            .acquire(existing.as_ref().map_or(target.as_str(), |a| a.id.as_str()))
            .await;
        let session_name = self
            .login
            .verify_and_create_session(&phone, code, password, Some(&target))
            .await?;

        match existing {
            Some(account) => {
                if account.session_name != session_name {
                    if let Err(e) = self.login.delete_session(&account.session_name).await {
                        warn!(session = %account.session_name, error = %e, "Failed to delete superseded session");
                    }
                }
                self.accounts
                    .replace_session(&account.id, &session_name)
                    .await?;
                info!(account_id = %account.id, "Account re-attached");
                Ok(self.accounts.get(&account.id).await?)
            }
            None => {
                let account = AccountDbModel::new(&phone, &session_name, owner_id);
                if let Err(e) = self.accounts.create(&account).await {
                    // Do not leave a published session without an account.
                    if let Err(del) = self.login.delete_session(&session_name).await {
                        warn!(session = %session_name, error = %del, "Failed to delete orphaned session");
                    }
                    return Err(e.into());
                }
                info!(account_id = %account.id, "Account attached");
                Ok(account)
            }
        }
    }

    /// The existing account for `phone`, if any, after checking `owner_id` may attach it.
    async fn attach_target(
        &self,
        owner_id: &str,
        phone: &str,
    ) -> std::result::Result<Option<AccountDbModel>, LoginError> {
        validate_owner_id(owner_id)?;
        let existing = self.accounts.find_by_phone(phone).await?;
        if existing.as_ref().is_some_and(|a| !a.is_owned_by(owner_id)) {
            warn!("Phone is attached to another owner");
            return Err(LoginError::PhoneOwnedElsewhere);
        }
        Ok(existing)
    }

    pub async fn list_accounts(&self, owner_id: &str) -> Result<Vec<AccountDbModel>> {
        self.accounts.list_by_owner(owner_id).await
    }

    /// Run a manual code check, applying the active-flag policy.
    pub async fn check_account(&self, owner_id: &str, account_id: &str) -> Result<HarvestOutcome> {
        let account = self.owned(owner_id, account_id).await?;
        Ok(self.harvester.sync_account(&account).await)
    }

    /// Delete the account, its codes and its session blob.
    #[instrument(skip(self))]
    pub async fn delete_account(&self, owner_id: &str, account_id: &str) -> Result<()> {
        let account = self.owned(owner_id, account_id).await?;
        let _guard = self.locks.acquire(&account.id).await;

        let codes = self.codes.delete_for_account(&account.id).await?;
        self.accounts.delete(&account.id).await?;
        if let Err(e) = self.login.delete_session(&account.session_name).await {
            warn!(session = %account.session_name, error = %e, "Failed to delete session blob");
        }

        info!(phone = %mask_phone(&account.phone), codes, "Account deleted");
        Ok(())
    }

    /// Codes received in the last `hours` across the owner's accounts, newest first.
    pub async fn list_codes(
        &self,
        owner_id: &str,
        hours: u32,
        limit: u32,
    ) -> Result<Vec<VerificationCodeDbModel>> {
        let since = window_start_ms(Utc::now(), Duration::from_secs(u64::from(hours) * 3600));
        self.codes
            .list_for_owner_since(owner_id, since, i64::from(limit))
            .await
    }

    pub async fn latest_code(&self, owner_id: &str, phone: &str) -> Result<VerificationCodeDbModel> {
        let phone = canonical_phone(phone);
        self.codes
            .latest_for_phone(owner_id, &phone)
            .await?
            .ok_or_else(|| Error::not_found("VerificationCode", phone))
    }

    /// Delete every code of one account. Returns the number removed.
    pub async fn clear_codes(&self, owner_id: &str, account_id: &str) -> Result<u64> {
        let account = self.owned(owner_id, account_id).await?;
        self.codes.delete_for_account(&account.id).await
    }

    async fn owned(&self, owner_id: &str, account_id: &str) -> Result<AccountDbModel> {
        let account = self.accounts.get(account_id).await?;
        if !account.is_owned_by(owner_id) {
            return Err(Error::not_found("Account", account_id));
        }
        Ok(account)
    }
}

/// Owner ids become part of session names.
fn validate_owner_id(owner_id: &str) -> Result<()> {
    let valid = !owner_id.is_empty()
        && owner_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-');
    if !valid {
        return Err(Error::validation(format!("invalid owner id {owner_id:?}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_owner_id_validation() {
        assert!(validate_owner_id("42").is_ok());
        assert!(validate_owner_id("9b1c-77aa").is_ok());
        assert!(validate_owner_id("").is_err());
        assert!(validate_owner_id("../x").is_err());
        assert!(validate_owner_id("a_b").is_err());
    }
}

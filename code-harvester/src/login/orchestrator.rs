//! Phone-code login handshake.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::client::{ClientError, ClientFactory, disconnect_quietly};
use crate::session::{
    SessionStore, default_session_name, mask_phone, normalize_phone, temp_session_name,
};

use super::{
    CredentialCache, CredentialCacheConfig, DuplicateLoginPolicy, LoginError, LoginState,
    PendingLogin,
};

/// Drives the phone-code (and optional password) handshake.
///
/// At most one attempt per phone exists at a time. Operations on the same
/// phone are serialized by a per-phone lock, so duplicate handling under the
/// configured [`DuplicateLoginPolicy`] is deterministic.
pub struct LoginOrchestrator {
    clients: Arc<dyn ClientFactory>,
    store: Arc<dyn SessionStore>,
    cache: CredentialCache,
    policy: DuplicateLoginPolicy,
    phone_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl LoginOrchestrator {
    pub fn new(
        clients: Arc<dyn ClientFactory>,
        store: Arc<dyn SessionStore>,
        cache_config: CredentialCacheConfig,
        policy: DuplicateLoginPolicy,
    ) -> Self {
        Self {
            clients,
            store,
            cache: CredentialCache::new(cache_config),
            policy,
            phone_locks: DashMap::new(),
        }
    }

    pub fn policy(&self) -> DuplicateLoginPolicy {
        self.policy
    }

    /// State of the pending login for `phone`, if any.
    pub fn pending_state(&self, phone: &str) -> Option<LoginState> {
        self.cache.state(&normalize_phone(phone))
    }

    pub fn pending_count(&self) -> usize {
        self.cache.len()
    }

    fn phone_lock(&self, key: &str) -> Arc<Mutex<()>> {
        self.phone_locks
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Start a login: connect on the temporary blob and request a code.
    #[instrument(skip(self), fields(phone = %mask_phone(phone)))]
    pub async fn send_verification_code(&self, phone: &str) -> Result<(), LoginError> {
        let key = validate_phone(phone)?;
        let lock = self.phone_lock(&key);
        let _guard = lock.lock().await;

        if let Some(existing) = self.cache.take(&key) {
            match self.policy {
                DuplicateLoginPolicy::Reject => {
                    // Put it back untouched; the first attempt stays in charge.
                    if let Err(existing) = self.cache.insert(&key, existing) {
                        self.abandon(existing).await;
                    }
                    warn!("Login already in progress, rejecting");
                    return Err(LoginError::LoginInProgress);
                }
                DuplicateLoginPolicy::Supersede => {
                    info!(previous_state = %existing.state(), "Superseding pending login");
                    self.abandon(existing).await;
                }
            }
        }

        let session_name = temp_session_name(phone);
        // A leftover from a failed finalization is replaced.
        self.store.delete(&session_name).await?;

        let mut entry = PendingLogin::new(phone, &session_name, self.clients.create(&session_name));

        let requested = async {
            entry.client.connect().await?;
            entry.client.request_code(phone).await
        }
        .await;

        if let Err(e) = requested {
            warn!(error = %e, "Failed to request login code");
            self.abandon(entry).await;
            return Err(LoginError::SendFailed(e));
        }

        entry.transition(LoginState::CodeRequested);
        entry.touch();

        if let Err(entry) = self.cache.insert(&key, entry) {
            warn!(
                capacity = self.cache.config().capacity,
                "Too many pending logins"
            );
            self.abandon(entry).await;
            return Err(LoginError::RateLimited {
                retry_after_secs: None,
            });
        }

        info!("Login code requested");
        Ok(())
    }

    /// Complete the pending login and publish its session blob.
    ///
    /// Returns the final session name: `target_name` if given, otherwise the
    /// normalized phone. On `PasswordRequired` the pending login is kept so
    /// the caller can retry with a password; every other failure tears it down.
    #[instrument(skip(self, code, password), fields(phone = %mask_phone(phone)))]
    pub async fn verify_and_create_session(
        &self,
        phone: &str,
        code: &str,
        password: Option<&str>,
        target_name: Option<&str>,
    ) -> Result<String, LoginError> {
        let key = normalize_phone(phone);
        let lock = self.phone_lock(&key);
        let _guard = lock.lock().await;

        let mut entry = self.cache.take(&key).ok_or(LoginError::NoPendingLogin)?;
        entry.touch();

        let signed_in = match entry.state() {
            LoginState::AwaitingPassword => match password {
                Some(password) => entry.client.check_password(password).await,
                None => {
                    self.keep_pending(&key, entry).await;
                    return Err(LoginError::PasswordRequired);
                }
            },
            _ => match entry.client.sign_in(phone, code).await {
                Err(ClientError::PasswordRequired) => match password {
                    Some(password) => entry.client.check_password(password).await,
                    None => {
                        debug!("Second factor required");
                        entry.transition(LoginState::AwaitingPassword);
                        self.keep_pending(&key, entry).await;
                        return Err(LoginError::PasswordRequired);
                    }
                },
                other => other,
            },
        };

        if let Err(e) = signed_in {
            return Err(self.fail(entry, e).await);
        }
        entry.transition(LoginState::Authenticated);

        // Disconnect persists the authorized blob under the temporary name.
        if let Err(e) = entry.client.disconnect().await {
            return Err(self.fail(entry, e).await);
        }

        let final_name = target_name
            .map(str::to_string)
            .unwrap_or_else(|| default_session_name(phone));

        if final_name != entry.session_name {
            if let Err(e) = self.store.rename(&entry.session_name, &final_name).await {
                // Keep the temporary blob; the next attempt for this phone replaces it.
                warn!(
                    error = %e,
                    from = %entry.session_name,
                    to = %final_name,
                    "Failed to publish session"
                );
                return Err(LoginError::Storage(e));
            }
        }

        entry.transition(LoginState::Finalized);
        info!(session = %final_name, "Login finalized");
        Ok(final_name)
    }

    /// Tear down the pending login for `phone`, if any.
    ///
    /// Used when a caller refuses to complete a login it cannot attach.
    /// Returns whether an attempt was abandoned.
    #[instrument(skip(self), fields(phone = %mask_phone(phone)))]
    pub async fn cancel(&self, phone: &str) -> bool {
        let key = normalize_phone(phone);
        let lock = self.phone_lock(&key);
        let _guard = lock.lock().await;

        match self.cache.take(&key) {
            Some(mut entry) => {
                entry.transition(LoginState::Failed);
                self.abandon(entry).await;
                info!("Pending login cancelled");
                true
            }
            None => false,
        }
    }

    /// Remove a session blob. Absence is not an error.
    pub async fn delete_session(&self, session_name: &str) -> crate::Result<bool> {
        let existed = self.store.delete(session_name).await?;
        if existed {
            debug!(session = %session_name, "Deleted session");
        }
        Ok(existed)
    }

    /// Abandon logins idle past the TTL. Returns how many were removed.
    pub async fn sweep_expired(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;

        for key in self.cache.expired_keys(now) {
            let lock = self.phone_lock(&key);
            let _guard = lock.lock().await;
            // Re-check under the lock; the entry may have been driven meanwhile.
            if let Some(entry) = self.cache.take_if_expired(&key, now) {
                info!(phone = %mask_phone(&entry.phone), state = %entry.state(), "Pending login expired");
                self.abandon(entry).await;
                removed += 1;
            }
        }

        self.phone_locks
            .retain(|key, lock| Arc::strong_count(lock) > 1 || self.cache.contains(key));

        removed
    }

    async fn keep_pending(&self, key: &str, entry: PendingLogin) {
        if let Err(entry) = self.cache.insert(key, entry) {
            self.abandon(entry).await;
        }
    }

    /// Tear down a failed attempt and map the upstream error.
    async fn fail(&self, mut entry: PendingLogin, err: ClientError) -> LoginError {
        warn!(state = %entry.state(), error = %err, "Login failed");
        entry.transition(LoginState::Failed);
        self.abandon(entry).await;
        LoginError::from(err)
    }

    /// Disconnect and delete the temporary blob.
    async fn abandon(&self, mut entry: PendingLogin) {
        disconnect_quietly(entry.client.as_mut(), &entry.session_name).await;
        if let Err(e) = self.store.delete(&entry.session_name).await {
            warn!(session = %entry.session_name, error = %e, "Failed to delete temporary session");
        }
    }
}

/// Normalize `phone` and check it looks like an international number.
fn validate_phone(phone: &str) -> Result<String, LoginError> {
    let key = normalize_phone(phone);
    if !(5..=15).contains(&key.len()) || !key.chars().all(|c| c.is_ascii_digit()) {
        return Err(LoginError::InvalidPhone(phone.to_string()));
    }
    Ok(key)
}

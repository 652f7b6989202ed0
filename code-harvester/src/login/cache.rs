//! In-flight login connections keyed by phone.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tracing::warn;

use crate::client::MessagingClient;

use super::LoginState;

/// Limits for the [`CredentialCache`].
#[derive(Debug, Clone)]
pub struct CredentialCacheConfig {
    /// Idle time after which a pending login is abandoned.
    pub ttl: Duration,
    /// Maximum number of concurrent pending logins.
    pub capacity: usize,
}

impl Default for CredentialCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(600),
            capacity: 256,
        }
    }
}

/// A login attempt waiting for its code or password.
pub struct PendingLogin {
    pub phone: String,
    /// Temporary blob name the client is bound to.
    pub session_name: String,
    pub client: Box<dyn MessagingClient>,
    state: LoginState,
    pub last_activity: Instant,
}

impl PendingLogin {
    pub fn new(
        phone: impl Into<String>,
        session_name: impl Into<String>,
        client: Box<dyn MessagingClient>,
    ) -> Self {
        Self {
            phone: phone.into(),
            session_name: session_name.into(),
            client,
            state: LoginState::Idle,
            last_activity: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Move to `next` if the state machine allows it.
    ///
    /// An illegal move is logged and leaves the state unchanged.
    pub fn transition(&mut self, next: LoginState) -> bool {
        if !self.state.can_transition_to(next) {
            warn!(from = %self.state, to = %next, "Illegal login state transition");
            return false;
        }
        self.state = next;
        true
    }

    pub fn state(&self) -> LoginState {
        self.state
    }

    fn is_expired(&self, now: Instant, ttl: Duration) -> bool {
        now.saturating_duration_since(self.last_activity) >= ttl
    }
}

impl std::fmt::Debug for PendingLogin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PendingLogin")
            .field("phone", &self.phone)
            .field("session_name", &self.session_name)
            .field("state", &self.state)
            .field("last_activity", &self.last_activity)
            .finish_non_exhaustive()
    }
}

/// Bounded map of pending logins.
///
/// Entries are owned exclusively: callers `take` an entry to drive it and
/// `insert` it back if the login is still in progress. Removal never
/// disconnects; that is the caller's job.
pub struct CredentialCache {
    config: CredentialCacheConfig,
    entries: Mutex<HashMap<String, PendingLogin>>,
}

impl CredentialCache {
    pub fn new(config: CredentialCacheConfig) -> Self {
        Self {
            config,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &CredentialCacheConfig {
        &self.config
    }

    /// Insert an entry under `key`.
    ///
    /// Hands the entry back when the cache is full or `key` is already taken.
    pub fn insert(&self, key: &str, entry: PendingLogin) -> Result<(), PendingLogin> {
        let mut entries = self.entries.lock();
        if entries.contains_key(key) || entries.len() >= self.config.capacity {
            return Err(entry);
        }
        entries.insert(key.to_string(), entry);
        Ok(())
    }

    pub fn take(&self, key: &str) -> Option<PendingLogin> {
        self.entries.lock().remove(key)
    }

    /// Remove the entry under `key` only if it has been idle past the TTL.
    pub fn take_if_expired(&self, key: &str, now: Instant) -> Option<PendingLogin> {
        let mut entries = self.entries.lock();
        let expired = entries
            .get(key)
            .is_some_and(|e| e.is_expired(now, self.config.ttl));
        if expired { entries.remove(key) } else { None }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.lock().contains_key(key)
    }

    pub fn state(&self, key: &str) -> Option<LoginState> {
        self.entries.lock().get(key).map(|e| e.state)
    }

    /// Keys of entries idle past the TTL at `now`.
    pub fn expired_keys(&self, now: Instant) -> Vec<String> {
        self.entries
            .lock()
            .iter()
            .filter(|(_, e)| e.is_expired(now, self.config.ttl))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

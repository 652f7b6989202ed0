//! Shared fixtures: an in-memory database and a scripted messaging upstream.
//!
//! The fake client stores its session blob through the real [`SessionStore`],
//! so blob creation, publication and deletion are observable on disk. A blob
//! holding `auth:<digits>` is signed in as that phone.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tempfile::TempDir;

use code_harvester::client::{
    ClientError, ClientFactory, IncomingMessage, MessagingClient, SelfIdentity,
};
use code_harvester::config::AppConfig;
use code_harvester::database::{DbPool, init_pool_with_size, run_migrations};
use code_harvester::services::ServiceContainer;
use code_harvester::session::{
    FileSessionStore, SessionStore, is_temp_session_name, normalize_phone,
};

pub const PHONE: &str = "+10000000001";
pub const OWNER: &str = "42";
pub const GOOD_CODE: &str = "24680";

/// In-memory SQLite with migrations applied.
///
/// A single connection, since every connection to `sqlite::memory:` is its own database.
pub async fn setup_test_db() -> DbPool {
    let pool = init_pool_with_size("sqlite::memory:", 1)
        .await
        .expect("Failed to create test pool");
    run_migrations(&pool)
        .await
        .expect("Failed to run migrations");
    pool
}

/// Poll `condition` until it holds, failing the test after a generous deadline.
pub async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !condition().await {
        assert!(
            tokio::time::Instant::now() < deadline,
            "timed out waiting for {what}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

#[derive(Debug, Clone)]
struct FakeAccount {
    code: String,
    password: Option<String>,
    user_id: i64,
}

#[derive(Default)]
struct UpstreamState {
    accounts: HashMap<String, FakeAccount>,
    revoked: HashSet<String>,
    messages: HashMap<String, Vec<IncomingMessage>>,
    broken: bool,
}

/// Scripted stand-in for the messaging service.
#[derive(Default)]
pub struct FakeUpstream {
    state: Mutex<UpstreamState>,
    pub connects: AtomicUsize,
    pub disconnects: AtomicUsize,
    pub codes_sent: AtomicUsize,
    pub history_reads: AtomicUsize,
    /// Calls refused while broken.
    pub failures: AtomicUsize,
}

impl FakeUpstream {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a phone that accepts `code` (and `password`, if any).
    pub fn register(&self, phone: &str, code: &str, password: Option<&str>) {
        let mut state = self.state.lock();
        let user_id = 1000 + state.accounts.len() as i64;
        state.accounts.insert(
            normalize_phone(phone),
            FakeAccount {
                code: code.to_string(),
                password: password.map(str::to_string),
                user_id,
            },
        );
    }

    /// Sign out every session of `phone` upstream.
    pub fn revoke(&self, phone: &str) {
        self.state.lock().revoked.insert(normalize_phone(phone));
    }

    pub fn restore(&self, phone: &str) {
        self.state.lock().revoked.remove(&normalize_phone(phone));
    }

    /// Make every call fail with a protocol error.
    pub fn set_broken(&self, broken: bool) {
        self.state.lock().broken = broken;
    }

    /// Deliver a message from the official sender to `phone`.
    pub fn deliver(&self, phone: &str, text: &str, date: DateTime<Utc>) {
        let mut state = self.state.lock();
        let inbox = state.messages.entry(normalize_phone(phone)).or_default();
        inbox.push(IncomingMessage {
            text: text.to_string(),
            date,
        });
        inbox.sort_by(|a, b| b.date.cmp(&a.date));
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn disconnects(&self) -> usize {
        self.disconnects.load(Ordering::SeqCst)
    }

    fn check_broken(&self) -> Result<(), ClientError> {
        if self.state.lock().broken {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(ClientError::Protocol("upstream unavailable".into()));
        }
        Ok(())
    }
}

pub struct FakeClient {
    upstream: Arc<FakeUpstream>,
    store: Arc<dyn SessionStore>,
    session_name: String,
    blob: Option<String>,
    awaiting_password: Option<String>,
}

impl FakeClient {
    fn signed_in_phone(&self) -> Option<String> {
        self.blob
            .as_deref()
            .and_then(|b| b.strip_prefix("auth:"))
            .map(str::to_string)
    }

    fn authorized_phone(&self) -> Option<String> {
        let phone = self.signed_in_phone()?;
        let state = self.upstream.state.lock();
        (!state.revoked.contains(&phone)).then_some(phone)
    }
}

#[async_trait]
impl MessagingClient for FakeClient {
    async fn connect(&mut self) -> Result<(), ClientError> {
        self.upstream.check_broken()?;
        let blob = match self.store.load(&self.session_name).await? {
            Some(blob) => blob,
            None if is_temp_session_name(&self.session_name) => Vec::new(),
            None => return Err(ClientError::Unauthorized),
        };
        self.store.save(&self.session_name, &blob).await?;
        self.blob = Some(String::from_utf8_lossy(&blob).into_owned());
        self.upstream.connects.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ClientError> {
        if let Some(blob) = self.blob.take() {
            self.upstream.disconnects.fetch_add(1, Ordering::SeqCst);
            self.store.save(&self.session_name, blob.as_bytes()).await?;
        }
        Ok(())
    }

    async fn is_authorized(&mut self) -> Result<bool, ClientError> {
        self.upstream.check_broken()?;
        Ok(self.authorized_phone().is_some())
    }

    async fn request_code(&mut self, phone: &str) -> Result<(), ClientError> {
        self.upstream.check_broken()?;
        if !self
            .upstream
            .state
            .lock()
            .accounts
            .contains_key(&normalize_phone(phone))
        {
            return Err(ClientError::Rpc {
                code: 400,
                name: "PHONE_NUMBER_INVALID".into(),
            });
        }
        self.upstream.codes_sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn sign_in(&mut self, phone: &str, code: &str) -> Result<(), ClientError> {
        self.upstream.check_broken()?;
        let key = normalize_phone(phone);
        let account = self
            .upstream
            .state
            .lock()
            .accounts
            .get(&key)
            .cloned()
            .ok_or(ClientError::InvalidCode)?;
        if account.code != code {
            return Err(ClientError::InvalidCode);
        }
        if account.password.is_some() {
            self.awaiting_password = Some(key);
            return Err(ClientError::PasswordRequired);
        }
        self.blob = Some(format!("auth:{key}"));
        Ok(())
    }

    async fn check_password(&mut self, password: &str) -> Result<(), ClientError> {
        self.upstream.check_broken()?;
        let key = self
            .awaiting_password
            .clone()
            .ok_or_else(|| ClientError::Protocol("no password challenge".into()))?;
        let expected = self
            .upstream
            .state
            .lock()
            .accounts
            .get(&key)
            .and_then(|a| a.password.clone());
        if expected.as_deref() != Some(password) {
            return Err(ClientError::InvalidPassword);
        }
        self.blob = Some(format!("auth:{key}"));
        self.awaiting_password = None;
        Ok(())
    }

    async fn recent_messages(
        &mut self,
        _sender_id: i64,
        limit: usize,
    ) -> Result<Vec<IncomingMessage>, ClientError> {
        self.upstream.check_broken()?;
        let phone = self.authorized_phone().ok_or(ClientError::Unauthorized)?;
        self.upstream.history_reads.fetch_add(1, Ordering::SeqCst);
        let state = self.upstream.state.lock();
        Ok(state
            .messages
            .get(&phone)
            .map(|m| m.iter().take(limit).cloned().collect())
            .unwrap_or_default())
    }

    async fn get_self(&mut self) -> Result<SelfIdentity, ClientError> {
        self.upstream.check_broken()?;
        let phone = self.authorized_phone().ok_or(ClientError::Unauthorized)?;
        let state = self.upstream.state.lock();
        let account = state.accounts.get(&phone).ok_or(ClientError::Unauthorized)?;
        Ok(SelfIdentity {
            id: account.user_id,
            username: None,
            first_name: Some("Test".into()),
        })
    }
}

pub struct FakeClientFactory {
    pub upstream: Arc<FakeUpstream>,
    pub store: Arc<dyn SessionStore>,
}

impl ClientFactory for FakeClientFactory {
    fn create(&self, session_name: &str) -> Box<dyn MessagingClient> {
        Box::new(FakeClient {
            upstream: Arc::clone(&self.upstream),
            store: Arc::clone(&self.store),
            session_name: session_name.to_string(),
            blob: None,
            awaiting_password: None,
        })
    }
}

/// A fully wired container over the fake upstream.
pub struct Harness {
    pub container: ServiceContainer,
    pub upstream: Arc<FakeUpstream>,
    pub store: Arc<dyn SessionStore>,
    _sessions: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_config(AppConfig::default()).await
    }

    pub async fn with_config(config: AppConfig) -> Self {
        let sessions = tempfile::tempdir().expect("Failed to create session dir");
        let store: Arc<dyn SessionStore> = Arc::new(
            FileSessionStore::open(sessions.path())
                .await
                .expect("Failed to open session store"),
        );
        let upstream = FakeUpstream::new();
        let factory = Arc::new(FakeClientFactory {
            upstream: Arc::clone(&upstream),
            store: Arc::clone(&store),
        });

        let pool = setup_test_db().await;
        let container = ServiceContainer::with_components(pool, config, Arc::clone(&store), factory);

        Self {
            container,
            upstream,
            store,
            _sessions: sessions,
        }
    }

    pub async fn blob_exists(&self, name: &str) -> bool {
        self.store.exists(name).await.expect("exists check failed")
    }
}

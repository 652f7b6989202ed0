//! Service container for dependency injection.
//!
//! Builds every component from an [`AppConfig`] and a database pool, and
//! owns their shutdown.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::Result;
use crate::client::{ClientFactory, GatewayClientFactory, TimedClientFactory};
use crate::config::AppConfig;
use crate::database::DbPool;
use crate::database::maintenance::{CodeRetention, RetentionConfig};
use crate::database::repositories::{
    AccountRepository, SqlxAccountRepository, SqlxVerificationCodeRepository,
    VerificationCodeRepository,
};
use crate::harvester::{CodeHarvester, HarvestConfig};
use crate::keepalive::KeepAliveWorker;
use crate::login::{CredentialCacheConfig, LoginOrchestrator};
use crate::scheduler::{Scheduler, SchedulerConfig};
use crate::session::{AccountLocks, FileSessionStore, SessionStore};

use super::AccountService;

/// Service container holding all application services.
pub struct ServiceContainer {
    pub pool: DbPool,
    pub config: AppConfig,
    pub session_store: Arc<dyn SessionStore>,
    pub accounts: Arc<dyn AccountRepository>,
    pub codes: Arc<dyn VerificationCodeRepository>,
    /// Per-account locks shared by everything that opens an account's session.
    pub locks: Arc<AccountLocks>,
    pub login: Arc<LoginOrchestrator>,
    pub harvester: Arc<CodeHarvester>,
    pub keepalive: Arc<KeepAliveWorker>,
    pub retention: Arc<CodeRetention>,
    pub scheduler: Arc<Scheduler>,
    pub account_service: Arc<AccountService>,
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Create a container backed by the file session store and the messaging gateway.
    pub async fn new(pool: DbPool, config: AppConfig) -> Result<Self> {
        let store: Arc<dyn SessionStore> =
            Arc::new(FileSessionStore::open(&config.session_dir).await?);
        let gateway = GatewayClientFactory::new(
            &config.gateway_url,
            config.api.clone(),
            Arc::clone(&store),
        )?;
        Ok(Self::with_components(pool, config, store, Arc::new(gateway)))
    }

    /// Create a container with an explicit session store and client factory.
    ///
    /// Every client the factory produces is wrapped with the configured timeout.
    pub fn with_components(
        pool: DbPool,
        config: AppConfig,
        session_store: Arc<dyn SessionStore>,
        clients: Arc<dyn ClientFactory>,
    ) -> Self {
        let clients: Arc<dyn ClientFactory> =
            Arc::new(TimedClientFactory::new(clients, config.client_timeout));

        let accounts: Arc<dyn AccountRepository> =
            Arc::new(SqlxAccountRepository::new(pool.clone()));
        let codes: Arc<dyn VerificationCodeRepository> =
            Arc::new(SqlxVerificationCodeRepository::new(pool.clone()));
        let locks = Arc::new(AccountLocks::new());

        let login = Arc::new(LoginOrchestrator::new(
            Arc::clone(&clients),
            Arc::clone(&session_store),
            CredentialCacheConfig {
                ttl: config.login_ttl,
                capacity: config.max_pending_logins,
            },
            config.duplicate_login_policy,
        ));

        let harvester = Arc::new(CodeHarvester::new(
            Arc::clone(&clients),
            Arc::clone(&accounts),
            Arc::clone(&codes),
            Arc::clone(&locks),
            HarvestConfig {
                sender_id: config.official_sender_id,
                ..HarvestConfig::default()
            },
        ));

        let keepalive = Arc::new(KeepAliveWorker::new(
            Arc::clone(&clients),
            Arc::clone(&accounts),
            Arc::clone(&locks),
        ));

        let retention_config = RetentionConfig::default();
        let scheduler_config = SchedulerConfig {
            harvest_interval: config.scheduler_interval,
            retention_interval: retention_config.interval,
            ..SchedulerConfig::default()
        };
        let retention = Arc::new(CodeRetention::new(Arc::clone(&codes), retention_config));

        let scheduler = Arc::new(Scheduler::new(
            Arc::clone(&harvester),
            Arc::clone(&keepalive),
            Arc::clone(&retention),
            Arc::clone(&login),
            scheduler_config,
        ));

        let account_service = Arc::new(AccountService::new(
            Arc::clone(&login),
            Arc::clone(&harvester),
            Arc::clone(&accounts),
            Arc::clone(&codes),
            Arc::clone(&locks),
        ));

        Self {
            pool,
            config,
            session_store,
            accounts,
            codes,
            locks,
            login,
            harvester,
            keepalive,
            retention,
            scheduler,
            account_service,
            cancellation_token: CancellationToken::new(),
        }
    }

    /// Get the cancellation token for external use.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }

    /// Stop background work and close the database pool.
    pub async fn shutdown(&self) {
        info!("Shutting down services");
        self.cancellation_token.cancel();
        self.scheduler.stop().await;

        info!("Closing database pool...");
        self.pool.close().await;
        info!("Services shut down");
    }
}

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::database::CodeRetention;
use crate::harvester::CodeHarvester;
use crate::keepalive::KeepAliveWorker;
use crate::login::LoginOrchestrator;

use super::next_keepalive_delay;

/// Scheduler timing.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub harvest_interval: Duration,
    pub keepalive_min: Duration,
    pub keepalive_max: Duration,
    pub retention_interval: Duration,
    pub login_sweep_interval: Duration,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            harvest_interval: Duration::from_secs(300),
            keepalive_min: Duration::from_secs(4 * 24 * 60 * 60),
            keepalive_max: Duration::from_secs(5 * 24 * 60 * 60),
            retention_interval: Duration::from_secs(24 * 60 * 60),
            login_sweep_interval: Duration::from_secs(60),
        }
    }
}

struct Running {
    token: CancellationToken,
    tasks: Vec<JoinHandle<()>>,
}

/// Owns the background timelines.
pub struct Scheduler {
    harvester: Arc<CodeHarvester>,
    keepalive: Arc<KeepAliveWorker>,
    retention: Arc<CodeRetention>,
    login: Arc<LoginOrchestrator>,
    config: SchedulerConfig,
    running: Mutex<Option<Running>>,
}

impl Scheduler {
    pub fn new(
        harvester: Arc<CodeHarvester>,
        keepalive: Arc<KeepAliveWorker>,
        retention: Arc<CodeRetention>,
        login: Arc<LoginOrchestrator>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            harvester,
            keepalive,
            retention,
            login,
            config,
            running: Mutex::new(None),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }

    /// Spawn every timeline. Returns `false` if already running.
    pub fn start(&self) -> bool {
        let mut running = self.running.lock();
        if running.is_some() {
            return false;
        }

        let token = CancellationToken::new();
        let tasks = vec![
            self.spawn_harvest(token.clone()),
            self.spawn_keepalive(token.clone()),
            self.spawn_retention(token.clone()),
            self.spawn_login_sweep(token.clone()),
        ];
        *running = Some(Running { token, tasks });

        info!(
            harvest_interval_secs = self.config.harvest_interval.as_secs(),
            retention_interval_secs = self.config.retention_interval.as_secs(),
            "Scheduler started"
        );
        true
    }

    /// Stop every timeline, waiting for in-flight jobs to finish.
    pub async fn stop(&self) {
        let running = self.running.lock().take();
        let Some(running) = running else {
            return;
        };
        running.token.cancel();
        for result in join_all(running.tasks).await {
            if let Err(e) = result {
                error!(error = %e, "Scheduler task ended abnormally");
            }
        }
        info!("Scheduler stopped");
    }

    fn spawn_harvest(&self, token: CancellationToken) -> JoinHandle<()> {
        let harvester = Arc::clone(&self.harvester);
        let period = self.config.harvest_interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let harvester = Arc::clone(&harvester);
                run_isolated("harvest", async move {
                    match harvester.check_all_accounts().await {
                        Ok(summary) => summary.log(),
                        Err(e) => error!(error = %e, "Harvest cycle failed"),
                    }
                })
                .await;
            }
            debug!("Harvest timeline stopped");
        })
    }

    fn spawn_keepalive(&self, token: CancellationToken) -> JoinHandle<()> {
        let keepalive = Arc::clone(&self.keepalive);
        let (min, max) = (self.config.keepalive_min, self.config.keepalive_max);

        tokio::spawn(async move {
            loop {
                // Drawn after the previous run completes.
                let delay = next_keepalive_delay(min, max);
                info!(next_in_secs = delay.as_secs(), "Keep-alive scheduled");
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = sleep(delay) => {}
                }
                let keepalive = Arc::clone(&keepalive);
                run_isolated("keep_alive", async move {
                    match keepalive.keep_alive_all_accounts().await {
                        Ok(summary) => summary.log(),
                        Err(e) => error!(error = %e, "Keep-alive cycle failed"),
                    }
                })
                .await;
            }
            debug!("Keep-alive timeline stopped");
        })
    }

    fn spawn_retention(&self, token: CancellationToken) -> JoinHandle<()> {
        let retention = Arc::clone(&self.retention);
        let period = self.config.retention_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let retention = Arc::clone(&retention);
                run_isolated("retention", async move {
                    if let Err(e) = retention.cleanup_old_codes().await {
                        error!(error = %e, "Code retention cleanup failed");
                    }
                })
                .await;
            }
            debug!("Retention timeline stopped");
        })
    }

    fn spawn_login_sweep(&self, token: CancellationToken) -> JoinHandle<()> {
        let login = Arc::clone(&self.login);
        let period = self.config.login_sweep_interval;

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                let login = Arc::clone(&login);
                run_isolated("login_sweep", async move {
                    let removed = login.sweep_expired().await;
                    if removed > 0 {
                        info!(removed, "Expired pending logins removed");
                    }
                })
                .await;
            }
            debug!("Login sweep timeline stopped");
        })
    }
}

/// Run one job occurrence in its own task so a panic stays contained.
async fn run_isolated<F>(job: &'static str, fut: F)
where
    F: Future<Output = ()> + Send + 'static,
{
    if let Err(e) = tokio::spawn(fut).await {
        error!(job, error = %e, "Scheduled job panicked");
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[test]
    fn test_default_config() {
        let config = SchedulerConfig::default();
        assert_eq!(config.harvest_interval, Duration::from_secs(300));
        assert_eq!(config.keepalive_min.as_secs(), 345_600);
        assert_eq!(config.keepalive_max.as_secs(), 432_000);
        assert_eq!(config.retention_interval.as_secs(), 86_400);
    }

    #[tokio::test]
    async fn test_panicking_job_is_contained() {
        let ran = Arc::new(AtomicUsize::new(0));

        run_isolated("boom", async { panic!("job exploded") }).await;

        let counter = Arc::clone(&ran);
        run_isolated("next", async move {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .await;

        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }
}

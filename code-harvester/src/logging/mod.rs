//! Logging setup.
//!
//! - Console and daily-rolling file output with local timezone timestamps
//! - `RUST_LOG` overrides [`DEFAULT_LOG_FILTER`]
//! - Log files older than 7 days are deleted by a daily background task

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Local, NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::Writer, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::utils::fs;

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "code_harvester=info,sqlx=warn";

/// Rolling file prefix; files are named `code-harvester.log.YYYY-MM-DD`.
pub const LOG_FILE_PREFIX: &str = "code-harvester.log";

const LOG_RETENTION_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy)]
struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Local::now().format("%Y-%m-%dT%H:%M:%S%.3f%:z"))
    }
}

/// Handle to the installed logging setup.
pub struct Logging {
    log_dir: PathBuf,
    _guard: WorkerGuard,
}

impl Logging {
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Spawn the daily log retention task.
    pub fn start_retention_cleanup(&self, cancel_token: CancellationToken) {
        let log_dir = self.log_dir.clone();

        tokio::spawn(async move {
            let cleanup_interval = Duration::from_secs(24 * 60 * 60);
            loop {
                tokio::select! {
                    _ = cancel_token.cancelled() => {
                        debug!("Log retention cleanup task shutting down");
                        break;
                    }
                    _ = tokio::time::sleep(cleanup_interval) => {
                        if let Err(e) = cleanup_old_logs(&log_dir, LOG_RETENTION_DAYS, Utc::now()).await {
                            warn!(error = %e, "Failed to cleanup old logs");
                        }
                    }
                }
            }
        });
    }
}

/// Delete rolled log files dated before `now - retention_days`.
///
/// Returns the number of files removed. Files without a parsable date
/// suffix are left alone.
pub async fn cleanup_old_logs(
    log_dir: &Path,
    retention_days: i64,
    now: DateTime<Utc>,
) -> std::io::Result<usize> {
    let cutoff = (now - chrono::Duration::days(retention_days)).date_naive();
    let prefix = format!("{LOG_FILE_PREFIX}.");

    let mut entries = tokio::fs::read_dir(log_dir).await?;
    let mut deleted = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if !entry.file_type().await?.is_file() {
            continue;
        }

        let file_date = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.strip_prefix(prefix.as_str()))
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y-%m-%d").ok());

        match file_date {
            Some(date) if date < cutoff => match tokio::fs::remove_file(&path).await {
                Ok(()) => {
                    deleted += 1;
                    debug!(path = %path.display(), "Deleted old log file");
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to delete old log file")
                }
            },
            _ => {}
        }
    }

    if deleted > 0 {
        info!(count = deleted, "Cleaned up old log files");
    }
    Ok(deleted)
}

/// Install the global subscriber.
///
/// Keep the returned [`Logging`] alive for the process lifetime; dropping it
/// flushes and stops the file writer.
pub fn init_logging(log_dir: &Path) -> crate::Result<Logging> {
    fs::ensure_dir_all_sync_with_op("creating log directory", log_dir)?;

    let file_appender = tracing_appender::rolling::daily(log_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_ansi(true).with_timer(LocalTimer))
        .with(
            fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_timer(LocalTimer),
        )
        .try_init()
        .map_err(|e| crate::Error::Other(format!("Failed to set global default subscriber: {e}")))?;

    Ok(Logging {
        log_dir: log_dir.to_path_buf(),
        _guard: guard,
    })
}

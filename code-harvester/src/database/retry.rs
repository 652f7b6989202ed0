//! Retry helper for writes that can race the SQLite write lock.
//!
//! A manual check and a scheduled cycle may write codes for different
//! accounts at the same moment; SQLite answers one of them with
//! `SQLITE_BUSY` once the busy timeout is exhausted.

use std::future::Future;
use std::time::Duration;

use rand::RngExt;
use tokio::time::sleep;
use tracing::debug;

use crate::{Error, Result};

const BUSY_MAX_RETRIES: u32 = 6;
const BUSY_BASE_DELAY_MS: u64 = 20;
const BUSY_MAX_DELAY_MS: u64 = 1000;

/// Result codes SQLite uses for a held lock.
const SQLITE_BUSY_CODES: [&str; 2] = ["5", "6"];

fn mentions_lock(message: &str) -> bool {
    let message = message.to_ascii_lowercase();
    ["database is locked", "database is busy"]
        .iter()
        .any(|needle| message.contains(needle))
}

fn is_sqlite_busy_error(err: &Error) -> bool {
    match err {
        Error::DatabaseSqlx(sqlx::Error::Database(db_err)) => {
            db_err
                .code()
                .is_some_and(|code| SQLITE_BUSY_CODES.contains(&&*code))
                || mentions_lock(db_err.message())
        }
        Error::DatabaseSqlx(other) => mentions_lock(&other.to_string()),
        _ => false,
    }
}

fn backoff_delay(attempt: u32) -> Duration {
    let capped = BUSY_BASE_DELAY_MS
        .saturating_mul(1u64 << attempt.min(16))
        .min(BUSY_MAX_DELAY_MS);
    let jitter = rand::rng().random_range(0..=capped / 4);
    Duration::from_millis((capped + jitter).min(BUSY_MAX_DELAY_MS))
}

/// Run `op`, retrying with jittered exponential backoff while SQLite reports busy.
pub async fn retry_on_sqlite_busy<T, F, Fut>(op_name: &'static str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 0u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_sqlite_busy_error(&err) && attempt < BUSY_MAX_RETRIES => {
                let delay = backoff_delay(attempt);
                debug!(
                    op = op_name,
                    delay_ms = delay.as_millis() as u64,
                    attempt = attempt + 1,
                    "SQLite busy, retrying"
                );
                sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_is_capped() {
        for attempt in 0..20 {
            assert!(backoff_delay(attempt) <= Duration::from_millis(BUSY_MAX_DELAY_MS));
        }
    }

    #[tokio::test]
    async fn test_non_busy_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_sqlite_busy("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::validation("nope")) }
        })
        .await;

        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_busy_errors_are_retried() {
        let calls = AtomicU32::new(0);
        let result = retry_on_sqlite_busy("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(Error::DatabaseSqlx(sqlx::Error::Protocol(
                        "database is locked".to_string(),
                    )))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }
}

//! SQLite persistence: pool setup, migrations, models and repositories.

pub mod maintenance;
pub mod models;
pub mod repositories;
pub mod retry;
pub mod time;

pub use maintenance::{CodeRetention, RetentionConfig};

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite};
use tracing::info;

pub type DbPool = Pool<Sqlite>;

/// Upper bound for the pool. Harvesting is sequential, so connections mostly
/// serve the owner-facing operations.
const MAX_POOL_SIZE: u32 = 8;

/// How long a writer waits on a locked database before `SQLITE_BUSY`.
const BUSY_TIMEOUT: Duration = Duration::from_secs(30);

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

/// Pool size derived from the available cores, capped at [`MAX_POOL_SIZE`].
pub fn default_pool_size() -> u32 {
    std::thread::available_parallelism()
        .map(|n| n.get() as u32)
        .unwrap_or(2)
        .clamp(2, MAX_POOL_SIZE)
}

/// Open a pool on `database_url` with at most `max_connections` connections.
///
/// File databases run in WAL mode. Foreign keys are enforced on every
/// connection so codes cascade with their account.
pub async fn init_pool_with_size(database_url: &str, max_connections: u32) -> crate::Result<DbPool> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
        .foreign_keys(true)
        .pragma("temp_store", "memory");

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(ACQUIRE_TIMEOUT)
        .connect_with(options)
        .await?;

    info!(max_connections, "Database pool ready");
    Ok(pool)
}

pub async fn init_pool(database_url: &str) -> crate::Result<DbPool> {
    init_pool_with_size(database_url, default_pool_size()).await
}

/// Apply the embedded migrations.
pub async fn run_migrations(pool: &DbPool) -> crate::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    info!("Database migrations applied");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_pool_size_is_bounded() {
        let size = default_pool_size();
        assert!((2..=MAX_POOL_SIZE).contains(&size));
    }

    #[tokio::test]
    async fn test_foreign_keys_are_enforced() {
        let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();

        let (enabled,): (i64,) = sqlx::query_as("PRAGMA foreign_keys")
            .fetch_one(&pool)
            .await
            .unwrap();

        assert_eq!(enabled, 1);
    }

    #[tokio::test]
    async fn test_migrations_create_tables() {
        let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .unwrap();
        let names: Vec<&str> = tables.iter().map(|t| t.0.as_str()).collect();

        assert!(names.contains(&"accounts"));
        assert!(names.contains(&"verification_codes"));
    }
}

//! Retention cleanup for harvested codes.
//!
//! Codes are only useful for minutes, so anything older than the retention
//! period is deleted in a single statement. The [`Scheduler`](crate::scheduler::Scheduler)
//! decides when this runs.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::Result;
use crate::database::repositories::VerificationCodeRepository;
use crate::database::time::window_start_ms;

/// Configuration for code retention.
#[derive(Debug, Clone)]
pub struct RetentionConfig {
    /// Codes older than this are deleted (default: 7 days).
    pub retention: Duration,
    /// Interval between cleanup runs (default: 24 hours).
    pub interval: Duration,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            retention: Duration::from_secs(7 * 24 * 60 * 60),
            interval: Duration::from_secs(24 * 60 * 60),
        }
    }
}

/// Deletes verification codes that fell out of the retention period.
pub struct CodeRetention {
    codes: Arc<dyn VerificationCodeRepository>,
    config: RetentionConfig,
}

impl CodeRetention {
    pub fn new(codes: Arc<dyn VerificationCodeRepository>, config: RetentionConfig) -> Self {
        Self { codes, config }
    }

    pub fn config(&self) -> &RetentionConfig {
        &self.config
    }

    /// Delete codes older than the retention period. Returns the number removed.
    pub async fn cleanup_old_codes(&self) -> Result<u64> {
        self.cleanup_as_of(Utc::now()).await
    }

    /// Delete codes with `received_at` strictly before `now - retention`.
    pub async fn cleanup_as_of(&self, now: DateTime<Utc>) -> Result<u64> {
        let cutoff = window_start_ms(now, self.config.retention);
        let deleted = self.codes.delete_older_than(cutoff).await?;
        info!(deleted, "Cleaned up old verification codes");
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::models::{AccountDbModel, VerificationCodeDbModel};
    use crate::database::repositories::{
        AccountRepository, SqlxAccountRepository, SqlxVerificationCodeRepository,
    };
    use crate::database::{init_pool_with_size, run_migrations};

    #[test]
    fn test_default_config() {
        let config = RetentionConfig::default();
        assert_eq!(config.retention, Duration::from_secs(604_800));
        assert_eq!(config.interval, Duration::from_secs(86_400));
    }

    #[tokio::test]
    async fn test_cleanup_deletes_only_expired_codes() {
        let pool = init_pool_with_size("sqlite::memory:", 1).await.unwrap();
        run_migrations(&pool).await.unwrap();

        let accounts = SqlxAccountRepository::new(pool.clone());
        let account = AccountDbModel::new("+10000000001", "user_1_10000000001", "1");
        accounts.create(&account).await.unwrap();

        let codes = Arc::new(SqlxVerificationCodeRepository::new(pool.clone()));
        let now = Utc::now();
        let ages = [
            chrono::Duration::days(8),
            chrono::Duration::days(7) + chrono::Duration::seconds(1),
            chrono::Duration::days(7) - chrono::Duration::seconds(1),
            chrono::Duration::minutes(2),
        ];
        for (i, age) in ages.iter().enumerate() {
            let row = VerificationCodeDbModel::new(
                Some(account.id.clone()),
                &account.phone,
                format!("1234{i}"),
                "code",
                None,
                now - *age,
            );
            codes.create(&row).await.unwrap();
        }

        let retention = CodeRetention::new(codes.clone(), RetentionConfig::default());
        let deleted = retention.cleanup_as_of(now).await.unwrap();

        assert_eq!(deleted, 2);
        assert_eq!(codes.count_for_account(&account.id).await.unwrap(), 2);
        let left: Vec<String> = codes
            .list_for_account(&account.id, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.code)
            .collect();
        assert_eq!(left, vec!["12343".to_string(), "12342".to_string()]);
    }
}

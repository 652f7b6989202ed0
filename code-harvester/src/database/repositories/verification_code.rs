//! Verification code repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::Result;
use crate::database::models::VerificationCodeDbModel;

/// Verification code repository trait.
#[async_trait]
pub trait VerificationCodeRepository: Send + Sync {
    async fn create(&self, code: &VerificationCodeDbModel) -> Result<()>;

    /// Whether the same code was already recorded for this account at or after `since_ms`.
    ///
    /// Without an account id the phone number is the dedup key.
    async fn exists_since(
        &self,
        account_id: Option<&str>,
        phone: &str,
        code: &str,
        since_ms: i64,
    ) -> Result<bool>;

    /// Most recent codes for one account, newest first.
    async fn list_for_account(
        &self,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<VerificationCodeDbModel>>;

    /// Codes received at or after `since_ms` across every account of an owner, newest first.
    async fn list_for_owner_since(
        &self,
        owner_id: &str,
        since_ms: i64,
        limit: i64,
    ) -> Result<Vec<VerificationCodeDbModel>>;

    /// Newest code for a phone number among an owner's accounts.
    async fn latest_for_phone(
        &self,
        owner_id: &str,
        phone: &str,
    ) -> Result<Option<VerificationCodeDbModel>>;

    async fn count_for_account(&self, account_id: &str) -> Result<i64>;

    /// Bulk delete on owner action. Returns the number of rows removed.
    async fn delete_for_account(&self, account_id: &str) -> Result<u64>;

    /// Delete every code received strictly before `cutoff_ms`.
    async fn delete_older_than(&self, cutoff_ms: i64) -> Result<u64>;
}

/// SQLx implementation of VerificationCodeRepository.
pub struct SqlxVerificationCodeRepository {
    pool: SqlitePool,
}

impl SqlxVerificationCodeRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl VerificationCodeRepository for SqlxVerificationCodeRepository {
    async fn create(&self, code: &VerificationCodeDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO verification_codes (id, account_id, phone, code, message, service, received_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&code.id)
        .bind(&code.account_id)
        .bind(&code.phone)
        .bind(&code.code)
        .bind(&code.message)
        .bind(&code.service)
        .bind(code.received_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn exists_since(
        &self,
        account_id: Option<&str>,
        phone: &str,
        code: &str,
        since_ms: i64,
    ) -> Result<bool> {
        let found: Option<(i64,)> = match account_id {
            Some(account_id) => {
                sqlx::query_as(
                    r#"
                    SELECT 1 FROM verification_codes
                    WHERE account_id = ? AND code = ? AND received_at >= ?
                    LIMIT 1
                    "#,
                )
                .bind(account_id)
                .bind(code)
                .bind(since_ms)
                .fetch_optional(&self.pool)
                .await?
            }
            None => {
                sqlx::query_as(
                    r#"
                    SELECT 1 FROM verification_codes
                    WHERE phone = ? AND code = ? AND received_at >= ?
                    LIMIT 1
                    "#,
                )
                .bind(phone)
                .bind(code)
                .bind(since_ms)
                .fetch_optional(&self.pool)
                .await?
            }
        };
        Ok(found.is_some())
    }

    async fn list_for_account(
        &self,
        account_id: &str,
        limit: i64,
    ) -> Result<Vec<VerificationCodeDbModel>> {
        let codes = sqlx::query_as::<_, VerificationCodeDbModel>(
            "SELECT * FROM verification_codes WHERE account_id = ? ORDER BY received_at DESC LIMIT ?",
        )
        .bind(account_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(codes)
    }

    async fn list_for_owner_since(
        &self,
        owner_id: &str,
        since_ms: i64,
        limit: i64,
    ) -> Result<Vec<VerificationCodeDbModel>> {
        let codes = sqlx::query_as::<_, VerificationCodeDbModel>(
            r#"
            SELECT vc.* FROM verification_codes vc
            INNER JOIN accounts a ON a.id = vc.account_id
            WHERE a.owner_id = ? AND vc.received_at >= ?
            ORDER BY vc.received_at DESC
            LIMIT ?
            "#,
        )
        .bind(owner_id)
        .bind(since_ms)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(codes)
    }

    async fn latest_for_phone(
        &self,
        owner_id: &str,
        phone: &str,
    ) -> Result<Option<VerificationCodeDbModel>> {
        let code = sqlx::query_as::<_, VerificationCodeDbModel>(
            r#"
            SELECT vc.* FROM verification_codes vc
            INNER JOIN accounts a ON a.id = vc.account_id
            WHERE a.owner_id = ? AND vc.phone = ?
            ORDER BY vc.received_at DESC
            LIMIT 1
            "#,
        )
        .bind(owner_id)
        .bind(phone)
        .fetch_optional(&self.pool)
        .await?;
        Ok(code)
    }

    async fn count_for_account(&self, account_id: &str) -> Result<i64> {
        let result: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM verification_codes WHERE account_id = ?")
                .bind(account_id)
                .fetch_one(&self.pool)
                .await?;
        Ok(result.0)
    }

    async fn delete_for_account(&self, account_id: &str) -> Result<u64> {
        let result = sqlx::query("DELETE FROM verification_codes WHERE account_id = ?")
            .bind(account_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn delete_older_than(&self, cutoff_ms: i64) -> Result<u64> {
        let result = sqlx::query("DELETE FROM verification_codes WHERE received_at < ?")
            .bind(cutoff_ms)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}

//! Account repository.

use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::database::models::AccountDbModel;
use crate::database::time::now_ms;
use crate::{Error, Result};

/// Account repository trait.
#[async_trait]
pub trait AccountRepository: Send + Sync {
    async fn create(&self, account: &AccountDbModel) -> Result<()>;
    async fn get(&self, id: &str) -> Result<AccountDbModel>;
    async fn find_by_phone(&self, phone: &str) -> Result<Option<AccountDbModel>>;
    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<AccountDbModel>>;
    /// All accounts with `is_active = true`, oldest first.
    async fn list_active(&self) -> Result<Vec<AccountDbModel>>;
    async fn set_active(&self, id: &str, is_active: bool) -> Result<()>;
    /// Point the account at a new session blob and mark it active (re-login).
    async fn replace_session(&self, id: &str, session_name: &str) -> Result<()>;
    /// Delete an account; its codes cascade. Returns whether a row was removed.
    async fn delete(&self, id: &str) -> Result<bool>;
}

/// SQLx implementation of AccountRepository.
pub struct SqlxAccountRepository {
    pool: SqlitePool,
}

impl SqlxAccountRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccountRepository for SqlxAccountRepository {
    async fn create(&self, account: &AccountDbModel) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO accounts (id, phone, session_name, is_active, owner_id, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&account.id)
        .bind(&account.phone)
        .bind(&account.session_name)
        .bind(account.is_active)
        .bind(&account.owner_id)
        .bind(account.created_at)
        .bind(account.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<AccountDbModel> {
        sqlx::query_as::<_, AccountDbModel>("SELECT * FROM accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("Account", id))
    }

    async fn find_by_phone(&self, phone: &str) -> Result<Option<AccountDbModel>> {
        let account = sqlx::query_as::<_, AccountDbModel>("SELECT * FROM accounts WHERE phone = ?")
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;
        Ok(account)
    }

    async fn list_by_owner(&self, owner_id: &str) -> Result<Vec<AccountDbModel>> {
        let accounts = sqlx::query_as::<_, AccountDbModel>(
            "SELECT * FROM accounts WHERE owner_id = ? ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    async fn list_active(&self) -> Result<Vec<AccountDbModel>> {
        let accounts = sqlx::query_as::<_, AccountDbModel>(
            "SELECT * FROM accounts WHERE is_active = TRUE ORDER BY created_at ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(accounts)
    }

    async fn set_active(&self, id: &str, is_active: bool) -> Result<()> {
        let result = sqlx::query("UPDATE accounts SET is_active = ?, updated_at = ? WHERE id = ?")
            .bind(is_active)
            .bind(now_ms())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Account", id));
        }
        Ok(())
    }

    async fn replace_session(&self, id: &str, session_name: &str) -> Result<()> {
        let result = sqlx::query(
            "UPDATE accounts SET session_name = ?, is_active = TRUE, updated_at = ? WHERE id = ?",
        )
        .bind(session_name)
        .bind(now_ms())
        .bind(id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found("Account", id));
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM accounts WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

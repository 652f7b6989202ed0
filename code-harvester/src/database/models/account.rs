//! Account database model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{ms_to_datetime, now_ms};

/// An attached messaging account.
///
/// `session_name` points at the blob in the session store that authenticates
/// this account upstream.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccountDbModel {
    /// Unique identifier (UUID)
    pub id: String,
    /// Canonical phone number (`+` and digits); unique.
    pub phone: String,
    /// Session blob name; unique.
    pub session_name: String,
    pub is_active: bool,
    /// Platform user who attached the account.
    pub owner_id: String,
    /// Unix epoch milliseconds (UTC).
    pub created_at: i64,
    /// Unix epoch milliseconds (UTC).
    pub updated_at: i64,
}

impl AccountDbModel {
    /// Create a new, active account.
    pub fn new(
        phone: impl Into<String>,
        session_name: impl Into<String>,
        owner_id: impl Into<String>,
    ) -> Self {
        let now = now_ms();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            phone: phone.into(),
            session_name: session_name.into(),
            is_active: true,
            owner_id: owner_id.into(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn get_created_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.created_at)
    }

    pub fn get_updated_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.updated_at)
    }

    /// Whether `owner_id` owns this account.
    #[inline]
    pub fn is_owned_by(&self, owner_id: &str) -> bool {
        self.owner_id == owner_id
    }
}

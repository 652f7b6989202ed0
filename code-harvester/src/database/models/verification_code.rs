//! Verification code database model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::database::time::{datetime_to_ms, ms_to_datetime};

/// A code harvested from a message sent by the official sender.
///
/// Rows are never updated; they are removed by retention cleanup or by the
/// account owner.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize, PartialEq, Eq)]
pub struct VerificationCodeDbModel {
    /// Unique identifier (UUID)
    pub id: String,
    /// Owning account (None for checks run against a bare session).
    pub account_id: Option<String>,
    pub phone: String,
    pub code: String,
    /// Full text of the message the code was extracted from.
    pub message: String,
    /// Source tag (e.g. "telegram").
    pub service: Option<String>,
    /// Message timestamp, Unix epoch milliseconds (UTC).
    pub received_at: i64,
}

impl VerificationCodeDbModel {
    pub fn new(
        account_id: Option<String>,
        phone: impl Into<String>,
        code: impl Into<String>,
        message: impl Into<String>,
        service: Option<String>,
        received_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            account_id,
            phone: phone.into(),
            code: code.into(),
            message: message.into(),
            service,
            received_at: datetime_to_ms(received_at),
        }
    }

    pub fn get_received_at(&self) -> DateTime<Utc> {
        ms_to_datetime(self.received_at)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_code_keeps_message_timestamp() {
        let received = ms_to_datetime(1_760_000_000_000);
        let code = VerificationCodeDbModel::new(
            Some("acc-1".to_string()),
            "+10000000001",
            "482913",
            "Your code is 482913",
            Some("telegram".to_string()),
            received,
        );

        assert_eq!(code.received_at, 1_760_000_000_000);
        assert_eq!(code.get_received_at(), received);
        assert_eq!(code.account_id.as_deref(), Some("acc-1"));
    }
}

//! Messaging client error types.

use std::time::Duration;

use thiserror::Error;

/// Errors raised by a [`MessagingClient`](super::MessagingClient).
#[derive(Debug, Error)]
pub enum ClientError {
    /// The account has a second factor; sign-in must continue with a password.
    #[error("Two-step verification password required")]
    PasswordRequired,

    #[error("Invalid login code")]
    InvalidCode,

    #[error("Login code expired")]
    ExpiredCode,

    #[error("Invalid two-step verification password")]
    InvalidPassword,

    /// The application id/hash pair was rejected.
    #[error("Invalid API credentials")]
    InvalidApiCredentials,

    #[error("Flood wait: retry after {seconds}s")]
    FloodWait { seconds: u64 },

    /// The session is not (or no longer) signed in.
    #[error("Session is not authorized")]
    Unauthorized,

    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Any other upstream RPC error.
    #[error("Upstream error {code}: {name}")]
    Rpc { code: i32, name: String },

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

impl ClientError {
    /// Transient failures may succeed on a later attempt without user action.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Network(_) | Self::FloodWait { .. }
        )
    }

    /// Whether this error proves the session itself is no longer signed in.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Unauthorized)
    }
}

impl From<crate::Error> for ClientError {
    fn from(err: crate::Error) -> Self {
        ClientError::Storage(err.to_string())
    }
}

/// Map an upstream RPC error name to a typed error.
///
/// `FLOOD_WAIT_<n>` carries its delay in the name; `seconds` is used when the
/// gateway reports it separately.
pub fn classify_rpc_error(code: i32, name: &str, seconds: Option<u64>) -> ClientError {
    if let Some(rest) = name.strip_prefix("FLOOD_WAIT_") {
        let seconds = rest.parse().ok().or(seconds).unwrap_or(0);
        return ClientError::FloodWait { seconds };
    }

    match name {
        "SESSION_PASSWORD_NEEDED" => ClientError::PasswordRequired,
        "PHONE_CODE_INVALID" | "PHONE_CODE_EMPTY" => ClientError::InvalidCode,
        "PHONE_CODE_EXPIRED" => ClientError::ExpiredCode,
        "PASSWORD_HASH_INVALID" => ClientError::InvalidPassword,
        "API_ID_INVALID" | "API_ID_PUBLISHED_FLOOD" => ClientError::InvalidApiCredentials,
        "FLOOD_WAIT" | "FLOOD_PREMIUM_WAIT" => ClientError::FloodWait {
            seconds: seconds.unwrap_or(0),
        },
        "AUTH_KEY_UNREGISTERED" | "SESSION_REVOKED" | "SESSION_EXPIRED" | "USER_DEACTIVATED" => {
            ClientError::Unauthorized
        }
        _ if code == 401 => ClientError::Unauthorized,
        _ if code == 420 || code == 429 => ClientError::FloodWait {
            seconds: seconds.unwrap_or(0),
        },
        _ => ClientError::Rpc {
            code,
            name: name.to_string(),
        },
    }
}

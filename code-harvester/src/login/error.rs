//! Login flow error taxonomy.

use thiserror::Error;

use crate::client::ClientError;

/// Errors surfaced by the login handshake.
///
/// Each kind carries a [`user_message`](LoginError::user_message) suitable for
/// showing to the person completing the login.
#[derive(Debug, Error)]
pub enum LoginError {
    #[error("Invalid login code")]
    InvalidCode,

    #[error("Login code expired")]
    ExpiredCode,

    /// The account has a second factor. The pending login is kept; retry
    /// with a password.
    #[error("Two-step verification password required")]
    PasswordRequired,

    #[error("Invalid two-step verification password")]
    InvalidPassword,

    /// The configured application id/hash were rejected upstream.
    #[error("Invalid API credentials configured")]
    InvalidCredentialsConfig,

    #[error("Rate limited by upstream")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("No pending login for this phone")]
    NoPendingLogin,

    #[error("A login for this phone is already in progress")]
    LoginInProgress,

    /// The phone is already attached to a different owner.
    #[error("Phone is attached to another owner")]
    PhoneOwnedElsewhere,

    #[error("Invalid phone number: {0}")]
    InvalidPhone(String),

    #[error("Failed to send login code: {0}")]
    SendFailed(#[source] ClientError),

    #[error("Login failed: {0}")]
    Unknown(String),

    #[error("Storage error: {0}")]
    Storage(#[from] crate::Error),
}

impl LoginError {
    /// Human-readable message for the caller to surface.
    pub fn user_message(&self) -> String {
        match self {
            Self::InvalidCode => "The code you entered is incorrect.".to_string(),
            Self::ExpiredCode => {
                "The code has expired. Request a new code and try again.".to_string()
            }
            Self::PasswordRequired => {
                "This account has two-step verification enabled. Enter your password.".to_string()
            }
            Self::InvalidPassword => "The two-step verification password is incorrect.".to_string(),
            Self::InvalidCredentialsConfig => {
                "The server's API credentials are invalid. Contact the administrator.".to_string()
            }
            Self::RateLimited {
                retry_after_secs: Some(secs),
            } => format!("Too many attempts. Try again in {secs} seconds."),
            Self::RateLimited {
                retry_after_secs: None,
            } => "Too many attempts. Try again later.".to_string(),
            Self::NoPendingLogin => {
                "No login is in progress for this phone. Request a code first.".to_string()
            }
            Self::LoginInProgress => {
                "A login for this phone is already in progress. Finish it or wait for it to expire."
                    .to_string()
            }
            Self::PhoneOwnedElsewhere => {
                "This phone number is already linked to another user.".to_string()
            }
            Self::InvalidPhone(_) => "The phone number is not valid.".to_string(),
            Self::SendFailed(ClientError::FloodWait { seconds }) => {
                format!("Too many code requests. Try again in {seconds} seconds.")
            }
            Self::SendFailed(_) => "Failed to send the login code. Try again later.".to_string(),
            Self::Unknown(_) | Self::Storage(_) => "Login failed. Try again later.".to_string(),
        }
    }
}

impl From<ClientError> for LoginError {
    fn from(err: ClientError) -> Self {
        match err {
            ClientError::PasswordRequired => Self::PasswordRequired,
            ClientError::InvalidCode => Self::InvalidCode,
            ClientError::ExpiredCode => Self::ExpiredCode,
            ClientError::InvalidPassword => Self::InvalidPassword,
            ClientError::InvalidApiCredentials => Self::InvalidCredentialsConfig,
            ClientError::FloodWait { seconds } => Self::RateLimited {
                retry_after_secs: Some(seconds),
            },
            other => Self::Unknown(other.to_string()),
        }
    }
}

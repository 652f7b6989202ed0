//! Messaging client capability.
//!
//! The upstream messaging protocol is an external capability. Components only
//! see the [`MessagingClient`] trait and obtain instances from a
//! [`ClientFactory`], one per session blob name.
//!
//! # Architecture
//!
//! - [`MessagingClient`]: connection-scoped operations against one session
//! - [`ClientFactory`]: builds a client bound to a session name
//! - [`TimedClientFactory`]: wraps any factory so every call carries a timeout
//! - [`GatewayClient`]: JSON-over-HTTP client for an external protocol gateway

mod error;
mod gateway;
mod timeout;

pub use error::{ClientError, classify_rpc_error};
pub use gateway::{GatewayClient, GatewayClientFactory};
pub use timeout::{TimedClient, TimedClientFactory};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A message as returned by the upstream history call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub text: String,
    pub date: DateTime<Utc>,
}

/// The signed-in user of a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfIdentity {
    pub id: i64,
    pub username: Option<String>,
    pub first_name: Option<String>,
}

/// Connection-scoped operations against a single session.
///
/// A client is bound to one session blob name at construction. `connect`
/// materializes the blob (creating an empty one if none exists) and
/// `disconnect` persists whatever the upstream handed back.
#[async_trait]
pub trait MessagingClient: Send {
    async fn connect(&mut self) -> Result<(), ClientError>;

    async fn disconnect(&mut self) -> Result<(), ClientError>;

    async fn is_authorized(&mut self) -> Result<bool, ClientError>;

    /// Ask the upstream service to send a login code to `phone`.
    async fn request_code(&mut self, phone: &str) -> Result<(), ClientError>;

    /// Sign in with the code delivered to `phone`.
    ///
    /// Fails with [`ClientError::PasswordRequired`] when the account has a
    /// second factor; the caller then continues with [`check_password`](Self::check_password)
    /// on the same connection.
    async fn sign_in(&mut self, phone: &str, code: &str) -> Result<(), ClientError>;

    async fn check_password(&mut self, password: &str) -> Result<(), ClientError>;

    /// Most recent messages from `sender_id`, newest first, at most `limit`.
    async fn recent_messages(
        &mut self,
        sender_id: i64,
        limit: usize,
    ) -> Result<Vec<IncomingMessage>, ClientError>;

    async fn get_self(&mut self) -> Result<SelfIdentity, ClientError>;
}

/// Builds clients bound to a session blob name.
pub trait ClientFactory: Send + Sync {
    fn create(&self, session_name: &str) -> Box<dyn MessagingClient>;
}

/// Disconnect, logging instead of propagating failures.
///
/// Used on every exit path where the disconnect outcome cannot change the result.
pub async fn disconnect_quietly(client: &mut dyn MessagingClient, session_name: &str) {
    if let Err(e) = client.disconnect().await {
        debug!(session = %session_name, error = %e, "Disconnect failed (ignored)");
    }
}

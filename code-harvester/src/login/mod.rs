//! Account login.
//!
//! A login is a short-lived state machine driven by two calls:
//! [`LoginOrchestrator::send_verification_code`] opens a connection on a
//! temporary session blob and parks it in the [`CredentialCache`];
//! [`LoginOrchestrator::verify_and_create_session`] signs in on that same
//! connection and publishes the blob under its final name.

mod cache;
mod error;
mod orchestrator;
mod state;

pub use cache::{CredentialCache, CredentialCacheConfig, PendingLogin};
pub use error::LoginError;
pub use orchestrator::LoginOrchestrator;
pub use state::{DuplicateLoginPolicy, LoginState};

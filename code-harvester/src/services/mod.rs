//! Service layer.
//!
//! [`ServiceContainer`] wires every component; [`AccountService`] is the
//! owner-facing entry point for attaching accounts and reading their codes.

pub mod accounts;
pub mod container;

pub use accounts::AccountService;
pub use container::ServiceContainer;

//! code-harvester library crate.
//!
//! Attaches messaging accounts through a phone-code login, then harvests the
//! one-time codes the official sender delivers to them and keeps their
//! sessions alive.

pub mod client;
pub mod config;
pub mod database;
pub mod error;
pub mod harvester;
pub mod keepalive;
pub mod logging;
pub mod login;
pub mod scheduler;
pub mod services;
pub mod session;
pub mod utils;

pub use error::{Error, Result};

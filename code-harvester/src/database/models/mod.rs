//! Database models for code-harvester.
//!
//! These models map directly to the database schema.

pub mod account;
pub mod verification_code;

pub use account::*;
pub use verification_code::*;

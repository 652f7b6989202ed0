//! Repository layer for database access.
//!
//! Components depend on the repository traits, never on `sqlx` directly.

pub mod account;
pub mod verification_code;

pub use account::*;
pub use verification_code::*;

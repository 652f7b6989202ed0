//! Verification code harvesting.
//!
//! [`CodeHarvester`] opens an authorized session, reads the newest messages
//! from the official sender and records every 5–6 digit code it has not seen
//! within the dedup window.

mod extractor;
mod service;
mod summary;

pub use extractor::extract_codes;
pub use service::{CodeHarvester, HarvestConfig, HarvestOutcome};
pub use summary::{AccountRunResult, BatchSummary, RunStatus};

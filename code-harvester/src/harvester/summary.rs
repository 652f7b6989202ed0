//! Per-account results of a batch job.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use crate::session::mask_phone;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunStatus {
    Succeeded,
    /// The session is no longer signed in.
    Unauthorized,
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct AccountRunResult {
    pub account_id: String,
    pub phone: String,
    #[serde(flatten)]
    pub status: RunStatus,
    /// Codes inserted during this run.
    pub new_codes: usize,
}

/// Outcome of one harvest or keep-alive cycle.
#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub job: &'static str,
    pub results: Vec<AccountRunResult>,
    pub elapsed: Duration,
}

impl BatchSummary {
    pub fn new(job: &'static str) -> Self {
        Self {
            job,
            results: Vec::new(),
            elapsed: Duration::ZERO,
        }
    }

    pub fn push(&mut self, result: AccountRunResult) {
        self.results.push(result);
    }

    pub fn total(&self) -> usize {
        self.results.len()
    }

    pub fn succeeded(&self) -> usize {
        self.count(|s| matches!(s, RunStatus::Succeeded))
    }

    pub fn unauthorized(&self) -> usize {
        self.count(|s| matches!(s, RunStatus::Unauthorized))
    }

    pub fn failed(&self) -> usize {
        self.count(|s| matches!(s, RunStatus::Failed { .. }))
    }

    pub fn new_codes(&self) -> usize {
        self.results.iter().map(|r| r.new_codes).sum()
    }

    fn count(&self, pred: impl Fn(&RunStatus) -> bool) -> usize {
        self.results.iter().filter(|r| pred(&r.status)).count()
    }

    /// Log one line for the cycle and one per failed account.
    pub fn log(&self) {
        for r in &self.results {
            if let RunStatus::Failed { reason } = &r.status {
                warn!(
                    job = self.job,
                    account_id = %r.account_id,
                    phone = %mask_phone(&r.phone),
                    reason = %reason,
                    "Account run failed"
                );
            }
        }
        info!(
            job = self.job,
            total = self.total(),
            succeeded = self.succeeded(),
            unauthorized = self.unauthorized(),
            failed = self.failed(),
            new_codes = self.new_codes(),
            elapsed_ms = self.elapsed.as_millis() as u64,
            "Batch finished"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: RunStatus, new_codes: usize) -> AccountRunResult {
        AccountRunResult {
            account_id: "a".into(),
            phone: "+10000000001".into(),
            status,
            new_codes,
        }
    }

    #[test]
    fn test_counts() {
        let mut summary = BatchSummary::new("harvest");
        summary.push(result(RunStatus::Succeeded, 2));
        summary.push(result(RunStatus::Succeeded, 0));
        summary.push(result(RunStatus::Unauthorized, 0));
        summary.push(result(
            RunStatus::Failed {
                reason: "timeout".into(),
            },
            0,
        ));

        assert_eq!(summary.total(), 4);
        assert_eq!(summary.succeeded(), 2);
        assert_eq!(summary.unauthorized(), 1);
        assert_eq!(summary.failed(), 1);
        assert_eq!(summary.new_codes(), 2);
    }

    #[test]
    fn test_serializes_flat_status() {
        let json = serde_json::to_value(result(
            RunStatus::Failed {
                reason: "boom".into(),
            },
            0,
        ))
        .unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["reason"], "boom");
    }
}

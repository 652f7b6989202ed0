//! Background timelines.
//!
//! Four independent loops share one [`CancellationToken`](tokio_util::sync::CancellationToken):
//!
//! - harvest: every `harvest_interval`, check all active accounts
//! - keep-alive: self-rescheduling, next run 4–5 days after the previous one finished
//! - retention: daily deletion of codes older than the retention period
//! - login sweep: abandon pending logins idle past their TTL
//!
//! Each job runs in its own task, so an error or panic is logged and the
//! next occurrence still fires.

mod jitter;
mod service;

pub use jitter::next_keepalive_delay;
pub use service::{Scheduler, SchedulerConfig};

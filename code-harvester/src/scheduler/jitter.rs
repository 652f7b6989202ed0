use std::time::Duration;

use rand::RngExt;

/// Draw the delay until the next keep-alive run.
///
/// Uniform over whole seconds strictly between `min` and `max`, so
/// accounts attached at the same time drift apart.
pub fn next_keepalive_delay(min: Duration, max: Duration) -> Duration {
    let lo = min.as_secs().saturating_add(1);
    let hi = max.as_secs();
    if lo >= hi {
        return min;
    }
    Duration::from_secs(rand::rng().random_range(lo..hi))
}

//! Timestamp helpers for the database layer.
//!
//! Timestamps are stored as `INTEGER` Unix epoch milliseconds (UTC).

use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

/// Current time as Unix epoch milliseconds (UTC).
#[inline]
pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

#[inline]
pub fn datetime_to_ms(dt: DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

/// Convert Unix epoch milliseconds to `DateTime<Utc>`.
///
/// Out-of-range values fall back to the Unix epoch instead of panicking.
#[inline]
pub fn ms_to_datetime(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms)
        .earliest()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// The instant `window` before `now`, in epoch milliseconds.
///
/// Rows stamped at or after the returned value are "inside" the window.
pub fn window_start_ms(now: DateTime<Utc>, window: Duration) -> i64 {
    let window_ms = i64::try_from(window.as_millis()).unwrap_or(i64::MAX);
    datetime_to_ms(now).saturating_sub(window_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_preserves_millisecond_precision() {
        let ms = 1_700_000_000_123;
        assert_eq!(datetime_to_ms(ms_to_datetime(ms)), ms);
    }

    #[test]
    fn test_window_start() {
        let now = ms_to_datetime(10_000_000);
        assert_eq!(window_start_ms(now, Duration::from_secs(60)), 10_000_000 - 60_000);
        assert_eq!(window_start_ms(now, Duration::MAX), 10_000_000 - i64::MAX);
    }
}

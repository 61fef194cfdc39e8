// Timestamp helpers shared by the cache store, refresh engine, and dedup set.
//
// These all read wall-clock time via `SystemTime::now()`. That is fine here:
// nothing in this crate is consensus-critical, every use is either a cache
// freshness check, a log timestamp, or a heartbeat comparison.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

pub type TimestampMillis = u64;
pub type TimestampSeconds = u64;

#[inline]
pub fn get_current_time() -> Duration {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the unix epoch")
}

pub fn get_current_time_in_seconds() -> TimestampSeconds {
    get_current_time().as_secs()
}

pub fn get_current_time_in_millis() -> TimestampMillis {
    get_current_time().as_millis() as TimestampMillis
}

/// Seconds elapsed since `since`, saturating at zero if `since` is in the future.
pub fn elapsed_seconds_since(since: TimestampSeconds) -> u64 {
    get_current_time_in_seconds().saturating_sub(since)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_time_seconds_is_monotonic_enough() {
        let a = get_current_time_in_seconds();
        let b = get_current_time_in_seconds();
        assert!(b >= a);
    }

    #[test]
    fn elapsed_seconds_since_future_saturates_to_zero() {
        let future = get_current_time_in_seconds() + 3600;
        assert_eq!(elapsed_seconds_since(future), 0);
    }

    #[test]
    fn elapsed_seconds_since_past_is_positive() {
        let past = get_current_time_in_seconds().saturating_sub(60);
        assert!(elapsed_seconds_since(past) >= 60);
    }
}

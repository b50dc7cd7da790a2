//! Test utilities and clock fixtures.
//!
//! This module provides shared testing infrastructure:
//! - Fixed-time mocks for [`TimeProvider`]
//! - A manually advanced clock for eviction and uptime tests
//!
//! Only compiled for tests (`#[cfg(test)]`).

#![allow(clippy::unwrap_used, clippy::expect_used)]

use crate::traits::{MockTimeProvider, TimeProvider};
use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicU64, Ordering};

/// Create a mock time provider that returns a fixed timestamp.
///
/// # Example
///
/// ```ignore
/// let fixed_time = Utc::now();
/// let mock = mock_time(fixed_time);
/// assert_eq!(mock.now(), fixed_time);
/// ```
#[must_use]
pub fn mock_time(time: DateTime<Utc>) -> MockTimeProvider {
    let mut mock = MockTimeProvider::new();
    mock.expect_now().return_const(time);
    mock
}

/// Create a mock time provider from an ISO 8601 timestamp string.
///
/// # Panics
///
/// Panics if the timestamp string is invalid.
#[must_use]
pub fn mock_time_str(timestamp: &str) -> MockTimeProvider {
    let time = timestamp
        .parse::<DateTime<Utc>>()
        .expect("Invalid timestamp format");
    mock_time(time)
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    /// Start the clock at `millis` since the Unix epoch.
    #[must_use]
    pub const fn new(millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(millis),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, millis: u64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    /// Current reading in epoch milliseconds.
    #[must_use]
    pub fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}

impl TimeProvider for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = i64::try_from(self.now_millis()).expect("clock overflow");
        DateTime::from_timestamp_millis(millis).expect("clock out of range")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::unix_millis;

    #[test]
    fn test_mock_time() {
        let fixed_time = Utc::now() - chrono::Duration::days(1);
        let mock = mock_time(fixed_time);
        assert_eq!(mock.now(), fixed_time);
    }

    #[test]
    fn test_mock_time_str() {
        let mock = mock_time_str("2024-01-15T12:00:00Z");
        assert_eq!(mock.now().to_rfc3339(), "2024-01-15T12:00:00+00:00");
    }

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::new(1_000);
        assert_eq!(unix_millis(clock.now()), 1_000);
        clock.advance(250);
        assert_eq!(clock.now_millis(), 1_250);
        assert_eq!(unix_millis(clock.now()), 1_250);
    }
}

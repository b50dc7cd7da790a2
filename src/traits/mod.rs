//! Trait definitions for injectable dependencies.
//!
//! This module defines [`TimeProvider`], the clock the series store stamps
//! data points with. Production code uses [`RealTimeProvider`]; tests inject
//! fixed or manually advanced clocks.
//!
//! # Mocking
//!
//! The trait is annotated with `#[cfg_attr(test, mockall::automock)]`
//! which generates a mock implementation automatically for testing.
//!
//! # Example
//!
//! ```
//! use rag_metrics::traits::{unix_millis, RealTimeProvider, TimeProvider};
//!
//! let time_provider = RealTimeProvider;
//! assert!(unix_millis(time_provider.now()) > 0);
//! ```

use chrono::{DateTime, Utc};

/// Time provider trait for deterministic testing.
#[cfg_attr(test, mockall::automock)]
pub trait TimeProvider: Send + Sync {
    /// Get the current time.
    fn now(&self) -> DateTime<Utc>;
}

/// Milliseconds since the Unix epoch. Instants before the epoch clamp to 0.
#[must_use]
pub fn unix_millis(time: DateTime<Utc>) -> u64 {
    u64::try_from(time.timestamp_millis()).unwrap_or(0)
}

/// Real time provider using the system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

//! Data types held and produced by the series store.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Diagnostic context attached to a data point. Never read by aggregation.
pub type Metadata = HashMap<String, serde_json::Value>;

/// Default maximum number of points retained per series.
pub const DEFAULT_MAX_POINTS: usize = 1000;

/// Default retention window (24 hours).
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(24 * 60 * 60);

/// A single observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    /// Observed value.
    pub value: f64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Optional diagnostic context.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Metadata>,
}

impl DataPoint {
    /// Create a new data point.
    #[must_use]
    pub const fn new(value: f64, timestamp: u64, metadata: Option<Metadata>) -> Self {
        Self {
            value,
            timestamp,
            metadata,
        }
    }
}

/// Statistics over the points currently retained by a series.
///
/// The `Default` value (all zeros) is what an empty or unknown series reports.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct SeriesStats {
    /// Value of the most recent point.
    pub current: f64,
    /// Arithmetic mean of retained values.
    pub average: f64,
    /// Smallest retained value.
    pub min: f64,
    /// Largest retained value.
    pub max: f64,
    /// Number of retained points.
    pub count: usize,
    /// Timestamp of the most recent point, 0 if empty.
    pub last_updated: u64,
}

impl SeriesStats {
    /// Compute statistics over points in chronological order.
    #[must_use]
    pub fn from_points<'a, I>(points: I) -> Self
    where
        I: IntoIterator<Item = &'a DataPoint>,
    {
        let mut iter = points.into_iter();
        let Some(first) = iter.next() else {
            return Self::default();
        };

        let mut stats = Self {
            current: first.value,
            average: 0.0,
            min: first.value,
            max: first.value,
            count: 1,
            last_updated: first.timestamp,
        };
        let mut sum = first.value;

        for point in iter {
            sum += point.value;
            stats.count += 1;
            stats.min = stats.min.min(point.value);
            stats.max = stats.max.max(point.value);
            stats.current = point.value;
            stats.last_updated = point.timestamp;
        }

        #[allow(clippy::cast_precision_loss)]
        {
            stats.average = sum / stats.count as f64;
        }
        stats
    }

    /// True when no points back these statistics.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Sliding-window retention applied to every series.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    /// Maximum number of points kept per series.
    pub max_points: usize,
    /// Maximum age of a kept point.
    pub window: Duration,
}

impl RetentionPolicy {
    /// Create a retention policy.
    #[must_use]
    pub const fn new(max_points: usize, window: Duration) -> Self {
        Self { max_points, window }
    }

    /// Window length in milliseconds, saturating at `u64::MAX`.
    #[must_use]
    pub fn window_ms(&self) -> u64 {
        u64::try_from(self.window.as_millis()).unwrap_or(u64::MAX)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_POINTS, DEFAULT_WINDOW)
    }
}

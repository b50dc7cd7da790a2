//! Bounded, per-series point retention.
//!
//! The [`SeriesStore`] maps series names to chronologically ordered points
//! and enforces a [`RetentionPolicy`] on every write: first the count bound,
//! then the age bound, both evicting from the head. Eviction happens lazily on
//! write, so no background sweep is needed.
//!
//! The store knows nothing about what a series means; see
//! [`crate::metrics`] for the domain facade.
//!
//! # Example
//!
//! ```
//! use rag_metrics::store::{RetentionPolicy, SeriesStore};
//! use std::time::Duration;
//!
//! let store = SeriesStore::new(RetentionPolicy::new(2, Duration::from_secs(60)));
//! store.record("latency", 10.0, None).unwrap();
//! store.record("latency", 20.0, None).unwrap();
//! store.record("latency", 30.0, None).unwrap();
//!
//! let stats = store.stats("latency");
//! assert_eq!(stats.count, 2);
//! assert_eq!(stats.min, 20.0);
//! assert_eq!(stats.current, 30.0);
//! ```

mod types;

pub use types::{
    DataPoint, Metadata, RetentionPolicy, SeriesStats, DEFAULT_MAX_POINTS, DEFAULT_WINDOW,
};

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::MetricsError;
use crate::traits::{unix_millis, RealTimeProvider, TimeProvider};

type SeriesMap = HashMap<String, VecDeque<DataPoint>>;

/// Thread-safe store of named, bounded series.
///
/// One lock guards the whole map: writers serialize against each other and
/// against readers, so a series is never observed mid-eviction.
pub struct SeriesStore {
    series: RwLock<SeriesMap>,
    policy: RetentionPolicy,
    clock: Arc<dyn TimeProvider>,
}

impl SeriesStore {
    /// Create a store using the system clock.
    #[must_use]
    pub fn new(policy: RetentionPolicy) -> Self {
        Self::with_clock(policy, Arc::new(RealTimeProvider))
    }

    /// Create a store stamping points with the given clock.
    #[must_use]
    pub fn with_clock(policy: RetentionPolicy, clock: Arc<dyn TimeProvider>) -> Self {
        Self {
            series: RwLock::new(HashMap::new()),
            policy,
            clock,
        }
    }

    /// The retention policy applied on every write.
    #[must_use]
    pub const fn policy(&self) -> &RetentionPolicy {
        &self.policy
    }

    /// Current time according to the store's clock, in epoch milliseconds.
    #[must_use]
    pub fn now_millis(&self) -> u64 {
        unix_millis(self.clock.now())
    }

    /// Append a value to the named series, creating it if absent.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidValue`] if `value` is NaN or infinite.
    /// Every finite value is accepted as given.
    pub fn record(
        &self,
        name: &str,
        value: f64,
        metadata: Option<Metadata>,
    ) -> Result<(), MetricsError> {
        if !value.is_finite() {
            tracing::warn!(series = %name, value, "Rejected non-finite metric value");
            return Err(MetricsError::InvalidValue {
                series: name.to_string(),
                value,
            });
        }

        let mut series = self.write();
        // Stamp under the lock so timestamps never decrease within a series.
        let now = self.now_millis();
        let points = series.entry(name.to_string()).or_default();
        points.push_back(DataPoint::new(value, now, metadata));

        let evicted = self.evict(points, now);
        if evicted > 0 {
            tracing::trace!(series = %name, evicted, retained = points.len(), "Evicted metric points");
        }
        Ok(())
    }

    /// Statistics over the retained points of a series.
    ///
    /// Absent and empty series report [`SeriesStats::default`].
    #[must_use]
    pub fn stats(&self, name: &str) -> SeriesStats {
        self.read()
            .get(name)
            .map(SeriesStats::from_points)
            .unwrap_or_default()
    }

    /// Statistics for several series taken under a single read lock.
    #[must_use]
    pub fn stats_many(&self, names: &[&str]) -> Vec<SeriesStats> {
        let series = self.read();
        names
            .iter()
            .map(|name| {
                series
                    .get(*name)
                    .map(SeriesStats::from_points)
                    .unwrap_or_default()
            })
            .collect()
    }

    /// Fresh statistics for every known series, keyed by name.
    #[must_use]
    pub fn all_stats(&self) -> BTreeMap<String, SeriesStats> {
        self.read()
            .iter()
            .map(|(name, points)| (name.clone(), SeriesStats::from_points(points)))
            .collect()
    }

    /// Copy of the retained points of a series, oldest first.
    #[must_use]
    pub fn points(&self, name: &str) -> Vec<DataPoint> {
        self.read()
            .get(name)
            .map(|points| points.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Names of all known series, sorted.
    #[must_use]
    pub fn series_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Discard every series and all of their points.
    pub fn clear(&self) {
        let mut series = self.write();
        let discarded = series.len();
        series.clear();
        tracing::debug!(discarded, "Cleared metric series");
    }

    /// Drop head points over the count bound, then head points older than the window.
    fn evict(&self, points: &mut VecDeque<DataPoint>, now: u64) -> usize {
        let before = points.len();

        while points.len() > self.policy.max_points {
            points.pop_front();
        }

        let cutoff = now.saturating_sub(self.policy.window_ms());
        while points.front().is_some_and(|p| p.timestamp < cutoff) {
            points.pop_front();
        }

        before - points.len()
    }

    fn read(&self) -> RwLockReadGuard<'_, SeriesMap> {
        self.series.read().unwrap_or_else(|poison_error| {
            tracing::warn!(
                error = %poison_error,
                "Reading series from poisoned lock, using recovered data"
            );
            poison_error.into_inner()
        })
    }

    fn write(&self) -> RwLockWriteGuard<'_, SeriesMap> {
        self.series.write().unwrap_or_else(|poison_error| {
            tracing::warn!(
                error = %poison_error,
                "Writing series through poisoned lock, using recovered data"
            );
            poison_error.into_inner()
        })
    }
}

impl Default for SeriesStore {
    fn default() -> Self {
        Self::new(RetentionPolicy::default())
    }
}

impl fmt::Debug for SeriesStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeriesStore")
            .field("policy", &self.policy)
            .field("series", &self.series_names())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::float_cmp,
    clippy::cast_precision_loss
)]
mod tests {
    use super::*;
    use crate::test_utils::ManualClock;
    use proptest::prelude::*;
    use static_assertions::assert_impl_all;
    use std::time::Duration;

    assert_impl_all!(SeriesStore: Send, Sync);

    fn store_with(max_points: usize, window_ms: u64) -> (SeriesStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = SeriesStore::with_clock(
            RetentionPolicy::new(max_points, Duration::from_millis(window_ms)),
            clock.clone(),
        );
        (store, clock)
    }

    #[test]
    fn test_record_creates_series_lazily() {
        let (store, _clock) = store_with(10, 60_000);
        assert!(store.series_names().is_empty());

        store.record("a", 1.0, None).unwrap();
        assert_eq!(store.series_names(), vec!["a".to_string()]);
    }

    #[test]
    fn test_record_stamps_with_clock() {
        let (store, clock) = store_with(10, 60_000);
        store.record("a", 1.0, None).unwrap();
        clock.advance(250);
        store.record("a", 2.0, None).unwrap();

        let points = store.points("a");
        assert_eq!(points[0].timestamp, 1_000_000);
        assert_eq!(points[1].timestamp, 1_000_250);
        assert_eq!(store.stats("a").last_updated, 1_000_250);
    }

    #[test]
    fn test_record_keeps_metadata() {
        let (store, _clock) = store_with(10, 60_000);
        let mut metadata = Metadata::new();
        metadata.insert("endpoint".into(), serde_json::json!("/search"));
        store.record("a", 1.0, Some(metadata.clone())).unwrap();

        assert_eq!(store.points("a")[0].metadata, Some(metadata));
    }

    #[test]
    fn test_record_rejects_non_finite() {
        let (store, _clock) = store_with(10, 60_000);
        for value in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let err = store.record("a", value, None).unwrap_err();
            assert!(matches!(err, MetricsError::InvalidValue { ref series, .. } if series == "a"));
        }
        assert!(store.series_names().is_empty());
    }

    #[test]
    fn test_record_accepts_out_of_range_values() {
        let (store, _clock) = store_with(10, 60_000);
        store.record("a", -5.0, None).unwrap();
        store.record("a", 1e12, None).unwrap();
        let stats = store.stats("a");
        assert_eq!(stats.min, -5.0);
        assert_eq!(stats.max, 1e12);
    }

    #[test]
    fn test_stats_unknown_series_is_zeroed() {
        let (store, _clock) = store_with(10, 60_000);
        assert_eq!(store.stats("missing"), SeriesStats::default());
    }

    #[test]
    fn test_count_eviction_drops_oldest() {
        let (store, clock) = store_with(3, 60_000);
        for v in 1..=5 {
            store.record("a", f64::from(v), None).unwrap();
            clock.advance(1);
        }
        let values: Vec<f64> = store.points("a").iter().map(|p| p.value).collect();
        assert_eq!(values, vec![3.0, 4.0, 5.0]);
    }

    #[test]
    fn test_window_eviction_drops_stale_points() {
        let (store, clock) = store_with(100, 1_000);
        store.record("a", 1.0, None).unwrap();
        clock.advance(600);
        store.record("a", 2.0, None).unwrap();
        clock.advance(600);
        store.record("a", 3.0, None).unwrap();

        // First point is 1200ms old and falls outside the 1000ms window.
        let values: Vec<f64> = store.points("a").iter().map(|p| p.value).collect();
        assert_eq!(values, vec![2.0, 3.0]);
    }

    #[test]
    fn test_window_boundary_point_is_retained() {
        let (store, clock) = store_with(100, 1_000);
        store.record("a", 1.0, None).unwrap();
        clock.advance(1_000);
        store.record("a", 2.0, None).unwrap();
        assert_eq!(store.stats("a").count, 2);
    }

    #[test]
    fn test_eviction_only_touches_target_series() {
        let (store, clock) = store_with(100, 1_000);
        store.record("a", 1.0, None).unwrap();
        clock.advance(5_000);
        store.record("b", 1.0, None).unwrap();

        // "a" is stale but is only purged on its own next write.
        assert_eq!(store.stats("a").count, 1);
        store.record("a", 2.0, None).unwrap();
        assert_eq!(store.stats("a").count, 1);
        assert_eq!(store.stats("a").current, 2.0);
    }

    #[test]
    fn test_all_stats_covers_every_series() {
        let (store, _clock) = store_with(10, 60_000);
        store.record("a", 1.0, None).unwrap();
        store.record("b", 2.0, None).unwrap();
        store.record("b", 4.0, None).unwrap();

        let all = store.all_stats();
        assert_eq!(all.len(), 2);
        assert_eq!(all["a"].count, 1);
        assert_eq!(all["b"].average, 3.0);
    }

    #[test]
    fn test_stats_many_matches_individual_stats() {
        let (store, _clock) = store_with(10, 60_000);
        store.record("a", 1.0, None).unwrap();
        store.record("b", 2.0, None).unwrap();

        let many = store.stats_many(&["a", "missing", "b"]);
        assert_eq!(many, vec![store.stats("a"), SeriesStats::default(), store.stats("b")]);
    }

    #[test]
    fn test_clear_discards_everything() {
        let (store, _clock) = store_with(10, 60_000);
        store.record("a", 1.0, None).unwrap();
        store.record("b", 1.0, None).unwrap();
        store.clear();

        assert!(store.all_stats().is_empty());
        store.record("a", 5.0, None).unwrap();
        assert_eq!(store.stats("a").count, 1);
    }

    #[test]
    fn test_concurrent_writers_respect_bound() {
        let store = Arc::new(SeriesStore::new(RetentionPolicy::new(
            50,
            Duration::from_secs(60),
        )));
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for i in 0..200 {
                        store.record("shared", f64::from(t * 1000 + i), None).unwrap();
                        assert!(store.stats("shared").count <= 50);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let points = store.points("shared");
        assert_eq!(points.len(), 50);
        assert!(points.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));
    }

    #[test]
    fn test_debug_lists_series() {
        let (store, _clock) = store_with(10, 60_000);
        store.record("latency", 1.0, None).unwrap();
        let debug = format!("{store:?}");
        assert!(debug.contains("SeriesStore"));
        assert!(debug.contains("latency"));
    }

    proptest! {
        #[test]
        fn prop_length_bounded_and_fifo(
            max_points in 1usize..20,
            steps in proptest::collection::vec((0u64..500, -1e6f64..1e6), 1..200),
        ) {
            let (store, clock) = store_with(max_points, 2_000);
            let mut arrivals: Vec<(u64, f64)> = Vec::new();

            for (delay, value) in steps {
                clock.advance(delay);
                store.record("s", value, None).unwrap();
                arrivals.push((clock.now_millis(), value));

                let points = store.points("s");
                prop_assert!(points.len() <= max_points);

                let cutoff = clock.now_millis().saturating_sub(2_000);
                prop_assert!(points.iter().all(|p| p.timestamp >= cutoff));

                // Retained points are exactly the newest suffix of arrivals.
                let suffix = &arrivals[arrivals.len() - points.len()..];
                let retained: Vec<(u64, f64)> =
                    points.iter().map(|p| (p.timestamp, p.value)).collect();
                prop_assert_eq!(retained, suffix.to_vec());
            }
        }

        #[test]
        fn prop_stats_match_retained_values(
            values in proptest::collection::vec(-1e6f64..1e6, 1..100),
        ) {
            let (store, clock) = store_with(1_000, 60_000);
            for v in &values {
                store.record("s", *v, None).unwrap();
                clock.advance(1);
            }

            let stats = store.stats("s");
            let sum: f64 = values.iter().sum();
            prop_assert_eq!(stats.count, values.len());
            prop_assert!((stats.average - sum / values.len() as f64).abs() < 1e-6);
            prop_assert_eq!(stats.min, values.iter().copied().fold(f64::INFINITY, f64::min));
            prop_assert_eq!(stats.max, values.iter().copied().fold(f64::NEG_INFINITY, f64::max));
            prop_assert_eq!(stats.current, *values.last().unwrap());
        }
    }
}

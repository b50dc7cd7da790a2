//! Metrics aggregation for the retrieval and generation pipeline.
//!
//! This module provides:
//! - Typed recording for the five tracked series
//! - Report snapshots with percentage scaling and empty-series placeholders
//! - A display-formatted summary for dashboards
//! - Lifetime request counters
//! - Scoped latency measurement ([`LatencyGuard`], [`measure_latency`])
//!
//! # Example
//!
//! ```
//! use rag_metrics::metrics::MetricsAggregator;
//!
//! let metrics = MetricsAggregator::new();
//! metrics.record_latency(120.0, Some("/search")).unwrap();
//! metrics.record_latency(80.0, Some("/search")).unwrap();
//! metrics.record_request(true);
//!
//! let report = metrics.report();
//! assert_eq!(report.response_latency.average, 100.0);
//! // No accuracy measured yet: the target value is shown.
//! assert_eq!(report.retrieval_accuracy.average, 92.0);
//!
//! let summary = metrics.summary();
//! assert_eq!(summary.avg_latency, "100ms");
//! assert_eq!(summary.success_rate, "100.0%");
//! ```

mod report;
mod timing;

pub use report::{
    format_uptime, MetricsReport, MetricsSummary, RequestTotals, DEFAULT_SUCCESS_RATE,
    RETRIEVAL_ACCURACY_TARGET,
};
pub use timing::{measure_latency, measure_latency_async, LatencyGuard, Timer};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::MetricsError;
use crate::store::{Metadata, RetentionPolicy, SeriesStats, SeriesStore};
use crate::traits::{RealTimeProvider, TimeProvider};

/// Report format version.
pub const REPORT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// HTTP status codes below this count as successful requests.
pub const SUCCESS_STATUS_LIMIT: u16 = 400;

/// The fixed set of series the aggregator maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Series {
    /// Retrieval accuracy, a fraction in [0, 1].
    RetrievalAccuracy,
    /// Response latency in milliseconds.
    ResponseLatency,
    /// Hallucination detection outcomes, 1.0 or 0.0.
    HallucinationRate,
    /// Token counts per call.
    TokensUsed,
    /// Request outcomes, 1.0 or 0.0.
    SuccessRate,
}

impl Series {
    /// Every tracked series, in report order.
    pub const ALL: [Self; 5] = [
        Self::RetrievalAccuracy,
        Self::ResponseLatency,
        Self::HallucinationRate,
        Self::TokensUsed,
        Self::SuccessRate,
    ];

    /// Key the series is stored under.
    #[must_use]
    pub const fn key(self) -> &'static str {
        match self {
            Self::RetrievalAccuracy => "retrievalAccuracy",
            Self::ResponseLatency => "responseLatency",
            Self::HallucinationRate => "hallucinationRate",
            Self::TokensUsed => "tokensUsed",
            Self::SuccessRate => "successRate",
        }
    }
}

impl fmt::Display for Series {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Domain facade over the [`SeriesStore`].
///
/// Construct one per process and share it (typically as
/// `Arc<MetricsAggregator>`) between producers and reporting surfaces.
pub struct MetricsAggregator {
    store: SeriesStore,
    clock: Arc<dyn TimeProvider>,
    start_time: u64,
    // Held across every counter update and its store write so the lifetime
    // totals and the successRate series never disagree.
    totals: Mutex<RequestTotals>,
}

impl MetricsAggregator {
    /// Create an aggregator with the default retention policy and system clock.
    #[must_use]
    pub fn new() -> Self {
        Self::with_policy(RetentionPolicy::default())
    }

    /// Create an aggregator with a custom retention policy.
    #[must_use]
    pub fn with_policy(policy: RetentionPolicy) -> Self {
        Self::with_clock(policy, Arc::new(RealTimeProvider))
    }

    /// Create an aggregator whose store and uptime use `clock`.
    #[must_use]
    pub fn with_clock(policy: RetentionPolicy, clock: Arc<dyn TimeProvider>) -> Self {
        let store = SeriesStore::with_clock(policy, Arc::clone(&clock));
        let start_time = store.now_millis();
        tracing::debug!(
            max_points = policy.max_points,
            window_ms = policy.window_ms(),
            start_time,
            "Metrics aggregator created"
        );
        Self {
            store,
            clock,
            start_time,
            totals: Mutex::new(RequestTotals::default()),
        }
    }

    /// The underlying series store.
    #[must_use]
    pub const fn store(&self) -> &SeriesStore {
        &self.store
    }

    /// Creation time, epoch milliseconds.
    #[must_use]
    pub const fn start_time(&self) -> u64 {
        self.start_time
    }

    /// Record a retrieval accuracy fraction (expected in [0, 1]).
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidValue`] if `accuracy` is not finite.
    pub fn record_retrieval_accuracy(
        &self,
        accuracy: f64,
        info: Option<Metadata>,
    ) -> Result<(), MetricsError> {
        self.store
            .record(Series::RetrievalAccuracy.key(), accuracy, info)
    }

    /// Record a response latency in milliseconds.
    ///
    /// # Errors
    ///
    /// Returns [`MetricsError::InvalidValue`] if `latency_ms` is not finite.
    pub fn record_latency(
        &self,
        latency_ms: f64,
        endpoint: Option<&str>,
    ) -> Result<(), MetricsError> {
        self.store.record(
            Series::ResponseLatency.key(),
            latency_ms,
            tagged("endpoint", endpoint),
        )
    }

    /// Record a measured [`Duration`] as a response latency.
    pub fn record_latency_duration(&self, elapsed: Duration, endpoint: Option<&str>) {
        let result = self.record_latency(elapsed.as_secs_f64() * 1000.0, endpoint);
        debug_assert!(result.is_ok(), "duration latency rejected: {result:?}");
    }

    /// Record whether a hallucination was detected in a response.
    pub fn record_hallucination(&self, detected: bool, details: Option<Metadata>) {
        self.record_flag(Series::HallucinationRate, detected, details);
    }

    /// Record the number of tokens a call consumed.
    #[allow(clippy::cast_precision_loss)]
    pub fn record_tokens(&self, count: u64, provider: Option<&str>) {
        let result = self.store.record(
            Series::TokensUsed.key(),
            count as f64,
            tagged("provider", provider),
        );
        debug_assert!(result.is_ok(), "token count rejected: {result:?}");
    }

    /// Record a request outcome and bump the lifetime counters.
    pub fn record_request(&self, success: bool) {
        let mut totals = self.totals();
        totals.total += 1;
        if success {
            totals.successful += 1;
        }
        self.record_flag(Series::SuccessRate, success, None);
    }

    /// Record a completed HTTP exchange: its latency and whether it succeeded.
    ///
    /// Status codes below [`SUCCESS_STATUS_LIMIT`] count as success.
    pub fn observe_response(&self, route: &str, status_code: u16, elapsed: Duration) {
        self.record_latency_duration(elapsed, Some(route));
        self.record_request(status_code < SUCCESS_STATUS_LIMIT);
    }

    /// Start a [`LatencyGuard`] that records under `label` when dropped.
    pub fn time(&self, label: impl Into<String>) -> LatencyGuard<'_> {
        LatencyGuard::new(self, label)
    }

    /// Snapshot of every tracked series with presentation rules applied.
    ///
    /// - retrieval accuracy: ×100, or 92.0 when empty
    /// - hallucination rate: ×100 (0 when empty)
    /// - success rate: ×100, or 100.0 when empty
    /// - latency and tokens: unscaled
    #[must_use]
    pub fn report(&self) -> MetricsReport {
        let keys = Series::ALL.map(Series::key);
        let [retrieval, latency, hallucination, tokens, success]: [SeriesStats; 5] = self
            .store
            .stats_many(&keys)
            .try_into()
            .unwrap_or_default();
        let now = self.store.now_millis();

        MetricsReport {
            retrieval_accuracy: report::as_percent(retrieval, Some(RETRIEVAL_ACCURACY_TARGET)),
            response_latency: latency,
            hallucination_rate: report::as_percent(hallucination, None),
            tokens_used: tokens,
            success_rate: report::as_percent(success, Some(DEFAULT_SUCCESS_RATE)),
            uptime_ms: now.saturating_sub(self.start_time),
            start_time: self.start_time,
            version: REPORT_VERSION.to_string(),
        }
    }

    /// Display-formatted projection of [`Self::report`].
    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary::from(&self.report())
    }

    /// Raw statistics for every series written so far, keyed by series name.
    #[must_use]
    pub fn all_stats(&self) -> BTreeMap<String, SeriesStats> {
        self.store.all_stats()
    }

    /// Lifetime request counters since creation or the last reset.
    #[must_use]
    pub fn request_totals(&self) -> RequestTotals {
        *self.totals()
    }

    /// Clear every series and zero the request counters.
    ///
    /// The start time and version are kept.
    pub fn reset(&self) {
        let mut totals = self.totals();
        self.store.clear();
        *totals = RequestTotals::default();
        drop(totals);
        tracing::info!("Metrics reset");
    }

    fn record_flag(&self, series: Series, flag: bool, metadata: Option<Metadata>) {
        let value = if flag { 1.0 } else { 0.0 };
        let result = self.store.record(series.key(), value, metadata);
        debug_assert!(result.is_ok(), "flag value rejected: {result:?}");
    }

    // Lock order is totals, then the store's series lock.
    fn totals(&self) -> MutexGuard<'_, RequestTotals> {
        self.totals.lock().unwrap_or_else(|poison_error| {
            tracing::warn!(
                error = %poison_error,
                "Request totals lock poisoned, using recovered data"
            );
            poison_error.into_inner()
        })
    }
}

impl Default for MetricsAggregator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for MetricsAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetricsAggregator")
            .field("store", &self.store)
            .field("start_time", &self.start_time)
            .field("requests", &self.request_totals())
            .finish_non_exhaustive()
    }
}

fn tagged(key: &str, value: Option<&str>) -> Option<Metadata> {
    value.map(|v| Metadata::from([(key.to_string(), serde_json::Value::from(v))]))
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
    use crate::test_utils::{mock_time_str, ManualClock};
    use static_assertions::assert_impl_all;

    assert_impl_all!(MetricsAggregator: Send, Sync, Default);
    assert_impl_all!(MetricsReport: Send, Sync, Clone);

    fn manual() -> (MetricsAggregator, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let metrics = MetricsAggregator::with_clock(RetentionPolicy::default(), clock.clone());
        (metrics, clock)
    }

    #[test]
    fn test_series_keys() {
        let keys: Vec<&str> = Series::ALL.iter().map(|s| s.key()).collect();
        assert_eq!(
            keys,
            vec![
                "retrievalAccuracy",
                "responseLatency",
                "hallucinationRate",
                "tokensUsed",
                "successRate"
            ]
        );
        assert_eq!(Series::TokensUsed.to_string(), "tokensUsed");
    }

    #[test]
    fn test_fresh_report_uses_placeholders() {
        let (metrics, _clock) = manual();
        let report = metrics.report();

        assert_eq!(report.retrieval_accuracy.average, 92.0);
        assert_eq!(report.retrieval_accuracy.current, 92.0);
        assert_eq!(report.retrieval_accuracy.count, 0);
        assert_eq!(report.success_rate.average, 100.0);
        assert_eq!(report.success_rate.current, 100.0);
        assert_eq!(report.hallucination_rate.average, 0.0);
        assert_eq!(report.hallucination_rate.current, 0.0);
        assert_eq!(report.response_latency, SeriesStats::default());
        assert_eq!(report.tokens_used, SeriesStats::default());
        assert_eq!(report.version, REPORT_VERSION);
    }

    #[test]
    fn test_latency_stats() {
        let (metrics, clock) = manual();
        metrics.record_latency(120.0, Some("/x")).unwrap();
        clock.advance(10);
        metrics.record_latency(80.0, Some("/x")).unwrap();

        let stats = metrics.store().stats(Series::ResponseLatency.key());
        assert_eq!(stats.current, 80.0);
        assert_eq!(stats.average, 100.0);
        assert_eq!(stats.min, 80.0);
        assert_eq!(stats.max, 120.0);
        assert_eq!(stats.count, 2);
        assert_eq!(stats.last_updated, 1_700_000_000_010);
    }

    #[test]
    fn test_latency_endpoint_metadata() {
        let (metrics, _clock) = manual();
        metrics.record_latency(5.0, Some("/api/query")).unwrap();
        metrics.record_latency(6.0, None).unwrap();

        let points = metrics.store().points(Series::ResponseLatency.key());
        assert_eq!(points[0].metadata.as_ref().unwrap()["endpoint"], "/api/query");
        assert!(points[1].metadata.is_none());
    }

    #[test]
    fn test_retrieval_accuracy_scaled() {
        let (metrics, _clock) = manual();
        metrics.record_retrieval_accuracy(0.95, None).unwrap();
        let report = metrics.report();
        assert!((report.retrieval_accuracy.average - 95.0).abs() < 1e-9);
        assert!((report.retrieval_accuracy.current - 95.0).abs() < 1e-9);
        assert_eq!(report.retrieval_accuracy.max, 0.95);
    }

    #[test]
    fn test_hallucination_rate() {
        let (metrics, _clock) = manual();
        metrics.record_hallucination(true, None);
        metrics.record_hallucination(false, None);
        metrics.record_hallucination(false, None);
        metrics.record_hallucination(false, None);

        let report = metrics.report();
        assert_eq!(report.hallucination_rate.average, 25.0);
        assert_eq!(report.hallucination_rate.current, 0.0);
        assert_eq!(report.hallucination_rate.count, 4);
    }

    #[test]
    fn test_tokens_unscaled_with_provider() {
        let (metrics, _clock) = manual();
        metrics.record_tokens(1200, Some("anthropic"));
        metrics.record_tokens(800, None);

        let report = metrics.report();
        assert_eq!(report.tokens_used.average, 1000.0);
        assert_eq!(report.tokens_used.max, 1200.0);
        let points = metrics.store().points(Series::TokensUsed.key());
        assert_eq!(points[0].metadata.as_ref().unwrap()["provider"], "anthropic");
    }

    #[test]
    fn test_request_counters_and_rate() {
        let (metrics, _clock) = manual();
        metrics.record_request(true);
        metrics.record_request(false);
        metrics.record_request(true);
        metrics.record_request(true);

        assert_eq!(
            metrics.request_totals(),
            RequestTotals {
                total: 4,
                successful: 3
            }
        );
        let report = metrics.report();
        assert_eq!(report.success_rate.average, 75.0);
        assert_eq!(report.success_rate.current, 100.0);
    }

    #[test]
    fn test_observe_response_classifies_status() {
        let (metrics, _clock) = manual();
        metrics.observe_response("/ok", 200, Duration::from_millis(40));
        metrics.observe_response("/redirect", 399, Duration::from_millis(10));
        metrics.observe_response("/missing", 404, Duration::from_millis(10));

        assert_eq!(metrics.request_totals().successful, 2);
        let latency = metrics.store().stats(Series::ResponseLatency.key());
        assert_eq!(latency.count, 3);
        assert_eq!(latency.max, 40.0);
        assert_eq!(latency.current, 10.0);
    }

    #[test]
    fn test_non_finite_rejected_and_not_stored() {
        let (metrics, _clock) = manual();
        assert!(metrics.record_latency(f64::NAN, None).is_err());
        assert!(metrics
            .record_retrieval_accuracy(f64::INFINITY, None)
            .is_err());
        assert!(metrics.all_stats().is_empty());
    }

    #[test]
    fn test_uptime_tracks_clock() {
        let (metrics, clock) = manual();
        clock.advance(3_723_000);
        let report = metrics.report();
        assert_eq!(report.start_time, 1_700_000_000_000);
        assert_eq!(report.uptime_ms, 3_723_000);
        assert_eq!(metrics.summary().uptime, "1h 2m");
    }

    #[test]
    fn test_report_idempotent_without_writes() {
        let (metrics, _clock) = manual();
        metrics.record_retrieval_accuracy(0.87, None).unwrap();
        metrics.record_latency(33.3, None).unwrap();
        metrics.record_hallucination(true, None);

        let first = metrics.report();
        let second = metrics.report();
        assert_eq!(first, second);
        assert_eq!(
            first.retrieval_accuracy.average.to_bits(),
            second.retrieval_accuracy.average.to_bits()
        );
    }

    #[test]
    fn test_report_with_fixed_mock_clock() {
        let clock = Arc::new(mock_time_str("2024-01-15T12:00:00Z"));
        let metrics = MetricsAggregator::with_clock(RetentionPolicy::default(), clock);
        metrics.record_request(false);

        let report = metrics.report();
        assert_eq!(report.uptime_ms, 0);
        assert_eq!(report.success_rate.last_updated, 1_705_320_000_000);
        assert_eq!(report.success_rate.average, 0.0);
    }

    #[test]
    fn test_summary_formats() {
        let (metrics, clock) = manual();
        metrics.record_retrieval_accuracy(0.9, None).unwrap();
        metrics.record_retrieval_accuracy(0.95, None).unwrap();
        metrics.record_latency(100.6, None).unwrap();
        metrics.record_hallucination(false, None);
        metrics.record_request(true);
        clock.advance(45_000);

        let summary = metrics.summary();
        assert_eq!(summary.retrieval_accuracy, "92.5%");
        assert_eq!(summary.avg_latency, "101ms");
        assert_eq!(summary.hallucination_rate, "0.0%");
        assert_eq!(summary.success_rate, "100.0%");
        assert_eq!(summary.uptime, "45s");
    }

    #[test]
    fn test_reset_clears_series_and_counters() {
        let (metrics, clock) = manual();
        metrics.record_latency(10.0, None).unwrap();
        metrics.record_request(true);
        clock.advance(5_000);

        metrics.reset();
        assert!(metrics.all_stats().is_empty());
        assert_eq!(metrics.request_totals(), RequestTotals::default());

        let report = metrics.report();
        assert_eq!(report.start_time, 1_700_000_000_000);
        assert_eq!(report.uptime_ms, 5_000);

        metrics.record_request(true);
        assert_eq!(metrics.report().success_rate.count, 1);
    }

    #[test]
    fn test_totals_agree_with_series_under_concurrent_reset() {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let metrics = Arc::new(MetricsAggregator::with_clock(
            RetentionPolicy::new(100_000, Duration::from_secs(86_400)),
            clock,
        ));
        let barrier = Arc::new(std::sync::Barrier::new(5));
        let mut handles = Vec::new();

        for worker in 0..3 {
            let metrics = Arc::clone(&metrics);
            let barrier = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                for i in 0..2_000 {
                    metrics.record_request((i + worker) % 3 != 0);
                }
            }));
        }
        {
            let metrics = Arc::clone(&metrics);
            let barrier = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                for _ in 0..200 {
                    metrics.reset();
                    std::thread::yield_now();
                }
            }));
        }
        {
            let metrics = Arc::clone(&metrics);
            let barrier = Arc::clone(&barrier);
            handles.push(std::thread::spawn(move || {
                barrier.wait();
                for _ in 0..2_000 {
                    let totals = metrics.request_totals();
                    assert!(totals.successful <= totals.total);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        let totals = metrics.request_totals();
        let points = metrics.store().points(Series::SuccessRate.key());
        assert_eq!(totals.total, points.len() as u64);
        assert_eq!(totals.total, metrics.report().success_rate.count as u64);
        let successes = points.iter().filter(|p| p.value == 1.0).count();
        assert_eq!(totals.successful, successes as u64);
    }

    #[test]
    fn test_time_guard_records_latency() {
        let (metrics, _clock) = manual();
        {
            let _guard = metrics.time("/guarded");
        }
        assert_eq!(metrics.store().stats(Series::ResponseLatency.key()).count, 1);
    }

    #[test]
    fn test_count_bound_via_policy() {
        let clock = Arc::new(ManualClock::new(0));
        let metrics = MetricsAggregator::with_clock(
            RetentionPolicy::new(1000, Duration::from_secs(86_400)),
            clock.clone(),
        );
        for i in 1..=1001 {
            clock.advance(1);
            metrics.record_latency(f64::from(i), None).unwrap();
        }
        let stats = metrics.store().stats(Series::ResponseLatency.key());
        assert_eq!(stats.count, 1000);
        assert_eq!(stats.min, 2.0);
        assert_eq!(stats.current, 1001.0);
    }

    #[test]
    fn test_debug_output() {
        let (metrics, _clock) = manual();
        let debug = format!("{metrics:?}");
        assert!(debug.contains("MetricsAggregator"));
        assert!(debug.contains("start_time"));
    }
}

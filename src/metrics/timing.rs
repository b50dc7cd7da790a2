//! Scoped latency measurement.
//!
//! [`LatencyGuard`] records the elapsed time of a scope into the response
//! latency series when it is dropped, so the measurement is taken on every
//! exit path: normal return, early return, `?` propagation or unwinding.
//!
//! # Example
//!
//! ```
//! use rag_metrics::metrics::{measure_latency, MetricsAggregator};
//!
//! let metrics = MetricsAggregator::new();
//! let result: Result<u32, String> = measure_latency(&metrics, "parse", || Err("bad".into()));
//!
//! assert!(result.is_err());
//! assert_eq!(metrics.all_stats()["responseLatency"].count, 1);
//! ```

use std::future::Future;
use std::time::{Duration, Instant};

use super::MetricsAggregator;

/// Timer for measuring operation latency.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    /// Start a new timer.
    #[must_use]
    pub fn start() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    /// Elapsed time since start.
    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// Get elapsed time in milliseconds.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn elapsed_ms(&self) -> u64 {
        self.start.elapsed().as_millis() as u64
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}

/// Records the lifetime of a scope as one response latency sample.
#[derive(Debug)]
#[must_use = "the latency is recorded when the guard is dropped"]
pub struct LatencyGuard<'a> {
    metrics: &'a MetricsAggregator,
    label: String,
    timer: Timer,
    recorded: bool,
}

impl<'a> LatencyGuard<'a> {
    /// Start timing a scope labelled with `label` (used as the endpoint).
    pub fn new(metrics: &'a MetricsAggregator, label: impl Into<String>) -> Self {
        Self {
            metrics,
            label: label.into(),
            timer: Timer::start(),
            recorded: false,
        }
    }

    /// Label the sample is recorded under.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Record now instead of at drop; returns the elapsed milliseconds.
    pub fn finish(mut self) -> f64 {
        self.record()
    }

    fn record(&mut self) -> f64 {
        let elapsed = self.timer.elapsed();
        if !self.recorded {
            self.recorded = true;
            self.metrics
                .record_latency_duration(elapsed, Some(&self.label));
        }
        elapsed.as_secs_f64() * 1000.0
    }
}

impl Drop for LatencyGuard<'_> {
    fn drop(&mut self) {
        self.record();
    }
}

/// Run `f`, record its latency under `label`, and return its result unchanged.
pub fn measure_latency<T, F>(metrics: &MetricsAggregator, label: &str, f: F) -> T
where
    F: FnOnce() -> T,
{
    let _guard = LatencyGuard::new(metrics, label);
    f()
}

/// Await `future`, record its latency under `label`, and return its output unchanged.
///
/// If the future is dropped before completion the partial latency is still recorded.
pub async fn measure_latency_async<T, Fut>(
    metrics: &MetricsAggregator,
    label: &str,
    future: Fut,
) -> T
where
    Fut: Future<Output = T>,
{
    let _guard = LatencyGuard::new(metrics, label);
    future.await
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::metrics::Series;

    fn latency_points(metrics: &MetricsAggregator) -> Vec<crate::store::DataPoint> {
        metrics.store().points(Series::ResponseLatency.key())
    }

    #[test]
    fn test_timer() {
        let timer = Timer::start();
        std::thread::sleep(Duration::from_millis(10));
        assert!(timer.elapsed_ms() >= 10);
        assert!(timer.elapsed() >= Duration::from_millis(10));
    }

    #[test]
    fn test_timer_default() {
        let timer = Timer::default();
        assert!(timer.elapsed_ms() < 100);
    }

    #[test]
    fn test_guard_records_on_drop() {
        let metrics = MetricsAggregator::new();
        {
            let guard = LatencyGuard::new(&metrics, "scope");
            assert_eq!(guard.label(), "scope");
            std::thread::sleep(Duration::from_millis(5));
        }
        let points = latency_points(&metrics);
        assert_eq!(points.len(), 1);
        assert!(points[0].value >= 5.0);
        let metadata = points[0].metadata.as_ref().unwrap();
        assert_eq!(metadata["endpoint"], "scope");
    }

    #[test]
    fn test_guard_finish_records_once() {
        let metrics = MetricsAggregator::new();
        let guard = LatencyGuard::new(&metrics, "scope");
        let elapsed = guard.finish();
        assert!(elapsed >= 0.0);
        assert_eq!(latency_points(&metrics).len(), 1);
    }

    #[test]
    fn test_measure_latency_passes_through_ok() {
        let metrics = MetricsAggregator::new();
        let value = measure_latency(&metrics, "ok", || 41 + 1);
        assert_eq!(value, 42);
        assert_eq!(latency_points(&metrics).len(), 1);
    }

    #[test]
    fn test_measure_latency_passes_through_err() {
        let metrics = MetricsAggregator::new();
        let result: Result<(), String> = measure_latency(&metrics, "fails", || Err("boom".into()));
        assert_eq!(result, Err("boom".to_string()));
        assert_eq!(latency_points(&metrics).len(), 1);
    }

    #[test]
    fn test_measure_latency_records_on_panic() {
        let metrics = MetricsAggregator::new();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            measure_latency(&metrics, "panics", || panic!("handler crashed"))
        }));
        assert!(outcome.is_err());
        assert_eq!(latency_points(&metrics).len(), 1);
    }

    #[tokio::test]
    async fn test_measure_latency_async() {
        let metrics = MetricsAggregator::new();
        let value = measure_latency_async(&metrics, "async", async {
            tokio::time::sleep(Duration::from_millis(5)).await;
            "done"
        })
        .await;
        assert_eq!(value, "done");

        let points = latency_points(&metrics);
        assert_eq!(points.len(), 1);
        assert!(points[0].value >= 5.0);
    }

    #[tokio::test]
    async fn test_measure_latency_async_error() {
        let metrics = MetricsAggregator::new();
        let result: Result<(), &str> =
            measure_latency_async(&metrics, "async", async { Err("nope") }).await;
        assert_eq!(result, Err("nope"));
        assert_eq!(latency_points(&metrics).len(), 1);
    }

    #[test]
    fn test_measure_latency_async_cancelled() {
        let metrics = MetricsAggregator::new();
        {
            let mut task = tokio_test::task::spawn(measure_latency_async(
                &metrics,
                "cancelled",
                std::future::pending::<()>(),
            ));
            tokio_test::assert_pending!(task.poll());
            assert!(latency_points(&metrics).is_empty());
        }
        let points = latency_points(&metrics);
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].metadata.as_ref().unwrap()["endpoint"], "cancelled");
    }
}

//! Integration tests for RAG Metrics.
//!
//! These tests drive the public API end to end:
//! - Report placeholders and scaling
//! - Count and window eviction
//! - Reset semantics
//! - Concurrent producers
//! - Scoped latency timing
//! - The NDJSON command stream

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::float_cmp)]

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use pretty_assertions::assert_eq;
use rag_metrics::error::MetricsError;
use rag_metrics::ingest::{CommandStream, IngestStats};
use rag_metrics::metrics::{
    measure_latency, measure_latency_async, MetricsAggregator, RequestTotals, Series,
};
use rag_metrics::store::{RetentionPolicy, SeriesStore};

// ============================================================================
// Test Utilities
// ============================================================================

fn latency_stats(metrics: &MetricsAggregator) -> rag_metrics::store::SeriesStats {
    metrics.store().stats(Series::ResponseLatency.key())
}

// ============================================================================
// Report Scenarios
// ============================================================================

#[test]
fn test_fresh_aggregator_report() {
    let metrics = MetricsAggregator::new();
    let report = metrics.report();

    assert_eq!(report.retrieval_accuracy.average, 92.0);
    assert_eq!(report.success_rate.average, 100.0);
    assert_eq!(report.hallucination_rate.average, 0.0);
    assert!(metrics.all_stats().is_empty());
}

#[test]
fn test_latency_statistics() {
    let metrics = MetricsAggregator::new();
    metrics.record_latency(120.0, Some("/x")).unwrap();
    metrics.record_latency(80.0, Some("/x")).unwrap();

    let stats = latency_stats(&metrics);
    assert_eq!(stats.current, 80.0);
    assert_eq!(stats.average, 100.0);
    assert_eq!(stats.min, 80.0);
    assert_eq!(stats.max, 120.0);
    assert_eq!(stats.count, 2);
    assert!(stats.last_updated > 0);
}

#[test]
fn test_single_accuracy_scaled_to_percent() {
    let metrics = MetricsAggregator::new();
    metrics.record_retrieval_accuracy(0.95, None).unwrap();

    let average = metrics.report().retrieval_accuracy.average;
    assert!((average - 95.0).abs() < 1e-9);
    assert_eq!(metrics.summary().retrieval_accuracy, "95.0%");
}

#[test]
fn test_count_cap_evicts_oldest() {
    let metrics = MetricsAggregator::with_policy(RetentionPolicy::new(
        1000,
        Duration::from_secs(86_400),
    ));
    for i in 1..=1001 {
        metrics.record_latency(f64::from(i), None).unwrap();
    }

    let stats = latency_stats(&metrics);
    assert_eq!(stats.count, 1000);
    assert_eq!(stats.min, 2.0);
    assert_eq!(stats.current, 1001.0);
}

#[test]
fn test_reset_then_record() {
    let metrics = MetricsAggregator::new();
    metrics.record_latency(10.0, None).unwrap();
    metrics.record_tokens(500, Some("anthropic"));
    metrics.record_hallucination(true, None);
    metrics.record_request(false);

    metrics.reset();
    assert!(metrics.all_stats().is_empty());
    assert_eq!(metrics.request_totals(), RequestTotals::default());

    metrics.record_request(true);
    assert_eq!(metrics.report().success_rate.count, 1);
}

#[test]
fn test_rejected_value_leaves_series_untouched() {
    let metrics = MetricsAggregator::new();
    metrics.record_latency(5.0, None).unwrap();

    let err = metrics.record_latency(f64::NAN, None).unwrap_err();
    assert!(matches!(err, MetricsError::InvalidValue { .. }));
    assert_eq!(latency_stats(&metrics).count, 1);
}

// ============================================================================
// Window Eviction Tests
// ============================================================================

// Uses the system clock on purpose; the manual-clock cases live in the store unit tests.
#[test]
fn test_window_evicts_stale_points() {
    let store = SeriesStore::new(RetentionPolicy::new(100, Duration::from_millis(50)));
    store.record("latency", 1.0, None).unwrap();
    store.record("latency", 2.0, None).unwrap();

    thread::sleep(Duration::from_millis(80));
    // Eviction runs on write.
    store.record("latency", 3.0, None).unwrap();

    let stats = store.stats("latency");
    assert_eq!(stats.count, 1);
    assert_eq!(stats.current, 3.0);
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[test]
fn test_concurrent_producers_and_readers() {
    let metrics = Arc::new(MetricsAggregator::new());
    let mut handles = Vec::new();

    for worker in 0..8 {
        let metrics = Arc::clone(&metrics);
        handles.push(thread::spawn(move || {
            for i in 0..250 {
                metrics.record_latency(f64::from(i), None).unwrap();
                metrics.record_request(worker % 2 == 0);
                let _ = metrics.report();
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(metrics.request_totals().total, 2000);
    assert_eq!(metrics.request_totals().successful, 1000);
    // Default cap is 1000 points per series.
    assert_eq!(latency_stats(&metrics).count, 1000);
    assert_eq!(metrics.report().success_rate.count, 1000);
}

// ============================================================================
// Timing Tests
// ============================================================================

#[test]
fn test_measure_latency_passes_result_through() {
    let metrics = MetricsAggregator::new();

    let ok: Result<u32, String> = measure_latency(&metrics, "/ok", || Ok(7));
    let err: Result<u32, String> = measure_latency(&metrics, "/err", || Err("boom".into()));

    assert_eq!(ok, Ok(7));
    assert_eq!(err, Err("boom".to_string()));
    assert_eq!(latency_stats(&metrics).count, 2);

    let points = metrics.store().points(Series::ResponseLatency.key());
    assert_eq!(points[1].metadata.as_ref().unwrap()["endpoint"], "/err");
}

#[tokio::test]
async fn test_measure_latency_async_records_elapsed() {
    let metrics = MetricsAggregator::new();

    let value = measure_latency_async(&metrics, "/slow", async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        "done"
    })
    .await;

    assert_eq!(value, "done");
    let stats = latency_stats(&metrics);
    assert_eq!(stats.count, 1);
    assert!(stats.current >= 20.0);
}

// ============================================================================
// Command Stream Tests
// ============================================================================

#[tokio::test]
async fn test_command_stream_session() {
    let metrics = Arc::new(MetricsAggregator::new());
    let stream = CommandStream::new(Arc::clone(&metrics));
    let input = [
        r#"{"kind":"retrieval_accuracy","accuracy":0.9}"#,
        r#"{"kind":"response","route":"/search","status":200,"elapsed_ms":120}"#,
        r#"{"kind":"response","route":"/search","status":503,"elapsed_ms":80}"#,
        r#"{"kind":"tokens","count":1500,"provider":"anthropic"}"#,
        r#"{"kind":"nonsense"}"#,
        r#"{"kind":"summary"}"#,
    ]
    .join("\n");
    let mut output = Vec::new();

    let stats = stream.run(input.as_bytes(), &mut output).await.unwrap();
    assert_eq!(
        stats,
        IngestStats {
            lines: 6,
            applied: 5,
            rejected: 1
        }
    );

    let summary: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(summary["retrieval_accuracy"], "90.0%");
    assert_eq!(summary["avg_latency"], "100ms");
    assert_eq!(summary["success_rate"], "50.0%");
    assert_eq!(summary["hallucination_rate"], "0.0%");

    assert_eq!(metrics.report().tokens_used.max, 1500.0);
    assert_eq!(metrics.request_totals().failed(), 1);
}

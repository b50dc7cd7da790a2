//! RAG Metrics binary entry point.
//!
//! Reads metric commands as JSON lines on stdin and writes query results to
//! stdout. All logs go to stderr.
//!
//! Coverage is excluded because the main function only wires stdio and
//! signals around the library, which is tested directly.

// Enable the coverage attribute when running with nightly for llvm-cov exclusions
#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

use std::sync::Arc;

use rag_metrics::config::Config;
use rag_metrics::ingest::{CommandStream, StreamEnd};
use rag_metrics::metrics::MetricsAggregator;

#[cfg_attr(coverage_nightly, coverage(off))]
#[tokio::main]
async fn main() {
    // Load configuration first so LOG_LEVEL from .env is honored
    let config = Config::from_env();

    let log_level = config
        .as_ref()
        .map_or_else(|_| "info".to_string(), |c| c.log_level.clone());

    // Initialize logging to stderr only (stdout carries query output)
    tracing_subscriber::fmt()
        .with_env_filter(
            log_level
                .parse()
                .unwrap_or_else(|_| tracing_subscriber::filter::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .init();

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Configuration error: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        max_points = config.max_points,
        window_ms = config.window_ms,
        summary_interval_secs = config.summary_interval_secs,
        "rag-metrics starting"
    );

    let metrics = Arc::new(MetricsAggregator::with_policy(config.retention()));
    let stream = CommandStream::new(Arc::clone(&metrics))
        .with_summary_interval(config.summary_interval());

    let reader = tokio::io::BufReader::new(tokio::io::stdin());
    let writer = tokio::io::stdout();

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for interrupt: {e}");
            std::future::pending::<()>().await;
        }
    };

    let interrupted = match stream.run_until(reader, writer, shutdown).await {
        Ok(StreamEnd::Closed(stats)) => {
            tracing::info!(
                lines = stats.lines,
                applied = stats.applied,
                rejected = stats.rejected,
                "Input closed"
            );
            false
        }
        Ok(StreamEnd::Interrupted) => true,
        Err(e) => {
            tracing::error!("Ingest error: {e}");
            std::process::exit(1);
        }
    };

    let summary = metrics.summary();
    tracing::info!(
        retrieval_accuracy = %summary.retrieval_accuracy,
        avg_latency = %summary.avg_latency,
        success_rate = %summary.success_rate,
        uptime = %summary.uptime,
        "rag-metrics shutdown complete"
    );

    // The stdin reader thread blocks runtime shutdown until input closes.
    if interrupted {
        std::process::exit(0);
    }
}

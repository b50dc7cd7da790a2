//! RAG Metrics
//!
//! In-memory, sliding-window metrics for retrieval-augmented generation
//! pipelines.
//!
//! # Features
//!
//! - Bounded time series: per-series count cap plus a time window
//! - Aggregated statistics (current, average, min, max, count)
//! - Retrieval accuracy, latency, hallucination, token and success tracking
//! - Percentage reports with placeholders for empty series
//! - Scoped latency timing for sync and async work
//! - NDJSON command stream for feeding metrics from other processes
//!
//! # Quick Start
//!
//! ```bash
//! echo '{"kind":"latency","latency_ms":42}
//! {"kind":"summary"}' | ./rag-metrics
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐  record_*   ┌───────────────────┐  record   ┌─────────────┐
//! │  Pipeline /  │────────────▶│ MetricsAggregator │──────────▶│ SeriesStore │
//! │ ingest stdin │◀────────────│ (report, summary) │◀──────────│  (windowed) │
//! └──────────────┘   report    └───────────────────┘   stats   └─────────────┘
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod error;
pub mod ingest;
pub mod metrics;
pub mod store;
pub mod traits;

#[cfg(test)]
mod test_utils;

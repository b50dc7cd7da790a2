//! Newline-delimited JSON command stream over an aggregator.
//!
//! Each input line is one [`Command`], tagged by `kind`:
//!
//! ```text
//! {"kind":"latency","latency_ms":120,"endpoint":"/search"}
//! {"kind":"request","success":true}
//! {"kind":"summary"}
//! ```
//!
//! Recording commands produce no output. Query commands (`report`,
//! `summary`, `stats`, `totals`) write one JSON line to the output. Lines that
//! fail to parse or carry rejected values are logged and skipped.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::{AppError, IngestError};
use crate::metrics::MetricsAggregator;
use crate::store::Metadata;

/// One line of the command stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Command {
    /// Record a retrieval accuracy fraction.
    RetrievalAccuracy {
        /// Fraction in [0, 1].
        accuracy: f64,
        /// Optional query context.
        #[serde(default)]
        info: Option<Metadata>,
    },
    /// Record a response latency.
    Latency {
        /// Milliseconds.
        latency_ms: f64,
        /// Route or operation name.
        #[serde(default)]
        endpoint: Option<String>,
    },
    /// Record a hallucination check outcome.
    Hallucination {
        /// Whether a hallucination was detected.
        detected: bool,
        /// Optional detector context.
        #[serde(default)]
        details: Option<Metadata>,
    },
    /// Record token usage.
    Tokens {
        /// Tokens consumed.
        count: u64,
        /// Model provider.
        #[serde(default)]
        provider: Option<String>,
    },
    /// Record a request outcome.
    Request {
        /// Whether the request succeeded.
        success: bool,
    },
    /// Record a completed HTTP exchange.
    Response {
        /// Route that handled the request.
        route: String,
        /// HTTP status code.
        status: u16,
        /// Receipt-to-completion time in milliseconds.
        elapsed_ms: u64,
    },
    /// Emit the full report.
    Report,
    /// Emit the formatted summary.
    Summary,
    /// Emit raw statistics for every series.
    Stats,
    /// Emit lifetime request totals.
    Totals,
    /// Clear all series and counters.
    Reset,
}

impl Command {
    /// Decode one line.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Parse`] if the line is not a valid command.
    pub fn parse(line: &str, line_no: usize) -> Result<Self, IngestError> {
        serde_json::from_str(line).map_err(|e| IngestError::Parse {
            line: line_no,
            message: e.to_string(),
        })
    }

    /// Apply the command, returning the JSON to emit for query commands.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Metrics`] if a recorded value is rejected.
    pub fn apply(self, metrics: &MetricsAggregator) -> Result<Option<serde_json::Value>, AppError> {
        match self {
            Self::RetrievalAccuracy { accuracy, info } => {
                metrics.record_retrieval_accuracy(accuracy, info)?;
            }
            Self::Latency {
                latency_ms,
                endpoint,
            } => metrics.record_latency(latency_ms, endpoint.as_deref())?,
            Self::Hallucination { detected, details } => {
                metrics.record_hallucination(detected, details);
            }
            Self::Tokens { count, provider } => metrics.record_tokens(count, provider.as_deref()),
            Self::Request { success } => metrics.record_request(success),
            Self::Response {
                route,
                status,
                elapsed_ms,
            } => metrics.observe_response(&route, status, Duration::from_millis(elapsed_ms)),
            Self::Report => return Ok(Some(to_json(&metrics.report()))),
            Self::Summary => return Ok(Some(to_json(&metrics.summary()))),
            Self::Stats => return Ok(Some(to_json(&metrics.all_stats()))),
            Self::Totals => return Ok(Some(to_json(&metrics.request_totals()))),
            Self::Reset => metrics.reset(),
        }
        Ok(None)
    }
}

fn to_json<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to serialize query output");
        serde_json::Value::Null
    })
}

/// Counters describing one pass over a command stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Lines read, including blank and rejected ones.
    pub lines: usize,
    /// Commands applied successfully.
    pub applied: usize,
    /// Lines skipped because they failed to parse or apply.
    pub rejected: usize,
}

/// How a command stream ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamEnd {
    /// The input reached EOF.
    Closed(IngestStats),
    /// The shutdown signal fired first. The reader may still be blocked.
    Interrupted,
}

/// Drives a command stream into an aggregator.
#[derive(Debug, Clone)]
pub struct CommandStream {
    metrics: Arc<MetricsAggregator>,
    summary_interval: Option<Duration>,
}

impl CommandStream {
    /// Create a stream handler over a shared aggregator.
    #[must_use]
    pub const fn new(metrics: Arc<MetricsAggregator>) -> Self {
        Self {
            metrics,
            summary_interval: None,
        }
    }

    /// Also log the summary at this interval while the stream is open.
    #[must_use]
    pub const fn with_summary_interval(mut self, interval: Option<Duration>) -> Self {
        self.summary_interval = interval;
        self
    }

    /// The aggregator commands are applied to.
    #[must_use]
    pub const fn metrics(&self) -> &Arc<MetricsAggregator> {
        &self.metrics
    }

    /// Handle one raw line; blank lines are ignored.
    ///
    /// # Errors
    ///
    /// Returns the parse or recording error for a rejected line.
    pub fn handle_line(
        &self,
        line: &str,
        line_no: usize,
    ) -> Result<Option<serde_json::Value>, AppError> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        Command::parse(line, line_no)?.apply(&self.metrics)
    }

    /// Read commands until EOF, writing query output as JSON lines.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Io`] if reading or writing fails. Bad lines do not
    /// stop the stream.
    pub async fn run<R, W>(&self, reader: R, mut writer: W) -> Result<IngestStats, IngestError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut lines = reader.lines();
        let mut stats = IngestStats::default();
        let mut ticker = self.summary_interval.map(|period| {
            let mut interval =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval
        });

        loop {
            let line = tokio::select! {
                line = lines.next_line() => line?,
                () = tick(ticker.as_mut()) => {
                    self.log_summary();
                    continue;
                }
            };
            let Some(line) = line else {
                break;
            };

            stats.lines += 1;
            match self.handle_line(&line, stats.lines) {
                Ok(output) => {
                    if !line.trim().is_empty() {
                        stats.applied += 1;
                    }
                    if let Some(value) = output {
                        writer.write_all(value.to_string().as_bytes()).await?;
                        writer.write_all(b"\n").await?;
                        writer.flush().await?;
                    }
                }
                Err(e) => {
                    stats.rejected += 1;
                    tracing::warn!(line = stats.lines, error = %e, "Skipping command");
                }
            }
        }

        tracing::debug!(
            lines = stats.lines,
            applied = stats.applied,
            rejected = stats.rejected,
            "Command stream closed"
        );
        Ok(stats)
    }

    /// Like [`Self::run`], but stop as soon as `shutdown` completes.
    ///
    /// A blocking reader such as stdin cannot be cancelled, so callers that
    /// get [`StreamEnd::Interrupted`] should exit without waiting on it.
    ///
    /// # Errors
    ///
    /// Returns [`IngestError::Io`] if reading or writing fails first.
    pub async fn run_until<R, W, S>(
        &self,
        reader: R,
        writer: W,
        shutdown: S,
    ) -> Result<StreamEnd, IngestError>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
        S: std::future::Future<Output = ()>,
    {
        tokio::select! {
            result = self.run(reader, writer) => result.map(StreamEnd::Closed),
            () = shutdown => {
                tracing::info!("Interrupt received");
                Ok(StreamEnd::Interrupted)
            }
        }
    }

    fn log_summary(&self) {
        let summary = self.metrics.summary();
        tracing::info!(
            retrieval_accuracy = %summary.retrieval_accuracy,
            avg_latency = %summary.avg_latency,
            hallucination_rate = %summary.hallucination_rate,
            success_rate = %summary.success_rate,
            uptime = %summary.uptime,
            "Metrics summary"
        );
    }
}

async fn tick(ticker: Option<&mut tokio::time::Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

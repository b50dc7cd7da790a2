//! Report and summary snapshots handed to reporting surfaces.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::store::SeriesStats;

/// Placeholder retrieval accuracy (percent) shown before any measurement.
pub const RETRIEVAL_ACCURACY_TARGET: f64 = 92.0;

/// Success rate (percent) shown before any request has completed.
pub const DEFAULT_SUCCESS_RATE: f64 = 100.0;

/// Point-in-time snapshot of every tracked series.
///
/// Percentage series are already scaled to 0-100 and carry their empty-series
/// placeholders; `min`/`max` keep the raw stored units.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct MetricsReport {
    /// Retrieval accuracy in percent.
    pub retrieval_accuracy: SeriesStats,
    /// Response latency in milliseconds.
    pub response_latency: SeriesStats,
    /// Hallucination rate in percent.
    pub hallucination_rate: SeriesStats,
    /// Tokens used per recorded call.
    pub tokens_used: SeriesStats,
    /// Request success rate in percent.
    pub success_rate: SeriesStats,
    /// Milliseconds since the aggregator was created.
    pub uptime_ms: u64,
    /// Aggregator creation time, epoch milliseconds.
    pub start_time: u64,
    /// Report format version.
    pub version: String,
}

/// Display-formatted projection of a [`MetricsReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MetricsSummary {
    /// e.g. `"92.0%"`.
    pub retrieval_accuracy: String,
    /// e.g. `"100ms"`.
    pub avg_latency: String,
    /// e.g. `"0.0%"`.
    pub hallucination_rate: String,
    /// e.g. `"3h 12m"`.
    pub uptime: String,
    /// e.g. `"100.0%"`.
    pub success_rate: String,
}

impl From<&MetricsReport> for MetricsSummary {
    fn from(report: &MetricsReport) -> Self {
        Self {
            retrieval_accuracy: format_percent(report.retrieval_accuracy.average),
            avg_latency: format!("{:.0}ms", report.response_latency.average),
            hallucination_rate: format_percent(report.hallucination_rate.average),
            uptime: format_uptime(report.uptime_ms),
            success_rate: format_percent(report.success_rate.average),
        }
    }
}

/// Lifetime request counters, independent of window eviction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct RequestTotals {
    /// Requests recorded since creation or the last reset.
    pub total: u64,
    /// Of those, the successful ones.
    pub successful: u64,
}

impl RequestTotals {
    /// Failed requests.
    #[must_use]
    pub const fn failed(&self) -> u64 {
        self.total.saturating_sub(self.successful)
    }

    /// Lifetime success ratio (0.0-1.0), `None` before any request.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn success_ratio(&self) -> Option<f64> {
        (self.total > 0).then(|| self.successful as f64 / self.total as f64)
    }
}

fn format_percent(value: f64) -> String {
    format!("{value:.1}%")
}

/// Render an uptime using its two largest units.
///
/// `>= 1 day` → `"{d}d {h}h"`, `>= 1 hour` → `"{h}h {m}m"`,
/// `>= 1 minute` → `"{m}m {s}s"`, otherwise `"{s}s"`.
#[must_use]
pub fn format_uptime(ms: u64) -> String {
    let seconds = ms / 1000;
    let minutes = seconds / 60;
    let hours = minutes / 60;
    let days = hours / 24;

    if days > 0 {
        format!("{days}d {}h", hours % 24)
    } else if hours > 0 {
        format!("{hours}h {}m", minutes % 60)
    } else if minutes > 0 {
        format!("{minutes}m {}s", seconds % 60)
    } else {
        format!("{seconds}s")
    }
}

/// Scale a fraction series to percent, or substitute `placeholder` when empty.
pub(crate) fn as_percent(stats: SeriesStats, placeholder: Option<f64>) -> SeriesStats {
    match placeholder {
        Some(value) if stats.is_empty() => SeriesStats {
            current: value,
            average: value,
            ..stats
        },
        _ => SeriesStats {
            current: stats.current * 100.0,
            average: stats.average * 100.0,
            ..stats
        },
    }
}

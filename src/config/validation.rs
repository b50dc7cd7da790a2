//! Configuration validation.
//!
//! This module provides validation logic for configuration values,
//! ensuring they are within acceptable ranges.

use super::Config;
use crate::error::ConfigError;

/// Maximum allowed points per series.
pub const MAX_MAX_POINTS: usize = 1_000_000;

/// Minimum allowed retention window in milliseconds (1 second).
pub const MIN_WINDOW_MS: u64 = 1000;

/// Maximum allowed retention window in milliseconds (30 days).
pub const MAX_WINDOW_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// Maximum allowed summary interval in seconds (1 day).
pub const MAX_SUMMARY_INTERVAL_SECS: u64 = 86_400;

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

/// Validate configuration values.
///
/// # Errors
///
/// Returns [`ConfigError::InvalidValue`] if any value is out of range:
/// - `METRICS_MAX_POINTS` must be between 1 and 1000000
/// - `METRICS_WINDOW_MS` must be between 1000 and 2592000000
/// - `SUMMARY_INTERVAL_SECS` must be at most 86400
/// - `LOG_LEVEL` must be a known level when it is a bare level name
#[must_use = "validation result should be checked"]
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.max_points == 0 || config.max_points > MAX_MAX_POINTS {
        return Err(ConfigError::InvalidValue {
            var: "METRICS_MAX_POINTS".into(),
            reason: format!("must be between 1 and {MAX_MAX_POINTS}"),
        });
    }

    if config.window_ms < MIN_WINDOW_MS || config.window_ms > MAX_WINDOW_MS {
        return Err(ConfigError::InvalidValue {
            var: "METRICS_WINDOW_MS".into(),
            reason: format!("must be between {MIN_WINDOW_MS} and {MAX_WINDOW_MS} ms"),
        });
    }

    if config.summary_interval_secs > MAX_SUMMARY_INTERVAL_SECS {
        return Err(ConfigError::InvalidValue {
            var: "SUMMARY_INTERVAL_SECS".into(),
            reason: format!("must be between 0 and {MAX_SUMMARY_INTERVAL_SECS}"),
        });
    }

    // Directive strings like "rag_metrics=debug" are left to the filter parser.
    let level = config.log_level.to_ascii_lowercase();
    if !level.contains('=') && !level.contains(',') && !LOG_LEVELS.contains(&level.as_str()) {
        return Err(ConfigError::InvalidValue {
            var: "LOG_LEVEL".into(),
            reason: format!("must be one of {}", LOG_LEVELS.join(", ")),
        });
    }

    Ok(())
}

//! Configuration management.
//!
//! This module handles:
//! - Environment variable loading
//! - Configuration validation
//! - Default value handling
//!
//! None of these settings are needed to use the library directly; they drive
//! the `rag-metrics` binary.
//!
//! # Example
//!
//! ```
//! use rag_metrics::config::{Config, DEFAULT_MAX_POINTS, DEFAULT_WINDOW_MS};
//!
//! // Create a config directly (use Config::from_env() in production)
//! let config = Config {
//!     log_level: "info".to_string(),
//!     max_points: DEFAULT_MAX_POINTS,
//!     window_ms: DEFAULT_WINDOW_MS,
//!     summary_interval_secs: 0,
//! };
//!
//! let policy = config.retention();
//! assert_eq!(policy.max_points, 1000);
//! assert!(config.summary_interval().is_none());
//! ```

mod validation;

pub use validation::{
    validate_config, MAX_MAX_POINTS, MAX_SUMMARY_INTERVAL_SECS, MAX_WINDOW_MS, MIN_WINDOW_MS,
};

use std::time::Duration;

use crate::error::ConfigError;
use crate::store::RetentionPolicy;

pub use crate::store::DEFAULT_MAX_POINTS;

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Default retention window in milliseconds (24 hours).
pub const DEFAULT_WINDOW_MS: u64 = 24 * 60 * 60 * 1000;

/// Default interval between logged summaries (0 disables them).
pub const DEFAULT_SUMMARY_INTERVAL_SECS: u64 = 0;

/// Application configuration.
///
/// Use [`Config::from_env`] to load configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Log level (error, warn, info, debug, trace).
    pub log_level: String,
    /// Maximum points retained per series.
    pub max_points: usize,
    /// Retention window in milliseconds.
    pub window_ms: u64,
    /// Seconds between logged summaries; 0 disables them.
    pub summary_interval_secs: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Optional environment variables (with defaults):
    /// - `LOG_LEVEL`: Logging level (default: `info`)
    /// - `METRICS_MAX_POINTS`: Points kept per series (default: `1000`)
    /// - `METRICS_WINDOW_MS`: Retention window (default: `86400000`)
    /// - `SUMMARY_INTERVAL_SECS`: Summary logging interval (default: `0`, disabled)
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a numeric variable does not parse or any
    /// value fails validation (see [`validate_config`]).
    #[must_use = "configuration should be used"]
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors)
        let _ = dotenvy::dotenv();

        let log_level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LOG_LEVEL.into());
        let max_points = parse_env_usize("METRICS_MAX_POINTS", DEFAULT_MAX_POINTS)?;
        let window_ms = parse_env_u64("METRICS_WINDOW_MS", DEFAULT_WINDOW_MS)?;
        let summary_interval_secs =
            parse_env_u64("SUMMARY_INTERVAL_SECS", DEFAULT_SUMMARY_INTERVAL_SECS)?;

        let config = Self {
            log_level,
            max_points,
            window_ms,
            summary_interval_secs,
        };

        validate_config(&config)?;
        Ok(config)
    }

    /// Retention policy for the series store.
    #[must_use]
    pub const fn retention(&self) -> RetentionPolicy {
        RetentionPolicy::new(self.max_points, Duration::from_millis(self.window_ms))
    }

    /// Interval between logged summaries, if enabled.
    #[must_use]
    pub const fn summary_interval(&self) -> Option<Duration> {
        match self.summary_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            max_points: DEFAULT_MAX_POINTS,
            window_ms: DEFAULT_WINDOW_MS,
            summary_interval_secs: DEFAULT_SUMMARY_INTERVAL_SECS,
        }
    }
}

/// Parse an environment variable as u64, using a default if not set.
fn parse_env_u64(name: &str, default: u64) -> Result<u64, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.parse().map_err(|_| ConfigError::InvalidValue {
            var: name.into(),
            reason: "must be a positive integer".into(),
        })
    })
}

/// Parse an environment variable as usize, using a default if not set.
fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    std::env::var(name).map_or(Ok(default), |val| {
        val.parse().map_err(|_| ConfigError::InvalidValue {
            var: name.into(),
            reason: "must be a positive integer".into(),
        })
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    /// Helper to set up a clean test environment.
    fn setup_test_env() {
        env::remove_var("LOG_LEVEL");
        env::remove_var("METRICS_MAX_POINTS");
        env::remove_var("METRICS_WINDOW_MS");
        env::remove_var("SUMMARY_INTERVAL_SECS");
    }

    #[test]
    #[serial]
    fn test_config_from_env_with_all_vars() {
        setup_test_env();

        env::set_var("LOG_LEVEL", "debug");
        env::set_var("METRICS_MAX_POINTS", "250");
        env::set_var("METRICS_WINDOW_MS", "3600000");
        env::set_var("SUMMARY_INTERVAL_SECS", "30");

        let config = Config::from_env().expect("should load config");

        assert_eq!(config.log_level, "debug");
        assert_eq!(config.max_points, 250);
        assert_eq!(config.window_ms, 3_600_000);
        assert_eq!(config.summary_interval(), Some(Duration::from_secs(30)));

        setup_test_env();
    }

    #[test]
    #[serial]
    fn test_config_from_env_defaults() {
        setup_test_env();

        let config = Config::from_env().expect("should load config");

        assert_eq!(config, Config::default());
        assert_eq!(config.retention(), RetentionPolicy::default());
        assert!(config.summary_interval().is_none());
    }

    #[test]
    #[serial]
    fn test_config_invalid_max_points_format() {
        setup_test_env();
        env::set_var("METRICS_MAX_POINTS", "lots");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { var, .. } if var == "METRICS_MAX_POINTS"
        ));

        setup_test_env();
    }

    #[test]
    #[serial]
    fn test_config_negative_window() {
        setup_test_env();
        env::set_var("METRICS_WINDOW_MS", "-1000");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { var, .. } if var == "METRICS_WINDOW_MS"
        ));

        setup_test_env();
    }

    #[test]
    #[serial]
    fn test_config_zero_max_points_validation_failure() {
        setup_test_env();
        env::set_var("METRICS_MAX_POINTS", "0");

        let err = Config::from_env().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { var, .. } if var == "METRICS_MAX_POINTS"
        ));

        setup_test_env();
    }

    #[test]
    fn test_retention_conversion() {
        let config = Config {
            max_points: 10,
            window_ms: 5_000,
            ..Config::default()
        };
        let policy = config.retention();
        assert_eq!(policy.max_points, 10);
        assert_eq!(policy.window, Duration::from_secs(5));
    }

    #[test]
    fn test_parse_env_u64_with_value() {
        env::set_var("TEST_METRICS_U64", "12345");
        assert_eq!(parse_env_u64("TEST_METRICS_U64", 0).unwrap(), 12345);
        env::remove_var("TEST_METRICS_U64");
    }

    #[test]
    fn test_parse_env_u64_default() {
        env::remove_var("TEST_METRICS_U64_MISSING");
        assert_eq!(parse_env_u64("TEST_METRICS_U64_MISSING", 999).unwrap(), 999);
    }

    #[test]
    fn test_parse_env_usize_invalid() {
        env::set_var("TEST_METRICS_USIZE_INVALID", "xyz");
        assert!(parse_env_usize("TEST_METRICS_USIZE_INVALID", 0).is_err());
        env::remove_var("TEST_METRICS_USIZE_INVALID");
    }
}

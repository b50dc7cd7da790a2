//! Error types for the metrics core.
//!
//! This module defines a small hierarchical error system:
//! - [`AppError`]: Top-level application errors
//! - [`MetricsError`]: Rejected observations at the recording boundary
//! - [`ConfigError`]: Configuration errors
//! - [`IngestError`]: Command stream errors
//!
//! All errors implement `Send + Sync` so they can cross task boundaries.

use thiserror::Error;

/// Top-level application error.
///
/// Wraps all subsystem errors for unified handling in the binary.
#[derive(Debug, Error)]
pub enum AppError {
    /// Metrics recording error.
    #[error("Metrics error: {0}")]
    Metrics(#[from] MetricsError),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Ingestion error.
    #[error("Ingest error: {0}")]
    Ingest(#[from] IngestError),
}

/// Metrics recording errors.
///
/// Recording accepts every finite value as given; only values that would
/// corrupt `min`/`max`/`average` are refused.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum MetricsError {
    /// A non-finite value (NaN or infinity) was offered to a series.
    #[error("Invalid value for series {series}: {value} is not finite")]
    InvalidValue {
        /// The series the value was recorded against.
        series: String,
        /// The rejected value.
        value: f64,
    },
}

/// Configuration errors.
///
/// These errors represent failures in configuration loading and validation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Configuration value is invalid.
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// The variable name.
        var: String,
        /// Why the value is invalid.
        reason: String,
    },
}

/// Command stream errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IngestError {
    /// A line could not be decoded as a command.
    #[error("Parse error on line {line}: {message}")]
    Parse {
        /// 1-based line number in the stream.
        line: usize,
        /// Decoder message.
        message: String,
    },

    /// Reading or writing the stream failed.
    #[error("I/O error: {message}")]
    Io {
        /// Description of the I/O failure.
        message: String,
    },
}

impl From<std::io::Error> for IngestError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            message: err.to_string(),
        }
    }
}

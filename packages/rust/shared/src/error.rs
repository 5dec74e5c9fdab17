//! Error types for tourledger.
//!
//! Library crates use [`TourLedgerError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.
//!
//! Oracle and parse failures for a single subject are *not* errors in this
//! sense: they travel as values and end up in diagnostic artifacts. Only the
//! variants below reach the caller.

use std::path::PathBuf;

/// Top-level error type for all tourledger operations.
#[derive(Debug, thiserror::Error)]
pub enum TourLedgerError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// The message source is unreachable (after the single reconnect attempt).
    #[error("connectivity error: {0}")]
    Connectivity(String),

    /// Transport-level failure talking to the extraction oracle.
    #[error("oracle error: {0}")]
    Oracle(String),

    /// Structured payload could not be decoded.
    #[error("parse error: {message}")]
    Parse { message: String },

    /// Database or ledger layer error.
    #[error("storage error: {0}")]
    Storage(String),

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Data validation error (bad subject id, invalid timestamp, etc.).
    #[error("validation error: {message}")]
    Validation { message: String },
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, TourLedgerError>;

impl TourLedgerError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a parse error from any displayable message.
    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error must stop the current batch.
    ///
    /// Connectivity loss halts the batch; so does a ledger that cannot be
    /// written, since continuing would process subjects whose results are lost.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::Connectivity(_) | Self::Storage(_) | Self::Io { .. }
        )
    }
}

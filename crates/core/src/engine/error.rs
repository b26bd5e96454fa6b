//! Error types for the engine module.

use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::Format;

/// Errors that can occur while an engine runs a step.
#[derive(Debug, Error)]
pub enum EngineError {
    /// External program not found.
    #[error("{program} not found at path: {path}")]
    BinaryNotFound { program: String, path: PathBuf },

    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// The engine cannot perform this transition.
    #[error("Unsupported conversion: {from} -> {to}")]
    UnsupportedConversion { from: Format, to: Format },

    /// Conversion process failed.
    #[error("Conversion failed: {reason}")]
    ConversionFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// The process exited successfully but left no output behind.
    #[error("Output file not created: {path}")]
    OutputMissing { path: PathBuf },

    /// Conversion timed out.
    #[error("Conversion timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// Failed to probe the input file.
    #[error("Failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    /// I/O error during conversion.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The step was cancelled.
    #[error("Conversion cancelled")]
    Cancelled,
}

impl EngineError {
    /// Creates a new conversion failed error with stderr output.
    pub fn conversion_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::ConversionFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Creates a new probe failed error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }

    /// Whether this error is a cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Io(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        assert!(EngineError::Cancelled.is_cancelled());
        assert!(!EngineError::Cancelled.is_retryable());
        assert!(EngineError::Timeout { timeout_secs: 5 }.is_retryable());
        assert!(!EngineError::conversion_failed("boom", None).is_cancelled());
    }

    #[test]
    fn test_error_display() {
        let err = EngineError::BinaryNotFound {
            program: "pandoc".to_string(),
            path: PathBuf::from("/usr/bin/pandoc"),
        };
        assert_eq!(err.to_string(), "pandoc not found at path: /usr/bin/pandoc");
    }
}

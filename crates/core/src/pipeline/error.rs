//! Error types for plan execution.

use std::path::PathBuf;
use thiserror::Error;

use crate::catalog::{EngineKind, Format};
use crate::engine::EngineError;

/// Errors that abort a plan.
///
/// Cancellation is not an error; it is reported as
/// [`ExecutionOutcome::Cancelled`](super::ExecutionOutcome::Cancelled).
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// The plan has no steps.
    #[error("Plan has no steps")]
    EmptyPlan,

    /// The input file does not exist.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// The output path points at the input file.
    #[error("Output path is the input file: {path}")]
    OutputIsSource { path: PathBuf },

    /// No adapter is registered for an engine the plan needs.
    #[error("No engine registered for kind: {kind}")]
    EngineUnavailable { kind: EngineKind },

    /// The temp directory for intermediates could not be created.
    #[error("Failed to create temp directory {path}: {error}")]
    TempDir {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// The directory the output goes into could not be created.
    #[error("Failed to create output directory {path}: {error}")]
    OutputDir {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },

    /// A step failed; later steps did not run.
    #[error("Step {index} ({engine}) {from} -> {to} failed: {error}")]
    StepFailed {
        index: usize,
        engine: EngineKind,
        from: Format,
        to: Format,
        #[source]
        error: EngineError,
    },

    /// The finished staging file could not be moved onto the output path.
    #[error("Failed to finalize output {path}: {error}")]
    Finalize {
        path: PathBuf,
        #[source]
        error: std::io::Error,
    },
}

impl ExecutionError {
    /// Index of the failed step, if a step failed.
    pub fn failed_step(&self) -> Option<usize> {
        match self {
            Self::StepFailed { index, .. } => Some(*index),
            _ => None,
        }
    }

    /// Whether retrying the whole plan might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::StepFailed { error, .. } => error.is_retryable(),
            Self::Finalize { .. } => true,
            _ => false,
        }
    }
}

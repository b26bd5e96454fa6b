//! Types for the pipeline module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::catalog::{EngineKind, Format};
use crate::pathfinder::Plan;

/// A plan bound to concrete files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    /// Identifier used for logging and step job ids.
    pub job_id: String,
    /// File to convert. Never written.
    pub input_path: PathBuf,
    /// Final destination. Written once, only on success.
    pub output_path: PathBuf,
    /// Steps to run.
    pub plan: Plan,
}

/// Whole-plan progress update.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionProgress {
    /// Job ID.
    pub job_id: String,
    /// Global fraction in `[0, 1]`, non-decreasing within one execution.
    pub fraction: f32,
    /// Index of the step currently running.
    pub step_index: usize,
    /// Total number of steps.
    pub total_steps: usize,
    /// Human readable status.
    pub message: String,
}

/// Timing of one finished step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepReport {
    pub index: usize,
    pub engine: EngineKind,
    pub source_format: Format,
    pub target_format: Format,
    pub duration_ms: u64,
}

/// Summary of a completed plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Job ID.
    pub job_id: String,
    /// Final output path.
    pub output_path: PathBuf,
    /// Size of the output in bytes.
    pub output_size_bytes: u64,
    /// Per-step timings, in step order.
    pub steps: Vec<StepReport>,
    /// Wall clock time of the whole plan in milliseconds.
    pub duration_ms: u64,
}

/// How an execution ended when no error occurred.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ExecutionOutcome {
    /// Every step succeeded and the output is in place.
    Completed(ExecutionReport),
    /// Cancellation was observed while step `at_step` was pending or running.
    Cancelled { at_step: usize },
}

impl ExecutionOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed(_))
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The report of a completed execution.
    pub fn report(&self) -> Option<&ExecutionReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Cancelled { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_string(&ExecutionOutcome::Cancelled { at_step: 2 }).unwrap();
        assert_eq!(json, r#"{"outcome":"cancelled","at_step":2}"#);
    }

    #[test]
    fn test_outcome_accessors() {
        let report = ExecutionReport {
            job_id: "j".to_string(),
            output_path: PathBuf::from("/out/a.pdf"),
            output_size_bytes: 10,
            steps: vec![],
            duration_ms: 5,
        };
        let outcome = ExecutionOutcome::Completed(report);
        assert!(outcome.is_completed());
        assert_eq!(outcome.report().unwrap().output_size_bytes, 10);
        assert!(ExecutionOutcome::Cancelled { at_step: 0 }.report().is_none());
    }
}

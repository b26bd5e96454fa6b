//! Types for the conversion service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

use crate::catalog::{Category, Format};
use crate::pathfinder::{Plan, RoutingError};
use crate::queue::{QueueError, TaskStatus};

/// A request to convert one file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// Task id. A UUID v4 is generated when absent.
    pub task_id: Option<String>,
    /// File to convert. Its extension decides the source format.
    pub input_path: PathBuf,
    /// Format to produce.
    pub target_format: Format,
    /// Exact destination. Takes precedence over `output_dir`.
    pub output_path: Option<PathBuf>,
    /// Directory for the output file. Defaults to the input's directory.
    pub output_dir: Option<PathBuf>,
}

impl ConversionRequest {
    pub fn new(input_path: impl Into<PathBuf>, target_format: impl Into<Format>) -> Self {
        Self {
            task_id: None,
            input_path: input_path.into(),
            target_format: target_format.into(),
            output_path: None,
            output_dir: None,
        }
    }

    pub fn with_task_id(mut self, task_id: impl Into<String>) -> Self {
        self.task_id = Some(task_id.into());
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = Some(path.into());
        self
    }

    pub fn with_output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(dir.into());
        self
    }
}

/// Snapshot of a conversion task.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub source_category: Category,
    pub target_format: Format,
    pub plan: Plan,
    pub status: TaskStatus,
    /// Last reported fraction in `[0, 1]`.
    pub progress: f32,
    pub message: Option<String>,
    /// Error text when the task failed.
    pub error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

/// Status change or progress update of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskEvent {
    pub task_id: String,
    pub fraction: f32,
    pub status: TaskStatus,
    pub message: String,
}

impl TaskEvent {
    /// Whether this is the last event the task will emit.
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Receiver of task events. Called from worker tasks.
pub type TaskEventCallback = Arc<dyn Fn(TaskEvent) + Send + Sync>;

/// Errors returned synchronously by the conversion service.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Routing(#[from] RoutingError),

    #[error(transparent)]
    Queue(#[from] QueueError),

    /// The input path has no extension to derive a format from.
    #[error("Cannot determine format of {path}: no file extension")]
    NoExtension { path: PathBuf },
}

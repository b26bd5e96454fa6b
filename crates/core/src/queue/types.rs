//! Types for the queue module.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use tokio::sync::watch;

/// Lifecycle state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting for a worker.
    Pending,
    /// Holding a worker.
    Running,
    /// Finished successfully.
    Done,
    /// Finished with an error.
    Failed,
    /// Stopped before finishing.
    Cancelled,
}

impl TaskStatus {
    /// Whether no further transition can happen.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Failed | Self::Cancelled)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result reported by a unit of work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    Done,
    Failed(String),
    Cancelled,
}

impl TaskOutcome {
    pub fn status(&self) -> TaskStatus {
        match self {
            Self::Done => TaskStatus::Done,
            Self::Failed(_) => TaskStatus::Failed,
            Self::Cancelled => TaskStatus::Cancelled,
        }
    }
}

/// Errors returned by [`TaskQueue::submit`](super::TaskQueue::submit).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue no longer accepts work.
    #[error("Task queue is shut down")]
    ShutDown,

    /// A task with this id is still pending or running.
    #[error("Task already exists: {0}")]
    TaskExists(String),
}

/// Snapshot of the worker pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolStatus {
    /// Maximum concurrent tasks.
    pub workers: usize,
    /// Number of running tasks.
    pub active_tasks: usize,
    /// Number of tasks waiting for a worker.
    pub queued_tasks: usize,
    /// Tasks finished successfully since startup.
    pub total_processed: u64,
    /// Tasks failed since startup.
    pub total_failed: u64,
    /// Tasks cancelled since startup.
    pub total_cancelled: u64,
    /// Whether new submissions are accepted.
    pub accepting: bool,
}

/// Handle to a submitted task.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    task_id: String,
    status_rx: watch::Receiver<TaskStatus>,
}

impl TaskHandle {
    pub(crate) fn new(task_id: String, status_rx: watch::Receiver<TaskStatus>) -> Self {
        Self { task_id, status_rx }
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// The most recent status.
    pub fn status(&self) -> TaskStatus {
        *self.status_rx.borrow()
    }

    /// Waits until the task reaches a terminal status.
    pub async fn wait(mut self) -> TaskStatus {
        loop {
            let status = *self.status_rx.borrow_and_update();
            if status.is_terminal() {
                return status;
            }
            if self.status_rx.changed().await.is_err() {
                return *self.status_rx.borrow();
            }
        }
    }
}

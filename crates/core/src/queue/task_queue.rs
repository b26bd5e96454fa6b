//! Bounded worker pool implementation.

use futures::future::join_all;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, RwLock, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::metrics;

use super::config::QueueConfig;
use super::types::{PoolStatus, QueueError, TaskHandle, TaskOutcome, TaskStatus};

/// Tracks statistics for the pool.
#[derive(Default)]
struct PoolStats {
    active: AtomicU64,
    queued: AtomicU64,
    total_processed: AtomicU64,
    total_failed: AtomicU64,
    total_cancelled: AtomicU64,
}

impl PoolStats {
    fn record_terminal(&self, status: TaskStatus) {
        let counter = match status {
            TaskStatus::Done => &self.total_processed,
            TaskStatus::Failed => &self.total_failed,
            TaskStatus::Cancelled => &self.total_cancelled,
            TaskStatus::Pending | TaskStatus::Running => return,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::TASKS_FINISHED
            .with_label_values(&[status.as_str()])
            .inc();
    }
}

/// Control record of one task.
struct TaskEntry {
    /// Distinguishes resubmissions of the same id.
    generation: u64,
    token: CancellationToken,
    status: TaskStatus,
    status_tx: watch::Sender<TaskStatus>,
}

impl TaskEntry {
    fn set_status(&mut self, status: TaskStatus) {
        self.status = status;
        let _ = self.status_tx.send(status);
    }
}

type Entries = Arc<RwLock<HashMap<String, TaskEntry>>>;

/// Runs submitted work on a fixed number of workers.
///
/// Submissions never block: work beyond the pool width waits for a free
/// slot. Each task gets a [`CancellationToken`] that is handed to its work
/// once it starts.
pub struct TaskQueue {
    config: QueueConfig,
    semaphore: Arc<Semaphore>,
    entries: Entries,
    stats: Arc<PoolStats>,
    accepting: AtomicBool,
    next_generation: AtomicU64,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskQueue {
    /// Creates a new queue. A width of zero is raised to one.
    pub fn new(config: QueueConfig) -> Self {
        let width = config.workers.max(1);
        Self {
            config: QueueConfig { workers: width },
            semaphore: Arc::new(Semaphore::new(width)),
            entries: Arc::new(RwLock::new(HashMap::new())),
            stats: Arc::new(PoolStats::default()),
            accepting: AtomicBool::new(true),
            next_generation: AtomicU64::new(0),
            workers: Mutex::new(Vec::new()),
        }
    }

    pub fn workers(&self) -> usize {
        self.config.workers
    }

    /// Submits work under `task_id`.
    ///
    /// `work` is called with the task's cancellation token once a worker is
    /// free. It is never called if the task is cancelled first.
    pub async fn submit<F, Fut>(
        &self,
        task_id: impl Into<String>,
        work: F,
    ) -> Result<TaskHandle, QueueError>
    where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = TaskOutcome> + Send + 'static,
    {
        let task_id = task_id.into();

        if !self.accepting.load(Ordering::SeqCst) {
            return Err(QueueError::ShutDown);
        }

        let token = CancellationToken::new();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);
        let status_rx = {
            let mut entries = self.entries.write().await;
            if let Some(existing) = entries.get(&task_id) {
                if !existing.status.is_terminal() {
                    return Err(QueueError::TaskExists(task_id));
                }
            }
            let (status_tx, status_rx) = watch::channel(TaskStatus::Pending);
            entries.insert(
                task_id.clone(),
                TaskEntry {
                    generation,
                    token: token.clone(),
                    status: TaskStatus::Pending,
                    status_tx,
                },
            );
            self.stats.queued.fetch_add(1, Ordering::Relaxed);
            status_rx
        };

        debug!(task_id = %task_id, "Task queued");

        let worker = tokio::spawn(Self::run_task(
            task_id.clone(),
            generation,
            token,
            work,
            Arc::clone(&self.semaphore),
            Arc::clone(&self.entries),
            Arc::clone(&self.stats),
        ));

        let mut workers = self.workers.lock().await;
        workers.retain(|handle| !handle.is_finished());
        workers.push(worker);

        Ok(TaskHandle::new(task_id, status_rx))
    }

    async fn run_task<F, Fut>(
        task_id: String,
        generation: u64,
        token: CancellationToken,
        work: F,
        semaphore: Arc<Semaphore>,
        entries: Entries,
        stats: Arc<PoolStats>,
    ) where
        F: FnOnce(CancellationToken) -> Fut + Send + 'static,
        Fut: Future<Output = TaskOutcome> + Send + 'static,
    {
        let permit = tokio::select! {
            biased;
            _ = token.cancelled() => None,
            permit = semaphore.acquire_owned() => permit.ok(),
        };

        // Pending -> Running happens under the entries lock, which `cancel`
        // also takes, so a cancelled task can never start.
        {
            let mut entries = entries.write().await;
            // The id may already belong to a later submission.
            let Some(entry) = entries
                .get_mut(&task_id)
                .filter(|e| e.generation == generation)
            else {
                return;
            };
            if entry.status != TaskStatus::Pending {
                return;
            }
            stats.queued.fetch_sub(1, Ordering::Relaxed);
            if permit.is_none() || entry.token.is_cancelled() {
                entry.set_status(TaskStatus::Cancelled);
                stats.record_terminal(TaskStatus::Cancelled);
                return;
            }
            entry.set_status(TaskStatus::Running);
            stats.active.fetch_add(1, Ordering::Relaxed);
        }

        metrics::TASKS_RUNNING.inc();
        debug!(task_id = %task_id, "Task started");

        let outcome = match AssertUnwindSafe(work(token)).catch_unwind().await {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(task_id = %task_id, "Task panicked");
                TaskOutcome::Failed("task panicked".to_string())
            }
        };

        metrics::TASKS_RUNNING.dec();
        let status = outcome.status();

        {
            let mut entries = entries.write().await;
            stats.active.fetch_sub(1, Ordering::Relaxed);
            stats.record_terminal(status);
            if let Some(entry) = entries
                .get_mut(&task_id)
                .filter(|e| e.generation == generation)
            {
                entry.set_status(status);
            }
        }

        debug!(task_id = %task_id, %status, "Task finished");
        drop(permit);
    }

    /// Requests cancellation of a task.
    ///
    /// Returns true when a queued task was withdrawn before it started. A
    /// running task is only signalled and the call returns false; unknown
    /// or finished tasks also return false.
    pub async fn cancel(&self, task_id: &str) -> bool {
        let mut entries = self.entries.write().await;
        let Some(entry) = entries.get_mut(task_id) else {
            return false;
        };

        match entry.status {
            TaskStatus::Pending => {
                entry.token.cancel();
                entry.set_status(TaskStatus::Cancelled);
                self.stats.queued.fetch_sub(1, Ordering::Relaxed);
                self.stats.record_terminal(TaskStatus::Cancelled);
                info!(task_id, "Queued task cancelled");
                true
            }
            TaskStatus::Running => {
                entry.token.cancel();
                info!(task_id, "Cancellation requested for running task");
                false
            }
            _ => false,
        }
    }

    /// Signals every pending or running task. Returns how many were signalled.
    pub async fn cancel_all(&self) -> usize {
        let ids: Vec<String> = {
            let entries = self.entries.read().await;
            entries
                .iter()
                .filter(|(_, e)| !e.status.is_terminal())
                .map(|(id, _)| id.clone())
                .collect()
        };
        let mut signalled = 0;
        for id in ids {
            self.cancel(&id).await;
            signalled += 1;
        }
        signalled
    }

    /// Current status of a task, if known.
    pub async fn status(&self, task_id: &str) -> Option<TaskStatus> {
        self.entries.read().await.get(task_id).map(|e| e.status)
    }

    /// Forgets a finished task. Pending or running tasks are kept.
    pub async fn remove(&self, task_id: &str) -> bool {
        let mut entries = self.entries.write().await;
        match entries.get(task_id) {
            Some(entry) if entry.status.is_terminal() => {
                entries.remove(task_id);
                true
            }
            _ => false,
        }
    }

    /// Returns a snapshot of the pool.
    pub fn pool_status(&self) -> PoolStatus {
        PoolStatus {
            workers: self.config.workers,
            active_tasks: self.stats.active.load(Ordering::Relaxed) as usize,
            queued_tasks: self.stats.queued.load(Ordering::Relaxed) as usize,
            total_processed: self.stats.total_processed.load(Ordering::Relaxed),
            total_failed: self.stats.total_failed.load(Ordering::Relaxed),
            total_cancelled: self.stats.total_cancelled.load(Ordering::Relaxed),
            accepting: self.accepting.load(Ordering::SeqCst),
        }
    }

    /// Stops accepting work and waits for submitted tasks to finish.
    pub async fn shutdown(&self) {
        self.accepting.store(false, Ordering::SeqCst);
        let workers: Vec<_> = self.workers.lock().await.drain(..).collect();
        info!(outstanding = workers.len(), "Draining task queue");
        join_all(workers).await;
    }
}

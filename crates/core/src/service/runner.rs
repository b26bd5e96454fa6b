//! Conversion service implementation.

use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::{self, Category, Format};
use crate::config::Config;
use crate::engine::EngineRegistry;
use crate::metrics;
use crate::pathfinder::{Pathfinder, Plan, RoutingError};
use crate::pipeline::{ExecutionOutcome, ExecutionProgress, ExecutionRequest, PipelineExecutor};
use crate::queue::{PoolStatus, TaskHandle, TaskOutcome, TaskQueue, TaskStatus};

use super::output::resolve_output_path;
use super::types::{ConversionRequest, ServiceError, Task, TaskEvent, TaskEventCallback};

/// Mutable part of a task record.
struct RecordState {
    status: TaskStatus,
    message: Option<String>,
    error: Option<String>,
    finished_at: Option<DateTime<Utc>>,
}

/// A task as tracked by the service.
struct TaskRecord {
    id: String,
    input_path: PathBuf,
    output_path: PathBuf,
    source_category: Category,
    target_format: Format,
    plan: Plan,
    created_at: DateTime<Utc>,
    /// f32 bits, written from the synchronous progress callback.
    progress: AtomicU32,
    state: RwLock<RecordState>,
}

impl TaskRecord {
    fn progress(&self) -> f32 {
        f32::from_bits(self.progress.load(Ordering::Relaxed))
    }

    fn set_progress(&self, fraction: f32) {
        self.progress.store(fraction.to_bits(), Ordering::Relaxed);
    }

    async fn set_status(&self, status: TaskStatus, message: &str) {
        let mut state = self.state.write().await;
        state.status = status;
        state.message = Some(message.to_string());
    }

    async fn finish(&self, outcome: &TaskOutcome, fraction: f32, message: &str) {
        self.set_progress(fraction);
        let mut state = self.state.write().await;
        state.status = outcome.status();
        state.message = Some(message.to_string());
        state.finished_at = Some(Utc::now());
        if let TaskOutcome::Failed(error) = outcome {
            state.error = Some(error.clone());
        }
    }

    async fn status(&self) -> TaskStatus {
        self.state.read().await.status
    }

    fn event(&self, status: TaskStatus, fraction: f32, message: impl Into<String>) -> TaskEvent {
        TaskEvent {
            task_id: self.id.clone(),
            fraction,
            status,
            message: message.into(),
        }
    }

    async fn snapshot(&self) -> Task {
        let state = self.state.read().await;
        Task {
            id: self.id.clone(),
            input_path: self.input_path.clone(),
            output_path: self.output_path.clone(),
            source_category: self.source_category,
            target_format: self.target_format.clone(),
            plan: self.plan.clone(),
            status: state.status,
            progress: self.progress(),
            message: state.message.clone(),
            error: state.error.clone(),
            created_at: self.created_at,
            finished_at: state.finished_at,
        }
    }
}

fn notify(subscriber: &Option<TaskEventCallback>, event: TaskEvent) {
    if let Some(callback) = subscriber {
        callback(event);
    }
}

/// Derives the format of `path` from its extension.
fn source_format(path: &Path) -> Result<Format, ServiceError> {
    Format::from_path(path).ok_or_else(|| ServiceError::NoExtension {
        path: path.to_path_buf(),
    })
}

/// Entry point for submitting and controlling conversions.
///
/// Routing happens synchronously inside [`enqueue`](Self::enqueue); the plan
/// then runs on the task queue and reports through the subscriber callback.
pub struct ConversionService {
    pathfinder: Pathfinder,
    executor: PipelineExecutor,
    queue: TaskQueue,
    tasks: Arc<RwLock<HashMap<String, Arc<TaskRecord>>>>,
    subscriber: Option<TaskEventCallback>,
}

impl ConversionService {
    /// Builds a service with the subprocess engines described by `config`.
    pub fn from_config(config: &Config) -> Self {
        let registry = EngineRegistry::with_defaults(&config.engines);
        Self::with_parts(
            Pathfinder::with_bridges(config.routing.bridge_table()),
            PipelineExecutor::new(config.pipeline.clone(), registry),
            TaskQueue::new(config.queue.clone()),
        )
    }

    /// Builds a service from already constructed components.
    pub fn with_parts(pathfinder: Pathfinder, executor: PipelineExecutor, queue: TaskQueue) -> Self {
        Self {
            pathfinder,
            executor,
            queue,
            tasks: Arc::new(RwLock::new(HashMap::new())),
            subscriber: None,
        }
    }

    /// Sets the callback receiving every task event.
    pub fn with_subscriber(mut self, callback: TaskEventCallback) -> Self {
        self.subscriber = Some(callback);
        self
    }

    pub fn pathfinder(&self) -> &Pathfinder {
        &self.pathfinder
    }

    pub fn executor(&self) -> &PipelineExecutor {
        &self.executor
    }

    /// Plans a conversion between two formats.
    pub fn route(
        &self,
        source: impl Into<Format>,
        target: impl Into<Format>,
    ) -> Result<Plan, RoutingError> {
        let result = self.pathfinder.find_path(source, target);
        let label = match &result {
            Ok(plan) => {
                metrics::PLAN_LENGTH
                    .with_label_values(&[])
                    .observe(plan.len() as f64);
                "found"
            }
            Err(RoutingError::UnknownFormat { .. }) => "unknown_format",
            Err(RoutingError::NoPathFound { .. }) => "no_path",
        };
        metrics::ROUTES_TOTAL.with_label_values(&[label]).inc();
        result
    }

    /// Plans the conversion of a file into `target`.
    pub fn plan_for(&self, input: &Path, target: impl Into<Format>) -> Result<Plan, ServiceError> {
        let source = source_format(input)?;
        Ok(self.route(source, target)?)
    }

    /// Formats a file can be converted into.
    pub fn supported_targets_for(&self, input: &Path) -> Result<BTreeSet<Format>, ServiceError> {
        let source = source_format(input)?;
        Ok(self.pathfinder.supported_targets(source))
    }

    /// Routes a request and schedules it.
    ///
    /// Routing failures are returned here and nothing is scheduled. Once
    /// this returns `Ok`, the task emits exactly one terminal event.
    pub async fn enqueue(&self, request: ConversionRequest) -> Result<TaskHandle, ServiceError> {
        let plan = self.plan_for(&request.input_path, request.target_format.clone())?;
        let source_category = catalog::category_of(plan.source()).ok_or_else(|| {
            RoutingError::unknown_source(plan.source().clone())
        })?;

        let output_path = resolve_output_path(
            &request.input_path,
            &request.target_format,
            request.output_path.as_deref(),
            request.output_dir.as_deref(),
        );
        let task_id = request
            .task_id
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let record = Arc::new(TaskRecord {
            id: task_id.clone(),
            input_path: request.input_path,
            output_path,
            source_category,
            target_format: request.target_format,
            plan,
            created_at: Utc::now(),
            progress: AtomicU32::new(0f32.to_bits()),
            state: RwLock::new(RecordState {
                status: TaskStatus::Pending,
                message: None,
                error: None,
                finished_at: None,
            }),
        });

        let handle = {
            let record = Arc::clone(&record);
            let executor = self.executor.clone();
            let subscriber = self.subscriber.clone();
            self.queue
                .submit(task_id.clone(), move |cancel| {
                    run_conversion(record, executor, subscriber, cancel)
                })
                .await?
        };

        info!(
            task_id = %task_id,
            input = %record.input_path.display(),
            output = %record.output_path.display(),
            plan = %record.plan,
            "Conversion queued"
        );
        self.tasks.write().await.insert(task_id, record);

        Ok(handle)
    }

    /// Cancels a task.
    ///
    /// A queued task is withdrawn and reported as cancelled right away. A
    /// running task is signalled and reports once its engine stops.
    ///
    /// Unlike [`TaskQueue::cancel`], a signalled running task also returns
    /// true, so the result reads as "a cancellation is now under way".
    /// Returns false for unknown or finished tasks.
    pub async fn cancel(&self, task_id: &str) -> bool {
        let Some(record) = self.tasks.read().await.get(task_id).cloned() else {
            return false;
        };
        if record.status().await.is_terminal() {
            return false;
        }

        if self.queue.cancel(task_id).await {
            let outcome = TaskOutcome::Cancelled;
            let fraction = record.progress();
            record.finish(&outcome, fraction, "Cancelled").await;
            notify(
                &self.subscriber,
                record.event(TaskStatus::Cancelled, fraction, "Cancelled"),
            );
            return true;
        }

        // The queue either signalled a running task or the task has just finished.
        !record.status().await.is_terminal()
    }

    /// Cancels every pending or running task. Returns how many were cancelled.
    pub async fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self.tasks.read().await.keys().cloned().collect();
        let mut cancelled = 0;
        for id in ids {
            if self.cancel(&id).await {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Forgets a finished task. Pending or running tasks are kept.
    pub async fn discard(&self, task_id: &str) -> bool {
        let mut tasks = self.tasks.write().await;
        let Some(record) = tasks.get(task_id) else {
            return false;
        };
        if !record.status().await.is_terminal() {
            debug!(task_id, "Not discarding unfinished task");
            return false;
        }
        tasks.remove(task_id);
        self.queue.remove(task_id).await;
        true
    }

    /// Snapshot of one task.
    pub async fn status(&self, task_id: &str) -> Option<Task> {
        let record = self.tasks.read().await.get(task_id).cloned()?;
        Some(record.snapshot().await)
    }

    /// Snapshots of all known tasks, oldest first.
    pub async fn tasks(&self) -> Vec<Task> {
        let records: Vec<_> = self.tasks.read().await.values().cloned().collect();
        let mut tasks = Vec::with_capacity(records.len());
        for record in records {
            tasks.push(record.snapshot().await);
        }
        tasks.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        tasks
    }

    pub fn pool_status(&self) -> PoolStatus {
        self.queue.pool_status()
    }

    /// Stops accepting requests and waits for scheduled tasks to finish.
    pub async fn shutdown(&self) {
        self.queue.shutdown().await;
    }
}

/// Worker body of one task.
async fn run_conversion(
    record: Arc<TaskRecord>,
    executor: PipelineExecutor,
    subscriber: Option<TaskEventCallback>,
    cancel: CancellationToken,
) -> TaskOutcome {
    record.set_status(TaskStatus::Running, "Starting").await;
    notify(&subscriber, record.event(TaskStatus::Running, 0.0, "Starting"));

    let request = ExecutionRequest {
        job_id: record.id.clone(),
        input_path: record.input_path.clone(),
        output_path: record.output_path.clone(),
        plan: record.plan.clone(),
    };

    let on_progress = |progress: ExecutionProgress| {
        // 1.0 is carried by the terminal event
        if progress.fraction >= 1.0 {
            return;
        }
        record.set_progress(progress.fraction);
        notify(
            &subscriber,
            record.event(TaskStatus::Running, progress.fraction, progress.message),
        );
    };

    let result = executor.execute(request, &cancel, on_progress).await;

    let (outcome, fraction, message) = match result {
        Ok(ExecutionOutcome::Completed(report)) => (
            TaskOutcome::Done,
            1.0,
            format!("Completed: {}", report.output_path.display()),
        ),
        Ok(ExecutionOutcome::Cancelled { .. }) => {
            (TaskOutcome::Cancelled, record.progress(), "Cancelled".to_string())
        }
        Err(e) => {
            warn!(task_id = %record.id, error = %e, "Conversion failed");
            let text = e.to_string();
            (TaskOutcome::Failed(text.clone()), record.progress(), text)
        }
    };

    record.finish(&outcome, fraction, &message).await;
    notify(&subscriber, record.event(outcome.status(), fraction, message));
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EngineKind;
    use crate::engine::EngineError;
    use crate::pathfinder::FormatRole;
    use crate::pipeline::PipelineConfig;
    use crate::queue::QueueConfig;
    use crate::testing::fixtures::{self, MockRegistry};
    use std::sync::Mutex;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Harness {
        dir: TempDir,
        mocks: MockRegistry,
        service: ConversionService,
        events: Arc<Mutex<Vec<TaskEvent>>>,
    }

    impl Harness {
        fn new(workers: usize) -> Self {
            let dir = TempDir::new().unwrap();
            let mocks = fixtures::mock_registry();
            let executor = PipelineExecutor::new(
                PipelineConfig::default().with_temp_dir(dir.path().join("tmp")),
                mocks.registry.clone(),
            );
            let events = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&events);
            let service = ConversionService::with_parts(
                Pathfinder::new(),
                executor,
                TaskQueue::new(QueueConfig::default().with_workers(workers)),
            )
            .with_subscriber(Arc::new(move |event| sink.lock().unwrap().push(event)));

            Self {
                dir,
                mocks,
                service,
                events,
            }
        }

        fn input(&self, name: &str) -> PathBuf {
            fixtures::write_input(self.dir.path(), name)
        }

        fn events_for(&self, task_id: &str) -> Vec<TaskEvent> {
            self.events
                .lock()
                .unwrap()
                .iter()
                .filter(|e| e.task_id == task_id)
                .cloned()
                .collect()
        }

        async fn wait_running(&self, task_id: &str) {
            for _ in 0..200 {
                if let Some(task) = self.service.status(task_id).await {
                    if task.status == TaskStatus::Running {
                        return;
                    }
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("task {} never started", task_id);
        }
    }

    #[tokio::test]
    async fn test_enqueue_runs_to_completion() {
        let h = Harness::new(2);
        let input = h.input("clip.mp4");

        let handle = h
            .service
            .enqueue(ConversionRequest::new(&input, "mp3").with_task_id("t1"))
            .await
            .unwrap();
        assert_eq!(handle.wait().await, TaskStatus::Done);

        let events = h.events_for("t1");
        assert_eq!(events.first().unwrap().status, TaskStatus::Running);
        assert_eq!(events.first().unwrap().fraction, 0.0);
        let last = events.last().unwrap();
        assert_eq!(last.status, TaskStatus::Done);
        assert_eq!(last.fraction, 1.0);
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert!(events.windows(2).all(|w| w[0].fraction <= w[1].fraction));

        let task = h.service.status("t1").await.unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert_eq!(task.source_category, Category::Video);
        assert_eq!(task.output_path, h.dir.path().join("clip.mp3"));
        assert!(task.output_path.exists());
        assert!(task.finished_at.is_some());
    }

    #[tokio::test]
    async fn test_generates_task_id() {
        let h = Harness::new(1);
        let input = h.input("photo.png");
        let handle = h
            .service
            .enqueue(ConversionRequest::new(&input, "jpg"))
            .await
            .unwrap();
        assert!(Uuid::parse_str(handle.task_id()).is_ok());
        handle.wait().await;
    }

    #[tokio::test]
    async fn test_routing_errors_are_synchronous() {
        let h = Harness::new(1);
        let input = h.input("clip.mp4");

        let err = h
            .service
            .enqueue(ConversionRequest::new(&input, "xyz").with_task_id("bad"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Routing(RoutingError::UnknownFormat {
                role: FormatRole::Target,
                ..
            })
        ));

        let archive = h.input("bundle.zip");
        let err = h
            .service
            .enqueue(ConversionRequest::new(&archive, "mp3"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::Routing(RoutingError::NoPathFound { .. })
        ));

        assert!(h.service.status("bad").await.is_none());
        assert!(h.events.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_input_without_extension() {
        let h = Harness::new(1);
        let input = h.input("README");
        let err = h
            .service
            .enqueue(ConversionRequest::new(&input, "pdf"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::NoExtension { .. }));
    }

    #[tokio::test]
    async fn test_engine_failure_reports_failed() {
        let h = Harness::new(1);
        h.mocks
            .raster
            .set_next_error(EngineError::conversion_failed("corrupt header", None))
            .await;
        let input = h.input("photo.png");

        let handle = h
            .service
            .enqueue(ConversionRequest::new(&input, "jpg").with_task_id("f1"))
            .await
            .unwrap();
        assert_eq!(handle.wait().await, TaskStatus::Failed);

        let last = h.events_for("f1").pop().unwrap();
        assert_eq!(last.status, TaskStatus::Failed);
        assert!(last.message.contains("corrupt header"));

        let task = h.service.status("f1").await.unwrap();
        assert!(task.error.unwrap().contains("corrupt header"));
        assert!(!task.output_path.exists());
    }

    #[tokio::test]
    async fn test_cancel_queued_task_never_runs() {
        let h = Harness::new(1);
        h.mocks
            .transcode
            .set_step_duration(Duration::from_millis(300))
            .await;
        let clip = h.input("clip.mp4");
        let photo = h.input("photo.png");

        let first = h
            .service
            .enqueue(ConversionRequest::new(&clip, "mkv").with_task_id("busy"))
            .await
            .unwrap();
        h.wait_running("busy").await;
        let second = h
            .service
            .enqueue(ConversionRequest::new(&photo, "jpg").with_task_id("queued"))
            .await
            .unwrap();

        assert!(h.service.cancel("queued").await);
        assert_eq!(second.wait().await, TaskStatus::Cancelled);
        assert_eq!(first.wait().await, TaskStatus::Done);

        let events = h.events_for("queued");
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].status, TaskStatus::Cancelled);
        assert_eq!(h.mocks.raster.job_count().await, 0);
        assert!(!h.service.cancel("queued").await);
    }

    #[tokio::test]
    async fn test_resubmit_cancelled_id_runs() {
        let h = Harness::new(1);
        h.mocks
            .transcode
            .set_step_duration(Duration::from_millis(200))
            .await;
        let clip = h.input("clip.mp4");
        let photo = h.input("photo.png");

        let busy = h
            .service
            .enqueue(ConversionRequest::new(&clip, "mkv").with_task_id("busy"))
            .await
            .unwrap();
        h.wait_running("busy").await;

        let first = h
            .service
            .enqueue(ConversionRequest::new(&photo, "jpg").with_task_id("again"))
            .await
            .unwrap();
        assert!(h.service.cancel("again").await);
        assert_eq!(first.wait().await, TaskStatus::Cancelled);

        let retry = h
            .service
            .enqueue(ConversionRequest::new(&photo, "jpg").with_task_id("again"))
            .await
            .unwrap();

        assert_eq!(busy.wait().await, TaskStatus::Done);
        assert_eq!(retry.wait().await, TaskStatus::Done);

        let task = h.service.status("again").await.unwrap();
        assert_eq!(task.status, TaskStatus::Done);
        assert!(h.dir.path().join("photo.jpg").exists());
        assert_eq!(h.mocks.raster.job_count().await, 1);

        // One terminal event per submission
        let terminal: Vec<TaskStatus> = h
            .events_for("again")
            .iter()
            .filter(|e| e.is_terminal())
            .map(|e| e.status)
            .collect();
        assert_eq!(terminal, vec![TaskStatus::Cancelled, TaskStatus::Done]);
        assert!(h.service.discard("again").await);
    }

    #[tokio::test]
    async fn test_cancel_running_task() {
        let h = Harness::new(1);
        h.mocks
            .raster
            .set_step_duration(Duration::from_secs(30))
            .await;
        let input = h.input("photo.png");

        let handle = h
            .service
            .enqueue(ConversionRequest::new(&input, "jpg").with_task_id("r1"))
            .await
            .unwrap();
        h.wait_running("r1").await;

        assert!(h.service.cancel("r1").await);
        assert_eq!(handle.wait().await, TaskStatus::Cancelled);

        let events = h.events_for("r1");
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(events.last().unwrap().status, TaskStatus::Cancelled);
        assert!(!h.dir.path().join("photo.jpg").exists());
    }

    #[tokio::test]
    async fn test_duplicate_live_task_rejected() {
        let h = Harness::new(1);
        h.mocks
            .raster
            .set_step_duration(Duration::from_millis(200))
            .await;
        let input = h.input("photo.png");

        let handle = h
            .service
            .enqueue(ConversionRequest::new(&input, "jpg").with_task_id("dup"))
            .await
            .unwrap();
        let err = h
            .service
            .enqueue(ConversionRequest::new(&input, "webp").with_task_id("dup"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Queue(_)));

        handle.wait().await;
        let task = h.service.status("dup").await.unwrap();
        assert_eq!(task.target_format, "jpg");
    }

    #[tokio::test]
    async fn test_discard_finished_task() {
        let h = Harness::new(1);
        let input = h.input("photo.png");
        let handle = h
            .service
            .enqueue(ConversionRequest::new(&input, "jpg").with_task_id("d1"))
            .await
            .unwrap();
        handle.wait().await;

        assert!(h.service.discard("d1").await);
        assert!(h.service.status("d1").await.is_none());
        assert!(!h.service.discard("d1").await);
    }

    #[tokio::test]
    async fn test_shutdown_rejects_new_work() {
        let h = Harness::new(1);
        let input = h.input("photo.png");
        let handle = h
            .service
            .enqueue(ConversionRequest::new(&input, "jpg"))
            .await
            .unwrap();

        h.service.shutdown().await;
        assert!(handle.status().is_terminal());

        let err = h
            .service
            .enqueue(ConversionRequest::new(&input, "webp"))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::Queue(_)));
        assert!(!h.service.pool_status().accepting);
    }

    #[test]
    fn test_supported_targets_for_path() {
        let h = Harness::new(1);
        let targets = h
            .service
            .supported_targets_for(Path::new("/music/track.flac"))
            .unwrap();
        assert!(targets.contains(&Format::new("mp3")));
        assert!(targets.contains(&Format::new("mp4")));
        assert!(!targets.contains(&Format::new("zip")));
    }

    #[test]
    fn test_plan_for_uses_extension() {
        let h = Harness::new(1);
        let plan = h
            .service
            .plan_for(Path::new("/in/Slides.PPTX"), "png")
            .unwrap();
        assert_eq!(plan.source(), &Format::new("pptx"));
        assert_eq!(plan.engines().next(), Some(EngineKind::Document));
    }
}

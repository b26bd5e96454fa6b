//! Mock engine for testing.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use tokio_util::sync::CancellationToken;

use crate::catalog::EngineKind;
use crate::engine::{Engine, EngineError, StepJob, StepOutput, StepProgress};

/// A recorded step for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedStep {
    /// The job that was submitted.
    pub job: StepJob,
    /// Whether the step succeeded.
    pub success: bool,
    /// Files next to the step's input when the step started.
    pub input_siblings: Vec<PathBuf>,
}

/// Mock implementation of the Engine trait.
///
/// Provides controllable behavior for testing:
/// - Track step jobs for assertions
/// - Simulate success/failure
/// - Simulate progress updates and step duration
/// - Observe cancellation like a real subprocess engine
///
/// On success the mock writes a small file to the job's output path.
///
/// # Example
///
/// ```rust,ignore
/// use omniconvert_core::testing::MockEngine;
///
/// let engine = Arc::new(MockEngine::new(EngineKind::Raster));
/// engine.set_step_duration(Duration::from_millis(50)).await;
/// engine.set_next_error(EngineError::conversion_failed("boom", None)).await;
///
/// let registry = EngineRegistry::new().with_engine(engine.clone());
/// // ... run a plan ...
///
/// assert_eq!(engine.job_count().await, 1);
/// ```
#[derive(Debug)]
pub struct MockEngine {
    kind: EngineKind,
    name: String,
    /// Recorded steps.
    steps: Arc<RwLock<Vec<RecordedStep>>>,
    /// If set, the next step will fail with this error.
    next_error: Arc<RwLock<Option<EngineError>>>,
    /// Simulated step duration in milliseconds.
    step_duration_ms: Arc<RwLock<u64>>,
    /// Local fractions reported while a step runs.
    progress_ticks: Arc<RwLock<Vec<f32>>>,
    /// Whether `validate` succeeds.
    available: Arc<RwLock<bool>>,
    running: AtomicUsize,
    peak_running: AtomicUsize,
}

impl MockEngine {
    /// Create a new mock engine serving `kind`.
    pub fn new(kind: EngineKind) -> Self {
        Self {
            kind,
            name: format!("mock-{}", kind),
            steps: Arc::new(RwLock::new(Vec::new())),
            next_error: Arc::new(RwLock::new(None)),
            step_duration_ms: Arc::new(RwLock::new(10)),
            progress_ticks: Arc::new(RwLock::new(vec![0.5])),
            available: Arc::new(RwLock::new(true)),
            running: AtomicUsize::new(0),
            peak_running: AtomicUsize::new(0),
        }
    }

    /// Get the jobs of all steps that were run, in call order.
    pub async fn recorded_jobs(&self) -> Vec<StepJob> {
        self.steps.read().await.iter().map(|s| s.job.clone()).collect()
    }

    /// Get all recorded steps with their result.
    pub async fn recorded_steps(&self) -> Vec<RecordedStep> {
        self.steps.read().await.clone()
    }

    /// Get the number of steps run.
    pub async fn job_count(&self) -> usize {
        self.steps.read().await.len()
    }

    /// Configure the next step to fail with the given error.
    pub async fn set_next_error(&self, error: EngineError) {
        *self.next_error.write().await = Some(error);
    }

    /// Set the simulated step duration.
    pub async fn set_step_duration(&self, duration: Duration) {
        *self.step_duration_ms.write().await = duration.as_millis() as u64;
    }

    /// Set the local fractions reported during a step.
    pub async fn set_progress_ticks(&self, ticks: Vec<f32>) {
        *self.progress_ticks.write().await = ticks;
    }

    /// Make `validate` succeed or fail.
    pub async fn set_available(&self, available: bool) {
        *self.available.write().await = available;
    }

    /// Highest number of steps that ran at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak_running.load(Ordering::SeqCst)
    }

    async fn record(&self, job: StepJob, success: bool, input_siblings: Vec<PathBuf>) {
        self.steps.write().await.push(RecordedStep {
            job,
            success,
            input_siblings,
        });
    }

    async fn simulate(
        &self,
        job: &StepJob,
        progress_tx: &mpsc::Sender<StepProgress>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }

        let ticks = self.progress_ticks.read().await.clone();
        let total_ms = *self.step_duration_ms.read().await;
        let pause = Duration::from_millis(total_ms / (ticks.len() as u64 + 1));

        for fraction in ticks {
            tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = tokio::time::sleep(pause) => {}
            }
            let _ = progress_tx
                .send(StepProgress::new(&job.job_id, fraction))
                .await;
        }

        tokio::select! {
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            _ = tokio::time::sleep(pause) => {}
        }

        let content = format!(
            "{} -> {} by {}\n",
            job.source_format, job.target_format, self.name
        );
        tokio::fs::write(&job.output_path, content).await?;
        Ok(())
    }
}

/// Sorted entries of the directory holding `path`.
fn siblings(path: &Path) -> Vec<PathBuf> {
    let Some(dir) = path.parent() else {
        return Vec::new();
    };
    let mut entries: Vec<PathBuf> = std::fs::read_dir(dir)
        .map(|entries| entries.filter_map(|e| e.ok()).map(|e| e.path()).collect())
        .unwrap_or_default();
    entries.sort();
    entries
}

#[async_trait]
impl Engine for MockEngine {
    fn kind(&self) -> EngineKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(
        &self,
        job: StepJob,
        progress_tx: mpsc::Sender<StepProgress>,
        cancel: CancellationToken,
    ) -> Result<StepOutput, EngineError> {
        let input_siblings = siblings(&job.input_path);
        if !job.input_path.exists() {
            self.record(job.clone(), false, input_siblings).await;
            return Err(EngineError::InputNotFound {
                path: job.input_path,
            });
        }

        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak_running.fetch_max(now, Ordering::SeqCst);

        let result = self.simulate(&job, &progress_tx, &cancel).await;

        self.running.fetch_sub(1, Ordering::SeqCst);
        self.record(job.clone(), result.is_ok(), input_siblings).await;
        result?;

        let output_size_bytes = tokio::fs::metadata(&job.output_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(StepOutput {
            job_id: job.job_id,
            output_path: job.output_path,
            output_size_bytes,
            duration_ms: 0,
        })
    }

    async fn validate(&self) -> Result<(), EngineError> {
        if *self.available.read().await {
            Ok(())
        } else {
            Err(EngineError::BinaryNotFound {
                program: self.name.clone(),
                path: PathBuf::from(&self.name),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Format;
    use tempfile::TempDir;

    fn job(dir: &TempDir) -> StepJob {
        let input = dir.path().join("in.png");
        std::fs::write(&input, b"png").unwrap();
        StepJob {
            job_id: "mock-1".to_string(),
            input_path: input,
            output_path: dir.path().join("out.jpg"),
            source_format: Format::new("png"),
            target_format: Format::new("jpg"),
        }
    }

    #[tokio::test]
    async fn test_writes_output_and_reports_progress() {
        let dir = TempDir::new().unwrap();
        let engine = MockEngine::new(EngineKind::Raster);
        engine.set_progress_ticks(vec![0.25, 0.75]).await;
        let (tx, mut rx) = mpsc::channel(8);

        let output = engine
            .run(job(&dir), tx, CancellationToken::new())
            .await
            .unwrap();

        assert!(output.output_path.exists());
        assert!(output.output_size_bytes > 0);
        assert_eq!(rx.recv().await.unwrap().fraction, 0.25);
        assert_eq!(rx.recv().await.unwrap().fraction, 0.75);
        assert_eq!(engine.job_count().await, 1);
    }

    #[tokio::test]
    async fn test_next_error_is_consumed() {
        let dir = TempDir::new().unwrap();
        let engine = MockEngine::new(EngineKind::Raster);
        engine
            .set_next_error(EngineError::conversion_failed("boom", None))
            .await;

        let (tx, _rx) = mpsc::channel(8);
        assert!(engine
            .run(job(&dir), tx.clone(), CancellationToken::new())
            .await
            .is_err());
        assert!(engine
            .run(job(&dir), tx, CancellationToken::new())
            .await
            .is_ok());

        let steps = engine.recorded_steps().await;
        assert!(!steps[0].success);
        assert!(steps[1].success);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_step() {
        let dir = TempDir::new().unwrap();
        let engine = MockEngine::new(EngineKind::Raster);
        engine.set_step_duration(Duration::from_secs(30)).await;
        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let (tx, _rx) = mpsc::channel(8);
        let job = job(&dir);
        let output_path = job.output_path.clone();
        let err = engine.run(job, tx, token).await.unwrap_err();

        assert!(err.is_cancelled());
        assert!(!output_path.exists());
    }

    #[tokio::test]
    async fn test_validate_toggle() {
        let engine = MockEngine::new(EngineKind::Document);
        assert!(engine.validate().await.is_ok());
        engine.set_available(false).await;
        assert!(matches!(
            engine.validate().await,
            Err(EngineError::BinaryNotFound { .. })
        ));
    }
}

//! Plan executor implementation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::catalog::Format;
use crate::engine::{Engine, EngineRegistry, StepJob, StepProgress};
use crate::metrics;

use super::config::PipelineConfig;
use super::error::ExecutionError;
use super::types::{
    ExecutionOutcome, ExecutionProgress, ExecutionReport, ExecutionRequest, StepReport,
};

/// Upper bound for progress reported before the output is in place.
const MAX_PENDING_FRACTION: f32 = 0.99;

/// Rescales per-step fractions into one non-decreasing global fraction.
#[derive(Debug)]
struct ProgressScale {
    total_steps: usize,
    last: f32,
}

impl ProgressScale {
    fn new(total_steps: usize) -> Self {
        Self {
            total_steps: total_steps.max(1),
            last: 0.0,
        }
    }

    /// Global fraction for `local` progress within step `index`.
    ///
    /// Never lower than a previously returned value.
    fn scale(&mut self, index: usize, local: f32) -> f32 {
        let raw = (index as f32 + local.clamp(0.0, 1.0)) / self.total_steps as f32;
        let capped = raw.clamp(0.0, MAX_PENDING_FRACTION);
        self.last = self.last.max(capped);
        self.last
    }

    /// Like [`scale`](Self::scale), but `None` when nothing moved.
    fn advance(&mut self, index: usize, local: f32) -> Option<f32> {
        let before = self.last;
        let now = self.scale(index, local);
        (now > before).then_some(now)
    }

    fn finish(&mut self) -> f32 {
        self.last = 1.0;
        self.last
    }
}

/// Files owned by a running plan.
#[derive(Debug, Default)]
struct Scratch {
    temps: Vec<PathBuf>,
    staging: Option<PathBuf>,
}

impl Scratch {
    /// Deletes every file still owned by the plan.
    async fn clear(&mut self) {
        for path in self.temps.drain(..) {
            remove_quietly(&path).await;
        }
        if let Some(path) = self.staging.take() {
            remove_quietly(&path).await;
        }
    }

    /// Deletes a consumed intermediate.
    async fn release(&mut self, path: &Path) {
        if let Some(pos) = self.temps.iter().position(|p| p == path) {
            let path = self.temps.remove(pos);
            remove_quietly(&path).await;
        }
    }
}

/// Best-effort delete; failures are logged and counted, never returned.
async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed intermediate file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            metrics::CLEANUP_FAILURES.inc();
            warn!(path = %path.display(), error = %e, "Failed to remove intermediate file");
        }
    }
}

/// Hidden sibling of `output` that the final step writes into.
fn staging_path(output: &Path, target: &Format) -> PathBuf {
    let stem = output
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| "output".to_string());
    let name = format!(".{}.{}.partial.{}", stem, Uuid::new_v4(), target);
    match output.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Whether two paths name the same file.
async fn same_file(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (
        tokio::fs::canonicalize(a).await,
        tokio::fs::canonicalize(b).await,
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

/// Runs plans step by step through the registered engines.
///
/// Intermediate files live in the configured temp directory under UUID
/// names. The final step writes a staging file next to the output, which is
/// renamed onto the output path once the step succeeds.
#[derive(Debug, Clone)]
pub struct PipelineExecutor {
    config: PipelineConfig,
    engines: Arc<EngineRegistry>,
}

impl PipelineExecutor {
    /// Creates a new executor.
    pub fn new(config: PipelineConfig, engines: EngineRegistry) -> Self {
        Self {
            config,
            engines: Arc::new(engines),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn engines(&self) -> &EngineRegistry {
        &self.engines
    }

    /// Executes a plan.
    ///
    /// `on_progress` receives a step-start update before every step, the
    /// engine's rescaled progress while it runs, and a final 1.0 once the
    /// output is in place.
    pub async fn execute<F>(
        &self,
        request: ExecutionRequest,
        cancel: &CancellationToken,
        on_progress: F,
    ) -> Result<ExecutionOutcome, ExecutionError>
    where
        F: Fn(ExecutionProgress) + Send + Sync,
    {
        let start = Instant::now();
        let result = self.run_plan(&request, cancel, &on_progress).await;

        let label = match &result {
            Ok(ExecutionOutcome::Completed(_)) => "completed",
            Ok(ExecutionOutcome::Cancelled { .. }) => "cancelled",
            Err(_) => "failed",
        };
        metrics::PLANS_EXECUTED.with_label_values(&[label]).inc();

        match &result {
            Ok(ExecutionOutcome::Completed(report)) => info!(
                job_id = %request.job_id,
                plan = %request.plan,
                output = %report.output_path.display(),
                duration_ms = start.elapsed().as_millis() as u64,
                "Plan completed"
            ),
            Ok(ExecutionOutcome::Cancelled { at_step }) => info!(
                job_id = %request.job_id,
                at_step,
                "Plan cancelled"
            ),
            Err(e) => warn!(job_id = %request.job_id, error = %e, "Plan failed"),
        }

        result
    }

    async fn preflight(
        &self,
        request: &ExecutionRequest,
    ) -> Result<Vec<Arc<dyn Engine>>, ExecutionError> {
        let plan = &request.plan;
        if plan.is_empty() {
            return Err(ExecutionError::EmptyPlan);
        }

        if tokio::fs::metadata(&request.input_path).await.is_err() {
            return Err(ExecutionError::InputNotFound {
                path: request.input_path.clone(),
            });
        }

        if same_file(&request.input_path, &request.output_path).await {
            return Err(ExecutionError::OutputIsSource {
                path: request.output_path.clone(),
            });
        }

        let engines = plan
            .steps()
            .iter()
            .map(|step| {
                self.engines
                    .get(step.engine)
                    .ok_or(ExecutionError::EngineUnavailable { kind: step.engine })
            })
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(parent) = request.output_path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|error| ExecutionError::OutputDir {
                        path: parent.to_path_buf(),
                        error,
                    })?;
            }
        }

        if plan.len() > 1 {
            tokio::fs::create_dir_all(&self.config.temp_dir)
                .await
                .map_err(|error| ExecutionError::TempDir {
                    path: self.config.temp_dir.clone(),
                    error,
                })?;
        }

        Ok(engines)
    }

    async fn run_plan<F>(
        &self,
        request: &ExecutionRequest,
        cancel: &CancellationToken,
        on_progress: &F,
    ) -> Result<ExecutionOutcome, ExecutionError>
    where
        F: Fn(ExecutionProgress) + Send + Sync,
    {
        let engines = self.preflight(request).await?;
        let steps = request.plan.steps();
        let total = steps.len();
        let start = Instant::now();

        let mut scale = ProgressScale::new(total);
        let mut scratch = Scratch::default();
        let mut reports = Vec::with_capacity(total);
        let mut current_input = request.input_path.clone();

        let emit = |fraction: f32, index: usize, message: String| {
            on_progress(ExecutionProgress {
                job_id: request.job_id.clone(),
                fraction,
                step_index: index,
                total_steps: total,
                message,
            });
        };

        for (index, (step, engine)) in steps.iter().zip(engines.iter()).enumerate() {
            if cancel.is_cancelled() {
                scratch.clear().await;
                return Ok(ExecutionOutcome::Cancelled { at_step: index });
            }

            let is_last = index + 1 == total;
            let step_output = if is_last {
                let path = staging_path(&request.output_path, &step.target_format);
                scratch.staging = Some(path.clone());
                path
            } else {
                let path = self
                    .config
                    .temp_dir
                    .join(format!("{}.{}", Uuid::new_v4(), step.target_format));
                scratch.temps.push(path.clone());
                path
            };

            emit(
                scale.scale(index, 0.0),
                index,
                format!(
                    "Step {}/{}: {} -> {} ({})",
                    index + 1,
                    total,
                    step.source_format,
                    step.target_format,
                    engine.name()
                ),
            );

            let job = StepJob {
                job_id: format!("{}-{}", request.job_id, index),
                input_path: current_input.clone(),
                output_path: step_output.clone(),
                source_format: step.source_format.clone(),
                target_format: step.target_format.clone(),
            };

            debug!(job_id = %job.job_id, step = %step, "Dispatching step");

            let step_start = Instant::now();
            let (progress_tx, mut progress_rx) =
                mpsc::channel::<StepProgress>(self.config.progress_buffer.max(1));
            let run = engine.run(job, progress_tx, cancel.clone());
            tokio::pin!(run);

            let result = loop {
                tokio::select! {
                    result = &mut run => break result,
                    Some(progress) = progress_rx.recv() => {
                        if let Some(fraction) = scale.advance(index, progress.fraction) {
                            let message = progress
                                .message
                                .unwrap_or_else(|| format!("Converting to {}", step.target_format));
                            emit(fraction, index, message);
                        }
                    }
                }
            };
            while let Ok(progress) = progress_rx.try_recv() {
                if let Some(fraction) = scale.advance(index, progress.fraction) {
                    emit(fraction, index, format!("Converting to {}", step.target_format));
                }
            }

            let elapsed = step_start.elapsed();
            metrics::STEP_DURATION
                .with_label_values(&[step.engine.as_str()])
                .observe(elapsed.as_secs_f64());

            if let Err(error) = result {
                scratch.clear().await;
                if error.is_cancelled() {
                    return Ok(ExecutionOutcome::Cancelled { at_step: index });
                }
                metrics::STEP_FAILURES
                    .with_label_values(&[step.engine.as_str()])
                    .inc();
                return Err(ExecutionError::StepFailed {
                    index,
                    engine: step.engine,
                    from: step.source_format.clone(),
                    to: step.target_format.clone(),
                    error,
                });
            }

            // The previous intermediate has been consumed.
            scratch.release(&current_input).await;

            reports.push(StepReport {
                index,
                engine: step.engine,
                source_format: step.source_format.clone(),
                target_format: step.target_format.clone(),
                duration_ms: elapsed.as_millis() as u64,
            });
            current_input = step_output;
        }

        let staging = current_input;
        if let Err(error) = tokio::fs::rename(&staging, &request.output_path).await {
            scratch.clear().await;
            return Err(ExecutionError::Finalize {
                path: request.output_path.clone(),
                error,
            });
        }
        scratch.staging = None;

        let output_size_bytes = tokio::fs::metadata(&request.output_path)
            .await
            .map(|m| m.len())
            .unwrap_or(0);

        emit(scale.finish(), total - 1, "Completed".to_string());

        Ok(ExecutionOutcome::Completed(ExecutionReport {
            job_id: request.job_id.clone(),
            output_path: request.output_path.clone(),
            output_size_bytes,
            steps: reports,
            duration_ms: start.elapsed().as_millis() as u64,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EngineKind;
    use crate::pathfinder::Pathfinder;
    use crate::testing::MockEngine;
    use std::sync::Mutex;
    use tempfile::TempDir;

    #[test]
    fn test_progress_scale_is_monotonic_and_capped() {
        let mut scale = ProgressScale::new(2);
        assert_eq!(scale.scale(0, 0.5), 0.25);
        // A lower value never moves progress back.
        assert_eq!(scale.scale(0, 0.1), 0.25);
        assert_eq!(scale.advance(0, 0.2), None);
        assert_eq!(scale.advance(1, 0.0), Some(0.5));
        assert_eq!(scale.scale(1, 1.0), MAX_PENDING_FRACTION);
        assert_eq!(scale.finish(), 1.0);
    }

    #[test]
    fn test_staging_path_is_hidden_sibling() {
        let path = staging_path(Path::new("/out/report.pdf"), &Format::new("pdf"));
        assert_eq!(path.parent(), Some(Path::new("/out")));
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with(".report."));
        assert!(name.ends_with(".partial.pdf"));
    }

    struct Fixture {
        _dir: TempDir,
        root: PathBuf,
        temp_dir: PathBuf,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let root = dir.path().to_path_buf();
            let temp_dir = root.join("tmp");
            Self {
                _dir: dir,
                root,
                temp_dir,
            }
        }

        fn executor(&self, engines: Vec<Arc<MockEngine>>) -> PipelineExecutor {
            let mut registry = EngineRegistry::new();
            for engine in engines {
                registry.register(engine);
            }
            PipelineExecutor::new(
                PipelineConfig::default().with_temp_dir(self.temp_dir.clone()),
                registry,
            )
        }

        fn input(&self, name: &str) -> PathBuf {
            let path = self.root.join(name);
            std::fs::write(&path, b"input").unwrap();
            path
        }

        fn request(&self, input: &Path, output: &str, target: &str) -> ExecutionRequest {
            let source = Format::from_path(input).unwrap();
            ExecutionRequest {
                job_id: "job-1".to_string(),
                input_path: input.to_path_buf(),
                output_path: self.root.join(output),
                plan: Pathfinder::new().find_path(source, target).unwrap(),
            }
        }

        fn temp_files(&self) -> usize {
            std::fs::read_dir(&self.temp_dir)
                .map(|entries| entries.count())
                .unwrap_or(0)
        }
    }

    #[tokio::test]
    async fn test_single_step_plan() {
        let fx = Fixture::new();
        let raster = Arc::new(MockEngine::new(EngineKind::Raster));
        let executor = fx.executor(vec![raster.clone()]);
        let input = fx.input("photo.png");

        let outcome = executor
            .execute(
                fx.request(&input, "photo.jpg", "jpg"),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap();

        let report = outcome.report().unwrap();
        assert_eq!(report.steps.len(), 1);
        assert!(fx.root.join("photo.jpg").exists());
        assert_eq!(raster.recorded_jobs().await.len(), 1);
    }

    #[tokio::test]
    async fn test_unusable_output_directory() {
        let fx = Fixture::new();
        let raster = Arc::new(MockEngine::new(EngineKind::Raster));
        let executor = fx.executor(vec![raster.clone()]);
        let input = fx.input("photo.png");
        // A regular file where the output directory should be
        std::fs::write(fx.root.join("blocked"), b"file").unwrap();

        let err = executor
            .execute(
                fx.request(&input, "blocked/photo.jpg", "jpg"),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap_err();

        match &err {
            ExecutionError::OutputDir { path, .. } => assert_eq!(path, &fx.root.join("blocked")),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().starts_with("Failed to create output directory"));
        assert_eq!(raster.job_count().await, 0);
    }

    #[tokio::test]
    async fn test_progress_ends_at_one() {
        let fx = Fixture::new();
        let executor = fx.executor(vec![
            Arc::new(MockEngine::new(EngineKind::Transcode)),
            Arc::new(MockEngine::new(EngineKind::Raster)),
        ]);
        let input = fx.input("clip.mp4");

        let seen = Mutex::new(Vec::new());
        executor
            .execute(
                fx.request(&input, "clip.pdf", "pdf"),
                &CancellationToken::new(),
                |p| seen.lock().unwrap().push(p.fraction),
            )
            .await
            .unwrap();

        let seen = seen.into_inner().unwrap();
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(seen.last().copied(), Some(1.0));
        assert_eq!(seen.iter().filter(|f| **f == 1.0).count(), 1);
    }

    #[tokio::test]
    async fn test_missing_engine_fails_before_any_step() {
        let fx = Fixture::new();
        let transcode = Arc::new(MockEngine::new(EngineKind::Transcode));
        let executor = fx.executor(vec![transcode.clone()]);
        let input = fx.input("clip.mp4");

        let err = executor
            .execute(
                fx.request(&input, "clip.pdf", "pdf"),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            ExecutionError::EngineUnavailable {
                kind: EngineKind::Raster
            }
        ));
        assert!(transcode.recorded_jobs().await.is_empty());
    }

    #[tokio::test]
    async fn test_output_must_not_be_input() {
        let fx = Fixture::new();
        let executor = fx.executor(vec![Arc::new(MockEngine::new(EngineKind::Transcode))]);
        let input = fx.input("song.mp3");

        let err = executor
            .execute(
                fx.request(&input, "song.mp3", "mp3"),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::OutputIsSource { .. }));
        assert_eq!(std::fs::read(&input).unwrap(), b"input");
    }

    #[tokio::test]
    async fn test_missing_input() {
        let fx = Fixture::new();
        let executor = fx.executor(vec![Arc::new(MockEngine::new(EngineKind::Raster))]);
        let request = fx.request(&fx.root.join("ghost.png"), "ghost.jpg", "jpg");

        let err = executor
            .execute(request, &CancellationToken::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::InputNotFound { .. }));
    }

    #[tokio::test]
    async fn test_empty_plan_rejected() {
        let fx = Fixture::new();
        let executor = fx.executor(vec![]);
        let input = fx.input("a.png");
        let plan = serde_json::from_str(r#"{"source":"png","target":"jpg","steps":[]}"#).unwrap();

        let err = executor
            .execute(
                ExecutionRequest {
                    job_id: "empty".to_string(),
                    input_path: input,
                    output_path: fx.root.join("a.jpg"),
                    plan,
                },
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::EmptyPlan));
    }

    #[tokio::test]
    async fn test_cancelled_before_start() {
        let fx = Fixture::new();
        let raster = Arc::new(MockEngine::new(EngineKind::Raster));
        let executor = fx.executor(vec![raster.clone()]);
        let input = fx.input("photo.png");
        let token = CancellationToken::new();
        token.cancel();

        let outcome = executor
            .execute(fx.request(&input, "photo.jpg", "jpg"), &token, |_| {})
            .await
            .unwrap();

        assert!(matches!(outcome, ExecutionOutcome::Cancelled { at_step: 0 }));
        assert!(raster.recorded_jobs().await.is_empty());
        assert!(!fx.root.join("photo.jpg").exists());
    }

    #[tokio::test]
    async fn test_failure_removes_intermediates() {
        let fx = Fixture::new();
        let raster = Arc::new(MockEngine::new(EngineKind::Raster));
        raster
            .set_next_error(crate::engine::EngineError::conversion_failed("boom", None))
            .await;
        let executor = fx.executor(vec![
            Arc::new(MockEngine::new(EngineKind::Transcode)),
            raster,
        ]);
        let input = fx.input("clip.mp4");

        let err = executor
            .execute(
                fx.request(&input, "clip.pdf", "pdf"),
                &CancellationToken::new(),
                |_| {},
            )
            .await
            .unwrap_err();

        assert_eq!(err.failed_step(), Some(1));
        assert_eq!(fx.temp_files(), 0);
        assert!(!fx.root.join("clip.pdf").exists());
    }
}

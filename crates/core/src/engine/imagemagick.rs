//! ImageMagick-based raster engine.

use async_trait::async_trait;
use std::ffi::OsString;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::config::ImageMagickConfig;
use super::error::EngineError;
use super::process::{check_tool, output_size, run_tool};
use super::traits::Engine;
use super::types::{StepJob, StepOutput, StepProgress};
use crate::catalog::{category_of, Category, EngineKind, Format};

/// Inputs that ImageMagick rasterizes through a delegate and that need a density.
const VECTOR_INPUTS: &[&str] = &["pdf", "svg", "eps", "ai"];

/// Raster engine backed by the `magick` command (ImageMagick 7).
///
/// Handles image to image conversions plus the PDF edges of the bridge
/// table: an image wrapped into a PDF, and the first page of a PDF
/// rendered to an image.
pub struct ImageMagickEngine {
    config: ImageMagickConfig,
}

impl ImageMagickEngine {
    pub fn new(config: ImageMagickConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(ImageMagickConfig::default())
    }

    fn accepts(format: &Format) -> bool {
        format == "pdf" || category_of(format) == Some(Category::Image)
    }

    fn build_args(&self, job: &StepJob) -> Result<Vec<OsString>, EngineError> {
        if !Self::accepts(&job.source_format) || !Self::accepts(&job.target_format) {
            return Err(EngineError::UnsupportedConversion {
                from: job.source_format.clone(),
                to: job.target_format.clone(),
            });
        }

        let mut args: Vec<OsString> = Vec::new();

        if VECTOR_INPUTS.contains(&job.source_format.as_str()) {
            args.push("-density".into());
            args.push(self.config.density.to_string().into());
        }

        // Only the first frame or page of multi-image inputs.
        let mut input = job.input_path.clone().into_os_string();
        input.push("[0]");
        args.push(input);

        args.push(job.output_path.clone().into_os_string());
        Ok(args)
    }
}

#[async_trait]
impl Engine for ImageMagickEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Raster
    }

    fn name(&self) -> &str {
        "imagemagick"
    }

    async fn run(
        &self,
        job: StepJob,
        progress_tx: mpsc::Sender<StepProgress>,
        cancel: CancellationToken,
    ) -> Result<StepOutput, EngineError> {
        let start = Instant::now();

        if !job.input_path.exists() {
            return Err(EngineError::InputNotFound {
                path: job.input_path.clone(),
            });
        }

        let args = self.build_args(&job)?;
        let _ = progress_tx.try_send(StepProgress::new(&job.job_id, 0.0));

        run_tool(
            "magick",
            &self.config.magick_path,
            args,
            self.config.timeout_secs,
            &cancel,
        )
        .await?;

        let output_size_bytes = output_size(&job.output_path).await?;
        let _ = progress_tx.try_send(StepProgress::new(&job.job_id, 1.0));

        debug!(
            job_id = %job.job_id,
            from = %job.source_format,
            to = %job.target_format,
            "Raster step finished"
        );

        Ok(StepOutput {
            job_id: job.job_id,
            output_path: job.output_path,
            output_size_bytes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn validate(&self) -> Result<(), EngineError> {
        check_tool("magick", &self.config.magick_path, "-version").await
    }
}

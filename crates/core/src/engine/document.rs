//! Document engine backed by pandoc, LibreOffice and pdftotext.

use async_trait::async_trait;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use super::config::DocumentConfig;
use super::error::EngineError;
use super::process::{check_tool, output_size, run_tool};
use super::traits::Engine;
use super::types::{StepJob, StepOutput, StepProgress};
use crate::catalog::{category_of, Category, EngineKind, Format};

/// Office formats pandoc cannot read.
const OFFICE_INPUTS: &[&str] = &["doc", "ppt", "pptx", "xls", "xlsx", "ods", "odp"];

/// The external program used for one document transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentBackend {
    /// `pdftotext` straight to the output.
    PdfToText,
    /// `pdftotext` into a scratch file, then pandoc.
    PdfViaText,
    /// LibreOffice in headless mode.
    LibreOffice,
    /// pandoc.
    Pandoc,
}

/// Picks the backend for a document or ebook transition.
pub fn select_backend(source: &Format, target: &Format) -> Result<DocumentBackend, EngineError> {
    let is_text = |f: &Format| {
        matches!(
            category_of(f),
            Some(Category::Document) | Some(Category::Ebook)
        )
    };
    if !is_text(source) || !is_text(target) {
        return Err(EngineError::UnsupportedConversion {
            from: source.clone(),
            to: target.clone(),
        });
    }

    if source == "pdf" {
        return Ok(if target == "txt" {
            DocumentBackend::PdfToText
        } else {
            DocumentBackend::PdfViaText
        });
    }

    let office_source = OFFICE_INPUTS.contains(&source.as_str());
    let office_to_pdf = target == "pdf" && category_of(source) == Some(Category::Document);
    if office_source || office_to_pdf {
        return Ok(DocumentBackend::LibreOffice);
    }

    Ok(DocumentBackend::Pandoc)
}

/// Engine for document and ebook formats.
pub struct DocumentEngine {
    config: DocumentConfig,
}

impl DocumentEngine {
    pub fn new(config: DocumentConfig) -> Self {
        Self { config }
    }

    pub fn with_defaults() -> Self {
        Self::new(DocumentConfig::default())
    }

    fn pandoc_args(input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            input.as_os_str().to_owned(),
            "-o".into(),
            output.as_os_str().to_owned(),
        ]
    }

    fn pdftotext_args(input: &Path, output: &Path) -> Vec<OsString> {
        vec![
            "-enc".into(),
            "UTF-8".into(),
            "-layout".into(),
            input.as_os_str().to_owned(),
            output.as_os_str().to_owned(),
        ]
    }

    fn soffice_args(input: &Path, target: &Format, outdir: &Path) -> Vec<OsString> {
        // A private profile lets several instances run side by side.
        let mut profile = OsString::from("-env:UserInstallation=file://");
        profile.push(outdir.join("profile"));
        vec![
            profile,
            "--headless".into(),
            "--convert-to".into(),
            target.as_str().into(),
            "--outdir".into(),
            outdir.as_os_str().to_owned(),
            input.as_os_str().to_owned(),
        ]
    }

    /// Scratch location next to the step output.
    fn scratch_path(output: &Path, suffix: &str) -> PathBuf {
        let dir = output.parent().unwrap_or_else(|| Path::new("."));
        dir.join(format!(".{}.{}", Uuid::new_v4(), suffix))
    }

    async fn run_pdf_via_text(
        &self,
        job: &StepJob,
        progress_tx: &mpsc::Sender<StepProgress>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let scratch = Self::scratch_path(&job.output_path, "txt");
        let result = self
            .pdf_via_text_steps(job, &scratch, progress_tx, cancel)
            .await;

        if let Err(e) = tokio::fs::remove_file(&scratch).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %scratch.display(), error = %e, "Failed to remove scratch file");
            }
        }

        result
    }

    async fn pdf_via_text_steps(
        &self,
        job: &StepJob,
        scratch: &Path,
        progress_tx: &mpsc::Sender<StepProgress>,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        run_tool(
            "pdftotext",
            &self.config.pdftotext_path,
            Self::pdftotext_args(&job.input_path, scratch),
            self.config.timeout_secs,
            cancel,
        )
        .await?;

        let _ = progress_tx
            .try_send(StepProgress::new(&job.job_id, 0.5).with_message("Text extracted"));

        run_tool(
            "pandoc",
            &self.config.pandoc_path,
            Self::pandoc_args(scratch, &job.output_path),
            self.config.timeout_secs,
            cancel,
        )
        .await?;
        Ok(())
    }

    async fn run_libreoffice(
        &self,
        job: &StepJob,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let outdir = Self::scratch_path(&job.output_path, "soffice");
        tokio::fs::create_dir_all(&outdir).await?;

        let result = self.libreoffice_convert(job, &outdir, cancel).await;

        if let Err(e) = tokio::fs::remove_dir_all(&outdir).await {
            warn!(path = %outdir.display(), error = %e, "Failed to remove LibreOffice scratch dir");
        }

        result
    }

    async fn libreoffice_convert(
        &self,
        job: &StepJob,
        outdir: &Path,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        run_tool(
            "soffice",
            &self.config.soffice_path,
            Self::soffice_args(&job.input_path, &job.target_format, outdir),
            self.config.timeout_secs,
            cancel,
        )
        .await?;

        // LibreOffice names its output after the input stem.
        let mut name = job
            .input_path
            .file_stem()
            .map(|s| s.to_os_string())
            .unwrap_or_else(|| OsString::from("output"));
        name.push(".");
        name.push(job.target_format.as_str());
        let produced = outdir.join(name);

        if !produced.exists() {
            return Err(EngineError::OutputMissing { path: produced });
        }
        tokio::fs::rename(&produced, &job.output_path).await?;
        Ok(())
    }
}

#[async_trait]
impl Engine for DocumentEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Document
    }

    fn name(&self) -> &str {
        "document"
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

        let backend = select_backend(&job.source_format, &job.target_format)?;
        debug!(job_id = %job.job_id, ?backend, "Running document step");

        let _ = progress_tx.try_send(StepProgress::new(&job.job_id, 0.0));

        match backend {
            DocumentBackend::PdfToText => {
                run_tool(
                    "pdftotext",
                    &self.config.pdftotext_path,
                    Self::pdftotext_args(&job.input_path, &job.output_path),
                    self.config.timeout_secs,
                    &cancel,
                )
                .await?;
            }
            DocumentBackend::PdfViaText => {
                self.run_pdf_via_text(&job, &progress_tx, &cancel).await?;
            }
            DocumentBackend::LibreOffice => {
                self.run_libreoffice(&job, &cancel).await?;
            }
            DocumentBackend::Pandoc => {
                run_tool(
                    "pandoc",
                    &self.config.pandoc_path,
                    Self::pandoc_args(&job.input_path, &job.output_path),
                    self.config.timeout_secs,
                    &cancel,
                )
                .await?;
            }
        }

        let output_size_bytes = output_size(&job.output_path).await?;
        let _ = progress_tx.try_send(StepProgress::new(&job.job_id, 1.0));

        Ok(StepOutput {
            job_id: job.job_id,
            output_path: job.output_path,
            output_size_bytes,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }

    async fn validate(&self) -> Result<(), EngineError> {
        check_tool("pandoc", &self.config.pandoc_path, "--version").await?;
        check_tool("soffice", &self.config.soffice_path, "--version").await?;
        check_tool("pdftotext", &self.config.pdftotext_path, "-v").await
    }
}

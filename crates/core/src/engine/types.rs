//! Types for the engine module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::catalog::Format;

/// A single format transition handed to an engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepJob {
    /// Identifier for logging, unique per step run.
    pub job_id: String,
    /// File to read.
    pub input_path: PathBuf,
    /// File to write. Its extension matches `target_format`.
    pub output_path: PathBuf,
    /// Format of the input file.
    pub source_format: Format,
    /// Format to produce.
    pub target_format: Format,
}

/// Progress reported by an engine for the step it is running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepProgress {
    /// Job ID.
    pub job_id: String,
    /// Local completion fraction in `[0, 1]`.
    pub fraction: f32,
    /// Short human readable status.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl StepProgress {
    pub fn new(job_id: impl Into<String>, fraction: f32) -> Self {
        Self {
            job_id: job_id.into(),
            fraction: fraction.clamp(0.0, 1.0),
            message: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

/// Result of a successful step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepOutput {
    /// Job ID.
    pub job_id: String,
    /// Path of the produced file.
    pub output_path: PathBuf,
    /// Size of the produced file in bytes.
    pub output_size_bytes: u64,
    /// Wall clock time of the step in milliseconds.
    pub duration_ms: u64,
}

/// Basic information about a media file, as reported by ffprobe.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaInfo {
    /// Path to the file.
    pub path: PathBuf,
    /// Container format name.
    pub format: String,
    /// Duration in seconds (0 when unknown).
    pub duration_secs: f64,
    /// Whether the file has at least one video stream.
    pub has_video: bool,
    /// Whether the file has at least one audio stream.
    pub has_audio: bool,
}

//! Configuration for the pipeline executor.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for plan execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Directory for intermediate files between steps.
    #[serde(default = "default_temp_dir")]
    pub temp_dir: PathBuf,

    /// Capacity of the per-step progress channel.
    #[serde(default = "default_progress_buffer")]
    pub progress_buffer: usize,
}

fn default_temp_dir() -> PathBuf {
    std::env::temp_dir().join("omniconvert")
}

fn default_progress_buffer() -> usize {
    64
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            temp_dir: default_temp_dir(),
            progress_buffer: default_progress_buffer(),
        }
    }
}

impl PipelineConfig {
    /// Sets the temp directory.
    pub fn with_temp_dir(mut self, dir: PathBuf) -> Self {
        self.temp_dir = dir;
        self
    }
}

//! Configuration for the engine adapters.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for all built-in engines.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnginesConfig {
    #[serde(default)]
    pub ffmpeg: FfmpegConfig,
    #[serde(default)]
    pub imagemagick: ImageMagickConfig,
    #[serde(default)]
    pub document: DocumentConfig,
}

/// Configuration for the FFmpeg-based transcode engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FfmpegConfig {
    /// Path to ffmpeg binary.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: PathBuf,

    /// Path to ffprobe binary.
    #[serde(default = "default_ffprobe_path")]
    pub ffprobe_path: PathBuf,

    /// Timeout for a single step in seconds.
    #[serde(default = "default_long_timeout")]
    pub timeout_secs: u64,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Minimum interval between progress reports in milliseconds.
    #[serde(default = "default_progress_interval")]
    pub progress_interval_ms: u64,

    /// Frame size of the video track generated when audio becomes video.
    #[serde(default = "default_canvas_size")]
    pub canvas_size: String,

    /// Hardware decoder for video inputs, picked by GPU vendor.
    #[serde(default)]
    pub hwaccel: Option<HwAccel>,

    /// Additional ffmpeg arguments placed before the output path.
    #[serde(default)]
    pub extra_args: Vec<String>,
}

/// GPU vendor whose hardware decoder ffmpeg should use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwAccel {
    Nvidia,
    Amd,
    Intel,
}

impl HwAccel {
    /// Input options enabling the vendor's decoder.
    pub fn input_args(&self) -> &'static [&'static str] {
        match self {
            Self::Nvidia => &["-hwaccel", "cuda", "-hwaccel_output_format", "cuda"],
            Self::Amd => &["-hwaccel", "amf"],
            Self::Intel => &["-hwaccel", "qsv"],
        }
    }
}

/// Configuration for the ImageMagick raster engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMagickConfig {
    /// Path to the `magick` binary (ImageMagick 7).
    #[serde(default = "default_magick_path")]
    pub magick_path: PathBuf,

    /// Rasterization density (DPI) for vector and PDF inputs.
    #[serde(default = "default_density")]
    pub density: u32,

    /// Timeout for a single step in seconds.
    #[serde(default = "default_short_timeout")]
    pub timeout_secs: u64,
}

/// Configuration for the document engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentConfig {
    /// Path to the pandoc binary.
    #[serde(default = "default_pandoc_path")]
    pub pandoc_path: PathBuf,

    /// Path to the LibreOffice binary.
    #[serde(default = "default_soffice_path")]
    pub soffice_path: PathBuf,

    /// Path to the pdftotext binary (xpdf / poppler).
    #[serde(default = "default_pdftotext_path")]
    pub pdftotext_path: PathBuf,

    /// Timeout for a single step in seconds.
    #[serde(default = "default_short_timeout")]
    pub timeout_secs: u64,
}

fn default_ffmpeg_path() -> PathBuf {
    PathBuf::from("ffmpeg")
}

fn default_ffprobe_path() -> PathBuf {
    PathBuf::from("ffprobe")
}

fn default_magick_path() -> PathBuf {
    PathBuf::from("magick")
}

fn default_pandoc_path() -> PathBuf {
    PathBuf::from("pandoc")
}

fn default_soffice_path() -> PathBuf {
    PathBuf::from("soffice")
}

fn default_pdftotext_path() -> PathBuf {
    PathBuf::from("pdftotext")
}

fn default_long_timeout() -> u64 {
    6 * 3600 // 6 hours
}

fn default_short_timeout() -> u64 {
    600 // 10 minutes
}

fn default_log_level() -> String {
    "warning".to_string()
}

fn default_progress_interval() -> u64 {
    250
}

fn default_canvas_size() -> String {
    "1280x720".to_string()
}

fn default_density() -> u32 {
    150
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            ffprobe_path: default_ffprobe_path(),
            timeout_secs: default_long_timeout(),
            log_level: default_log_level(),
            progress_interval_ms: default_progress_interval(),
            canvas_size: default_canvas_size(),
            hwaccel: None,
            extra_args: Vec::new(),
        }
    }
}

impl Default for ImageMagickConfig {
    fn default() -> Self {
        Self {
            magick_path: default_magick_path(),
            density: default_density(),
            timeout_secs: default_short_timeout(),
        }
    }
}

impl Default for DocumentConfig {
    fn default() -> Self {
        Self {
            pandoc_path: default_pandoc_path(),
            soffice_path: default_soffice_path(),
            pdftotext_path: default_pdftotext_path(),
            timeout_secs: default_short_timeout(),
        }
    }
}

impl FfmpegConfig {
    /// Creates a new config with custom ffmpeg/ffprobe paths.
    pub fn with_paths(ffmpeg_path: PathBuf, ffprobe_path: PathBuf) -> Self {
        Self {
            ffmpeg_path,
            ffprobe_path,
            ..Default::default()
        }
    }

    /// Sets the timeout in seconds.
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }
}

//! Engine adapters that perform single format transitions.
//!
//! This module provides the [`Engine`] trait and implementations backed by
//! external command line tools.
//!
//! # Engines
//!
//! - [`FfmpegEngine`] for video and audio, including still frames, audio
//!   extraction and audio over a generated canvas
//! - [`ImageMagickEngine`] for raster images and PDF pages
//! - [`DocumentEngine`] for documents and ebooks (pandoc, LibreOffice,
//!   pdftotext)
//!
//! Every engine runs its tool as a child process that is killed when the
//! step's [`CancellationToken`](tokio_util::sync::CancellationToken) fires
//! or the configured timeout elapses.
//!
//! # Example
//!
//! ```ignore
//! use omniconvert_core::engine::{Engine, EngineRegistry, EnginesConfig, StepJob};
//! use omniconvert_core::catalog::{EngineKind, Format};
//!
//! let registry = EngineRegistry::with_defaults(&EnginesConfig::default());
//! let ffmpeg = registry.get(EngineKind::Transcode).unwrap();
//!
//! let (tx, mut rx) = tokio::sync::mpsc::channel(16);
//! let job = StepJob {
//!     job_id: "job-1".to_string(),
//!     input_path: PathBuf::from("/path/to/clip.mkv"),
//!     output_path: PathBuf::from("/path/to/clip.mp4"),
//!     source_format: Format::new("mkv"),
//!     target_format: Format::new("mp4"),
//! };
//!
//! let output = ffmpeg.run(job, tx, CancellationToken::new()).await?;
//! println!("Converted in {} ms", output.duration_ms);
//! ```

mod config;
mod document;
mod error;
mod ffmpeg;
mod imagemagick;
mod process;
mod registry;
mod traits;
mod types;

pub use config::{DocumentConfig, EnginesConfig, FfmpegConfig, HwAccel, ImageMagickConfig};
pub use document::{select_backend, DocumentBackend, DocumentEngine};
pub use error::EngineError;
pub use ffmpeg::FfmpegEngine;
pub use imagemagick::ImageMagickEngine;
pub use registry::EngineRegistry;
pub use traits::Engine;
pub use types::{MediaInfo, StepJob, StepOutput, StepProgress};

//! Configuration loading and validation.
//!
//! Settings come from a TOML file, overridden by `OMNICONVERT_`-prefixed
//! environment variables where `__` separates nested keys:
//!
//! ```toml
//! [queue]
//! workers = 4
//!
//! [engines.ffmpeg]
//! timeout_secs = 3600
//! hwaccel = "nvidia"
//!
//! [[routing.extra_bridges]]
//! from = "audio"
//! to = "image"
//! format = "png"
//! ```

mod loader;
mod types;
mod validate;

pub use loader::{load_config, load_config_from_env, load_config_from_str, ENV_PREFIX};
pub use types::*;
pub use validate::validate_config;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    /// The file or environment could not be parsed into a [`Config`].
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// Parsed values that cannot be used, e.g. zero workers.
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

use serde::{Deserialize, Serialize};

use crate::catalog::{Bridge, BridgeTable};
use crate::engine::EnginesConfig;
use crate::pipeline::PipelineConfig;
use crate::queue::QueueConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub engines: EnginesConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Routing configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RoutingConfig {
    /// Bridges added to the standard table. An entry for an existing
    /// category pair replaces that pair's bridge format.
    #[serde(default)]
    pub extra_bridges: Vec<Bridge>,
}

impl RoutingConfig {
    /// The standard bridge table extended with `extra_bridges`.
    pub fn bridge_table(&self) -> BridgeTable {
        self.extra_bridges
            .iter()
            .cloned()
            .fold(BridgeTable::standard(), BridgeTable::with_bridge)
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default)]
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

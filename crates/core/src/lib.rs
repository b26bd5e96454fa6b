pub mod catalog;
pub mod config;
pub mod engine;
pub mod metrics;
pub mod pathfinder;
pub mod pipeline;
pub mod queue;
pub mod service;
pub mod testing;

pub use catalog::{Bridge, BridgeTable, Category, EngineKind, Format};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, LogFormat,
};
pub use engine::{Engine, EngineError, EngineRegistry};
pub use pathfinder::{ConversionStep, Pathfinder, Plan, RoutingError};
pub use pipeline::{ExecutionError, ExecutionOutcome, PipelineExecutor};
pub use queue::{TaskQueue, TaskStatus};
pub use service::{ConversionRequest, ConversionService, ServiceError, Task, TaskEvent};

//! Testing utilities and mock implementations.
//!
//! This module provides a mock [`Engine`](crate::engine::Engine) so plans,
//! queues and the conversion service can be exercised without ffmpeg,
//! ImageMagick or pandoc installed.
//!
//! # Example
//!
//! ```rust,ignore
//! use omniconvert_core::testing::{fixtures, MockEngine};
//!
//! let registry = fixtures::mock_registry();
//! let executor = PipelineExecutor::new(PipelineConfig::default(), registry.registry.clone());
//!
//! // Configure mock behavior
//! registry.raster.set_step_duration(Duration::from_millis(50)).await;
//! ```

mod mock_engine;

pub use mock_engine::{MockEngine, RecordedStep};

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use super::MockEngine;
    use crate::catalog::EngineKind;
    use crate::engine::EngineRegistry;

    /// A registry whose built-in kinds are all served by mocks.
    pub struct MockRegistry {
        pub registry: EngineRegistry,
        pub transcode: Arc<MockEngine>,
        pub raster: Arc<MockEngine>,
        pub document: Arc<MockEngine>,
    }

    /// Create a registry with a mock for transcode, raster and document.
    pub fn mock_registry() -> MockRegistry {
        let transcode = Arc::new(MockEngine::new(EngineKind::Transcode));
        let raster = Arc::new(MockEngine::new(EngineKind::Raster));
        let document = Arc::new(MockEngine::new(EngineKind::Document));

        let registry = EngineRegistry::new()
            .with_engine(transcode.clone())
            .with_engine(raster.clone())
            .with_engine(document.clone());

        MockRegistry {
            registry,
            transcode,
            raster,
            document,
        }
    }

    /// Write a small input file and return its path.
    pub fn write_input(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let _ = std::fs::write(&path, format!("fixture {}\n", name));
        path
    }

    /// Number of entries in a directory (0 when it does not exist).
    pub fn count_entries(dir: &Path) -> usize {
        std::fs::read_dir(dir)
            .map(|entries| entries.count())
            .unwrap_or(0)
    }
}

//! Lookup of engine adapters by kind.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

use super::config::EnginesConfig;
use super::document::DocumentEngine;
use super::error::EngineError;
use super::ffmpeg::FfmpegEngine;
use super::imagemagick::ImageMagickEngine;
use super::traits::Engine;
use crate::catalog::EngineKind;

/// Maps each [`EngineKind`] to the adapter that serves it.
///
/// A kind without an adapter makes any plan using it unrunnable.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: HashMap<EngineKind, Arc<dyn Engine>>,
}

impl EngineRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers the built-in adapters for transcode, raster and document work.
    pub fn with_defaults(config: &EnginesConfig) -> Self {
        let mut registry = Self::new();
        registry.register(Arc::new(FfmpegEngine::new(config.ffmpeg.clone())));
        registry.register(Arc::new(ImageMagickEngine::new(config.imagemagick.clone())));
        registry.register(Arc::new(DocumentEngine::new(config.document.clone())));
        registry
    }

    /// Registers an adapter under its own kind, replacing any previous one.
    pub fn register(&mut self, engine: Arc<dyn Engine>) -> Option<Arc<dyn Engine>> {
        self.engines.insert(engine.kind(), engine)
    }

    /// Builder form of [`register`](Self::register).
    pub fn with_engine(mut self, engine: Arc<dyn Engine>) -> Self {
        self.register(engine);
        self
    }

    pub fn get(&self, kind: EngineKind) -> Option<Arc<dyn Engine>> {
        self.engines.get(&kind).cloned()
    }

    pub fn contains(&self, kind: EngineKind) -> bool {
        self.engines.contains_key(&kind)
    }

    /// Registered kinds, in a stable order.
    pub fn kinds(&self) -> Vec<EngineKind> {
        let mut kinds: Vec<_> = self.engines.keys().copied().collect();
        kinds.sort_by_key(|k| k.as_str());
        kinds
    }

    /// Validates every registered adapter and returns the per-engine result.
    pub async fn validate_all(&self) -> Vec<(EngineKind, String, Result<(), EngineError>)> {
        let mut results = Vec::with_capacity(self.engines.len());
        for kind in self.kinds() {
            let Some(engine) = self.get(kind) else {
                continue;
            };
            let result = engine.validate().await;
            match &result {
                Ok(()) => info!(engine = engine.name(), kind = %kind, "Engine available"),
                Err(e) => warn!(engine = engine.name(), kind = %kind, error = %e, "Engine unavailable"),
            }
            results.push((kind, engine.name().to_string(), result));
        }
        results
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_cover_all_but_archive() {
        let registry = EngineRegistry::with_defaults(&EnginesConfig::default());
        assert!(registry.contains(EngineKind::Transcode));
        assert!(registry.contains(EngineKind::Raster));
        assert!(registry.contains(EngineKind::Document));
        assert!(!registry.contains(EngineKind::Archive));
        assert_eq!(registry.get(EngineKind::Raster).unwrap().name(), "imagemagick");
    }

    #[test]
    fn test_register_replaces() {
        let mut registry = EngineRegistry::new();
        assert!(registry
            .register(Arc::new(FfmpegEngine::with_defaults()))
            .is_none());
        assert!(registry
            .register(Arc::new(FfmpegEngine::with_defaults()))
            .is_some());
        assert_eq!(registry.kinds(), vec![EngineKind::Transcode]);
    }

    #[tokio::test]
    async fn test_validate_all_reports_missing_binaries() {
        let mut config = EnginesConfig::default();
        config.imagemagick.magick_path = "/nonexistent/bin/magick".into();
        let registry = EngineRegistry::new()
            .with_engine(Arc::new(ImageMagickEngine::new(config.imagemagick)));

        let results = registry.validate_all().await;
        assert_eq!(results.len(), 1);
        assert!(matches!(
            results[0].2,
            Err(EngineError::BinaryNotFound { .. })
        ));
    }
}

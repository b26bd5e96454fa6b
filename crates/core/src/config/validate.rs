use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - At least one queue worker
/// - Engine timeouts are not 0
/// - Progress channel capacity is not 0
/// - The effective bridge table is well formed
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.queue.workers == 0 {
        return Err(ConfigError::ValidationError(
            "queue.workers cannot be 0".to_string(),
        ));
    }

    if config.pipeline.progress_buffer == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.progress_buffer cannot be 0".to_string(),
        ));
    }

    let timeouts = [
        ("engines.ffmpeg.timeout_secs", config.engines.ffmpeg.timeout_secs),
        (
            "engines.imagemagick.timeout_secs",
            config.engines.imagemagick.timeout_secs,
        ),
        (
            "engines.document.timeout_secs",
            config.engines.document.timeout_secs,
        ),
    ];
    for (key, value) in timeouts {
        if value == 0 {
            return Err(ConfigError::ValidationError(format!("{} cannot be 0", key)));
        }
    }

    config
        .routing
        .bridge_table()
        .validate()
        .map_err(|e| ConfigError::ValidationError(format!("routing.extra_bridges: {}", e)))?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Bridge, Category};

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_workers_fails() {
        let mut config = Config::default();
        config.queue.workers = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_zero_timeout_fails() {
        let mut config = Config::default();
        config.engines.imagemagick.timeout_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("engines.imagemagick.timeout_secs"));
    }

    #[test]
    fn test_validate_foreign_bridge_fails() {
        let mut config = Config::default();
        config
            .routing
            .extra_bridges
            .push(Bridge::new(Category::Audio, Category::Image, "pdf"));
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("routing.extra_bridges"));
    }
}

use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment variable overrides, e.g. `OMNICONVERT_QUEUE__WORKERS=8`.
pub const ENV_PREFIX: &str = "OMNICONVERT_";

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.to_path_buf()));
    }

    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from defaults and environment variables only
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    Figment::new()
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[queue]
workers = 2

[engines.ffmpeg]
timeout_secs = 120
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.queue.workers, 2);
        assert_eq!(config.engines.ffmpeg.timeout_secs, 120);
        assert_eq!(config.engines.imagemagick.density, 150);
    }

    #[test]
    fn test_load_config_from_str_empty_uses_defaults() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.queue.workers, 4);
        assert_eq!(config.pipeline.progress_buffer, 64);
    }

    #[test]
    fn test_load_config_from_str_invalid() {
        let toml = r#"
[queue]
workers = "many"
"#;
        let err = load_config_from_str(toml).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn test_load_config_extra_bridges() {
        let toml = r#"
[[routing.extra_bridges]]
from = "audio"
to = "image"
format = "png"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.routing.extra_bridges.len(), 1);
        assert_eq!(config.routing.extra_bridges[0].format, "png");
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/omniconvert.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[pipeline]
temp_dir = "/var/tmp/omniconvert"

[logging]
format = "json"
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(
            config.pipeline.temp_dir,
            std::path::PathBuf::from("/var/tmp/omniconvert")
        );
        assert_eq!(config.logging.format, crate::config::LogFormat::Json);
    }

    #[test]
    fn test_env_overrides_file() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "omniconvert.toml",
                r#"
[queue]
workers = 2
"#,
            )?;
            jail.set_env("OMNICONVERT_QUEUE__WORKERS", "6");
            jail.set_env("OMNICONVERT_ENGINES__DOCUMENT__TIMEOUT_SECS", "30");

            let config = load_config(Path::new("omniconvert.toml"))
                .map_err(|e| figment::Error::from(e.to_string()))?;
            assert_eq!(config.queue.workers, 6);
            assert_eq!(config.engines.document.timeout_secs, 30);
            Ok(())
        });
    }
}

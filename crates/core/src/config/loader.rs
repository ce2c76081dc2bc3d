use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Prefix of environment variables that override file settings.
/// Nested keys use `__`, e.g. `LADDER_ENGINE__TIMEOUT_SECS=600`.
pub const ENV_PREFIX: &str = "LADDER_";

fn env_provider() -> Env {
    Env::prefixed(ENV_PREFIX).split("__")
}

/// Load configuration from file with environment variable overrides
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::FileNotFound(path.display().to_string()));
    }

    let config: Config = Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from defaults and environment variables only
pub fn load_config_from_env() -> Result<Config, ConfigError> {
    Figment::from(Serialized::defaults(Config::default()))
        .merge(env_provider())
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
    use crate::config::LogFormat;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_load_config_from_str_valid() {
        let toml = r#"
[pipeline]
segment_duration_secs = 4

[logging]
format = "json"
"#;
        let config = load_config_from_str(toml).unwrap();
        assert_eq!(config.pipeline.segment_duration_secs, 4);
        assert_eq!(config.logging.format, LogFormat::Json);
    }

    #[test]
    fn test_load_config_from_str_bad_type() {
        let toml = r#"
[pipeline]
segment_duration_secs = "ten"
"#;
        let result = load_config_from_str(toml);
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config(Path::new("/nonexistent/ladder.toml"));
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            r#"
[engine]
ffmpeg_path = "/usr/local/bin/ffmpeg"
timeout_secs = 900

[[pipeline.profiles]]
width = 640
height = 360
bitrate_kbps = 400
"#
        )
        .unwrap();

        let config = load_config(temp_file.path()).unwrap();
        assert_eq!(config.engine.timeout_secs, 900);
        assert_eq!(config.pipeline.profiles.len(), 1);
        assert_eq!(config.pipeline.profiles[0].height, 360);
        // Untouched sections keep their defaults
        assert_eq!(config.pipeline.variant_playlist_name, "playlist.m3u8");
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_env_overrides_nested_key() {
        std::env::set_var("LADDER_PIPELINE__MASTER_PLAYLIST_NAME", "index.m3u8");
        let config = load_config_from_env();
        std::env::remove_var("LADDER_PIPELINE__MASTER_PLAYLIST_NAME");

        let config = config.unwrap();
        assert_eq!(config.pipeline.master_playlist_name, "index.m3u8");
        assert_eq!(config.pipeline.segment_duration_secs, 10);
    }
}

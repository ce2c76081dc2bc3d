use serde::{Deserialize, Serialize};

use crate::engine::EngineConfig;
use crate::pipeline::PipelineConfig;

/// Root configuration
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
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

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    /// Human readable, one event per line
    #[default]
    Pretty,
    /// One JSON object per event
    Json,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_empty_config() {
        let config: Config = toml::from_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.pipeline.profiles.len(), 5);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.logging.format, LogFormat::Pretty);
    }

    #[test]
    fn test_deserialize_sections() {
        let toml = r#"
[pipeline]
segment_duration_secs = 6
max_parallel_encodes = 2

[[pipeline.profiles]]
width = 1280
height = 720
bitrate_kbps = 1000

[engine]
ffmpeg_path = "/opt/ffmpeg/bin/ffmpeg"

[logging]
level = "debug"
format = "json"
"#;
        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.pipeline.segment_duration_secs, 6);
        assert_eq!(config.pipeline.max_parallel_encodes, Some(2));
        assert_eq!(config.pipeline.profiles.len(), 1);
        assert_eq!(config.pipeline.master_playlist_name, "master.m3u8");
        assert_eq!(
            config.engine.ffmpeg_path.to_string_lossy(),
            "/opt/ffmpeg/bin/ffmpeg"
        );
        assert_eq!(config.logging.format, LogFormat::Json);
    }
}

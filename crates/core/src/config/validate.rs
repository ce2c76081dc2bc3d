use super::{types::Config, ConfigError};
use crate::profile::RenditionCatalog;

/// Validate configuration
/// Currently validates:
/// - Rendition ladder is non-empty, positive and has unique heights
/// - Segment duration is not 0
/// - Playlist and segment file names are set
/// - `max_parallel_encodes` is not 0
/// - Engine timeout is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let pipeline = &config.pipeline;

    let catalog = RenditionCatalog::new(pipeline.profiles.clone())
        .map_err(|e| ConfigError::ValidationError(format!("pipeline.profiles: {}", e)))?;
    catalog
        .check_unique_heights()
        .map_err(|e| ConfigError::ValidationError(format!("pipeline.profiles: {}", e)))?;

    if pipeline.segment_duration_secs == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.segment_duration_secs cannot be 0".to_string(),
        ));
    }

    for (key, value) in [
        ("pipeline.master_playlist_name", &pipeline.master_playlist_name),
        ("pipeline.variant_playlist_name", &pipeline.variant_playlist_name),
        ("pipeline.segment_filename_pattern", &pipeline.segment_filename_pattern),
    ] {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!("{} cannot be empty", key)));
        }
    }

    if pipeline.max_parallel_encodes == Some(0) {
        return Err(ConfigError::ValidationError(
            "pipeline.max_parallel_encodes cannot be 0".to_string(),
        ));
    }

    if config.engine.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "engine.timeout_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}

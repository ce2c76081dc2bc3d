//! Configuration for the streaming pipeline.

use serde::{Deserialize, Serialize};

use crate::engine::PlaylistType;
use crate::profile::{default_profiles, RenditionProfile};

/// Configuration for packaging one input into an HLS ladder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Renditions to produce, in master playlist order.
    #[serde(default = "default_profiles")]
    pub profiles: Vec<RenditionProfile>,

    /// Target segment duration in seconds.
    #[serde(default = "default_segment_duration")]
    pub segment_duration_secs: u32,

    /// Media playlist type.
    #[serde(default)]
    pub playlist_type: PlaylistType,

    /// File name of the master playlist under the output root.
    #[serde(default = "default_master_playlist_name")]
    pub master_playlist_name: String,

    /// File name of each media playlist inside its rendition directory.
    #[serde(default = "default_variant_playlist_name")]
    pub variant_playlist_name: String,

    /// Segment file name pattern inside each rendition directory.
    #[serde(default = "default_segment_filename_pattern")]
    pub segment_filename_pattern: String,

    /// Video encoder passed to the engine.
    #[serde(default = "default_video_codec")]
    pub video_codec: String,

    /// Audio encoder passed to the engine.
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Upper bound on concurrently running encodes. `None` runs every
    /// rendition at once.
    #[serde(default)]
    pub max_parallel_encodes: Option<usize>,

    /// Whether to probe the input for a video stream before dispatching.
    #[serde(default = "default_probe_input")]
    pub probe_input: bool,
}

fn default_segment_duration() -> u32 {
    10
}

fn default_master_playlist_name() -> String {
    "master.m3u8".to_string()
}

fn default_variant_playlist_name() -> String {
    "playlist.m3u8".to_string()
}

fn default_segment_filename_pattern() -> String {
    "segment%03d.ts".to_string()
}

fn default_video_codec() -> String {
    "libx264".to_string()
}

fn default_audio_codec() -> String {
    "aac".to_string()
}

fn default_probe_input() -> bool {
    true
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            profiles: default_profiles(),
            segment_duration_secs: default_segment_duration(),
            playlist_type: PlaylistType::default(),
            master_playlist_name: default_master_playlist_name(),
            variant_playlist_name: default_variant_playlist_name(),
            segment_filename_pattern: default_segment_filename_pattern(),
            video_codec: default_video_codec(),
            audio_codec: default_audio_codec(),
            max_parallel_encodes: None,
            probe_input: default_probe_input(),
        }
    }
}

impl PipelineConfig {
    /// Replaces the rendition ladder.
    pub fn with_profiles(mut self, profiles: Vec<RenditionProfile>) -> Self {
        self.profiles = profiles;
        self
    }

    /// Caps the number of concurrently running encodes.
    pub fn with_max_parallel(mut self, max: usize) -> Self {
        self.max_parallel_encodes = Some(max);
        self
    }

    /// Enables or disables the input probe.
    pub fn with_probe(mut self, enabled: bool) -> Self {
        self.probe_input = enabled;
        self
    }
}

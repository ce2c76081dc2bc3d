//! Types for the encoding engine.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// HLS playlist type written into each media playlist.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaylistType {
    /// Video on demand: the playlist is complete and never changes.
    #[default]
    Vod,
    /// Event: segments are only ever appended.
    Event,
}

impl PlaylistType {
    /// Value passed to `-hls_playlist_type`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Vod => "vod",
            Self::Event => "event",
        }
    }
}

/// Everything the engine needs to produce one segmented rendition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeRequest {
    /// Unique job identifier (`{batch_id}-{rendition}`).
    pub job_id: String,
    /// Source video.
    pub input_path: PathBuf,
    /// Directory the rendition writes into. Already exists.
    pub output_dir: PathBuf,
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Target video bitrate in kbps.
    pub video_bitrate_kbps: u32,
    /// Video encoder name, e.g. `libx264`.
    pub video_codec: String,
    /// Audio encoder name, e.g. `aac`.
    pub audio_codec: String,
    /// Target segment duration in seconds.
    pub segment_duration_secs: u32,
    /// Media playlist type.
    pub playlist_type: PlaylistType,
    /// Segment filename pattern, absolute, e.g. `/out/720p/segment%03d.ts`.
    pub segment_pattern: PathBuf,
    /// Media playlist to write, e.g. `/out/720p/playlist.m3u8`.
    pub playlist_path: PathBuf,
}

/// Result of a successful encode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncodeOutcome {
    /// Job identifier.
    pub job_id: String,
    /// Media playlist that was written.
    pub playlist_path: PathBuf,
    /// Number of media segments found next to the playlist.
    pub segment_count: usize,
    /// Wall time of the encode in milliseconds.
    pub duration_ms: u64,
}

/// Progress update during an encode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncodeProgress {
    /// Job identifier.
    pub job_id: String,
    /// Progress percentage (0-100).
    pub percent: f32,
    /// Current position in seconds.
    pub time_secs: f64,
    /// Total duration in seconds (if known).
    pub duration_secs: Option<f64>,
    /// Encoding speed (e.g., "2.5x").
    pub speed: Option<String>,
}

/// Information about a media file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaInfo {
    /// File path.
    pub path: PathBuf,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Duration in seconds.
    pub duration_secs: f64,
    /// Container format name.
    pub format: String,
    /// Video codec (if any).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_codec: Option<String>,
    /// Video width.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_width: Option<u32>,
    /// Video height.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_height: Option<u32>,
    /// Video frame rate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_fps: Option<f32>,
    /// Audio codec (if any).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_codec: Option<String>,
}

impl MediaInfo {
    /// Whether the file carries a video stream.
    pub fn has_video(&self) -> bool {
        self.video_codec.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_playlist_type_values() {
        assert_eq!(PlaylistType::default(), PlaylistType::Vod);
        assert_eq!(PlaylistType::Vod.as_str(), "vod");
        assert_eq!(PlaylistType::Event.as_str(), "event");

        let parsed: PlaylistType = serde_json::from_str("\"event\"").unwrap();
        assert_eq!(parsed, PlaylistType::Event);
    }

    #[test]
    fn test_media_info_has_video() {
        let info = MediaInfo {
            path: PathBuf::from("/in/song.flac"),
            size_bytes: 1024,
            duration_secs: 180.0,
            format: "flac".to_string(),
            video_codec: None,
            video_width: None,
            video_height: None,
            video_fps: None,
            audio_codec: Some("flac".to_string()),
        };
        assert!(!info.has_video());

        let json = serde_json::to_string(&info).unwrap();
        assert!(!json.contains("video_codec"));
    }
}

//! Types for the pipeline module.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::aggregator::RenditionSuccess;

/// A packaged input, ready to be served.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingPackage {
    /// Identifier of the batch that produced the package.
    pub batch_id: String,
    /// Master playlist clients should load.
    pub manifest_path: PathBuf,
    /// Renditions in master playlist order.
    pub renditions: Vec<RenditionOutput>,
    /// Wall time from dispatch to manifest in milliseconds.
    pub duration_ms: u64,
}

/// One rendition of a package.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RenditionOutput {
    /// Rendition name, e.g. `720p`.
    pub name: String,
    pub width: u32,
    pub height: u32,
    /// Advertised bandwidth in bits per second.
    pub bandwidth_bps: u64,
    /// Media playlist of this rendition.
    pub playlist_path: PathBuf,
    /// Number of segments written.
    pub segment_count: usize,
    /// Time the encode took, including any wait for a slot.
    pub encode_duration_ms: u64,
}

impl From<&RenditionSuccess> for RenditionOutput {
    fn from(success: &RenditionSuccess) -> Self {
        Self {
            name: success.profile.name(),
            width: success.profile.width,
            height: success.profile.height,
            bandwidth_bps: success.profile.bandwidth_bps(),
            playlist_path: success.outcome.playlist_path.clone(),
            segment_count: success.outcome.segment_count,
            encode_duration_ms: success.elapsed.as_millis() as u64,
        }
    }
}

/// Progress update for a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PipelineProgress {
    /// Every job has been started.
    Dispatched {
        batch_id: String,
        renditions: Vec<String>,
    },
    /// A rendition reported encode progress.
    Encoding {
        batch_id: String,
        rendition: String,
        percent: f32,
    },
    /// A rendition finished successfully.
    RenditionCompleted {
        batch_id: String,
        rendition: String,
        completed: usize,
        total: usize,
    },
    /// A rendition failed.
    RenditionFailed {
        batch_id: String,
        rendition: String,
        error: String,
    },
    /// The master playlist was written.
    Completed {
        batch_id: String,
        manifest_path: PathBuf,
    },
    /// The batch failed.
    Failed { batch_id: String, error: String },
}

impl PipelineProgress {
    /// Whether this is the last event of a batch.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed { .. } | Self::Failed { .. })
    }
}

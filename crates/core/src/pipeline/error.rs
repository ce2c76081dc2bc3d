//! Error types for the pipeline façade.

use std::path::PathBuf;
use thiserror::Error;

use crate::aggregator::IncompleteBatch;
use crate::dispatcher::DispatchError;
use crate::engine::EngineError;
use crate::manifest::ManifestError;
use crate::profile::ProfileError;

/// Error returned by [`super::StreamingPipeline`].
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The rendition catalog is unusable.
    #[error("Invalid rendition catalog: {0}")]
    Configuration(#[from] ProfileError),

    /// The batch was rejected before any encode started.
    #[error(transparent)]
    Precondition(#[from] DispatchError),

    /// The engine could not inspect the input.
    #[error("Failed to probe input: {0}")]
    Probe(#[source] EngineError),

    /// The input has no video stream to package.
    #[error("Input has no video stream: {path}")]
    NoVideoStream { path: PathBuf },

    /// A rendition failed. The first failure recorded for the batch.
    #[error("Rendition {rendition} failed: {source}")]
    RenditionFailed {
        rendition: String,
        #[source]
        source: EngineError,
    },

    /// Every rendition succeeded but the master playlist could not be written.
    #[error(transparent)]
    Manifest(#[from] ManifestError),

    /// A job exited without reporting.
    #[error(transparent)]
    Incomplete(#[from] IncompleteBatch),
}

impl PipelineError {
    /// Whether the batch was rejected before any encode job was started.
    pub fn is_precondition(&self) -> bool {
        matches!(
            self,
            Self::Configuration(_) | Self::Precondition(_) | Self::Probe(_) | Self::NoVideoStream { .. }
        )
    }

    /// Label used for the batch outcome metric.
    pub(crate) fn metric_label(&self) -> &'static str {
        match self {
            Self::RenditionFailed { .. } => "rendition_failed",
            e if e.is_precondition() => "rejected",
            _ => "error",
        }
    }
}

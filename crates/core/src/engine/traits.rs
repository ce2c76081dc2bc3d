//! Trait definitions for the encoding engine.

use async_trait::async_trait;
use std::path::Path;
use tokio::sync::mpsc;

use super::error::EngineError;
use super::types::{EncodeOutcome, EncodeProgress, EncodeRequest, MediaInfo};

/// An engine that turns one input and one rendition request into a
/// segmented HLS output.
///
/// Each call to [`EncodingEngine::encode`] resolves exactly once, either with
/// the outcome or with the error that stopped it.
#[async_trait]
pub trait EncodingEngine: Send + Sync {
    /// Returns the name of this engine implementation.
    fn name(&self) -> &str;

    /// Probes a media file to get its information.
    async fn probe(&self, path: &Path) -> Result<MediaInfo, EngineError>;

    /// Encodes one rendition.
    async fn encode(&self, request: EncodeRequest) -> Result<EncodeOutcome, EngineError>;

    /// Encodes one rendition with progress reporting.
    ///
    /// If the receiver is dropped, encoding continues without progress reporting.
    async fn encode_with_progress(
        &self,
        request: EncodeRequest,
        progress_tx: mpsc::Sender<EncodeProgress>,
    ) -> Result<EncodeOutcome, EngineError>;

    /// Validates that the engine is properly configured and ready.
    async fn validate(&self) -> Result<(), EngineError>;
}

//! Error types for the encoding engine.

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while probing or encoding.
#[derive(Debug, Error)]
pub enum EngineError {
    /// FFmpeg binary not found.
    #[error("FFmpeg not found at path: {path}")]
    FfmpegNotFound { path: PathBuf },

    /// FFprobe binary not found.
    #[error("FFprobe not found at path: {path}")]
    FfprobeNotFound { path: PathBuf },

    /// Input file not found.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Rendition output directory is missing.
    #[error("Output directory does not exist: {path}")]
    OutputDirectoryMissing { path: PathBuf },

    /// Encoder process failed.
    #[error("Encode failed: {reason}")]
    EncodeFailed {
        reason: String,
        stderr: Option<String>,
    },

    /// Encoder process did not finish in time.
    #[error("Encode timed out after {timeout_secs} seconds")]
    Timeout { timeout_secs: u64 },

    /// The encoder exited cleanly but left no media playlist behind.
    #[error("Media playlist was not written: {path}")]
    PlaylistMissing { path: PathBuf },

    /// Failed to probe the input.
    #[error("Failed to probe media file: {reason}")]
    ProbeFailed { reason: String },

    /// The request cannot be encoded as given.
    #[error("Invalid encode request: {reason}")]
    InvalidRequest { reason: String },

    /// I/O error while talking to the encoder.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse FFprobe output.
    #[error("Failed to parse media info: {reason}")]
    ParseError { reason: String },
}

impl EngineError {
    /// Creates an encode failed error with optional stderr output.
    pub fn encode_failed(reason: impl Into<String>, stderr: Option<String>) -> Self {
        Self::EncodeFailed {
            reason: reason.into(),
            stderr,
        }
    }

    /// Creates a probe failed error.
    pub fn probe_failed(reason: impl Into<String>) -> Self {
        Self::ProbeFailed {
            reason: reason.into(),
        }
    }

    /// Creates an invalid request error.
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self::InvalidRequest {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = EngineError::encode_failed("FFmpeg exited with code: Some(1)", None);
        assert_eq!(err.to_string(), "Encode failed: FFmpeg exited with code: Some(1)");

        let err = EngineError::Timeout { timeout_secs: 30 };
        assert_eq!(err.to_string(), "Encode timed out after 30 seconds");
    }

    #[test]
    fn test_invalid_request_display() {
        let err = EngineError::invalid_request("width 853 is odd");
        assert_eq!(err.to_string(), "Invalid encode request: width 853 is odd");
    }
}

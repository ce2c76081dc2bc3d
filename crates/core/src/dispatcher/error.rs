//! Error types for the dispatcher module.

use std::path::PathBuf;
use thiserror::Error;

use crate::profile::ProfileError;

/// Errors raised before any encode job is started.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Input file does not exist.
    #[error("Input file not found: {path}")]
    InputNotFound { path: PathBuf },

    /// Input exists but is a directory or special file.
    #[error("Input is not a regular file: {path}")]
    InputNotAFile { path: PathBuf },

    /// Input exists but cannot be opened.
    #[error("Input file is not readable: {path}")]
    InputNotReadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Output root or a rendition directory could not be created.
    #[error("Failed to create output directory: {path}")]
    OutputDirectoryFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The rendition catalog cannot be dispatched as configured.
    #[error("Invalid rendition configuration: {0}")]
    Configuration(#[from] ProfileError),
}

impl DispatchError {
    /// Whether the error is caused by the configured catalog rather than the input.
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Configuration(_))
    }
}

//! Master playlist assembly.
//!
//! Runs once per batch, after every rendition has succeeded. Entries follow
//! the order of the successes handed in, which the aggregator guarantees is
//! catalog order.

use m3u8_rs::{MasterPlaylist, Resolution, VariantStream};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

use crate::aggregator::RenditionSuccess;

/// HLS version advertised in the master playlist.
const PLAYLIST_VERSION: usize = 3;

/// Errors raised while writing the master playlist.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// A manifest with no variants would be unplayable.
    #[error("Refusing to write a master playlist without variants")]
    NoVariants,

    /// Serializing the playlist failed.
    #[error("Failed to render master playlist: {0}")]
    Render(#[source] std::io::Error),

    /// Writing or renaming the playlist file failed.
    #[error("Failed to write master playlist {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// One `#EXT-X-STREAM-INF` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestEntry {
    /// Advertised bandwidth in bits per second.
    pub bandwidth_bps: u64,
    pub width: u32,
    pub height: u32,
    /// Media playlist path relative to the master playlist.
    pub uri: String,
}

impl From<&RenditionSuccess> for ManifestEntry {
    fn from(success: &RenditionSuccess) -> Self {
        Self {
            bandwidth_bps: success.profile.bandwidth_bps(),
            width: success.profile.width,
            height: success.profile.height,
            uri: success.variant_uri.clone(),
        }
    }
}

/// A written master playlist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub path: PathBuf,
    pub entries: Vec<ManifestEntry>,
}

/// Renders entries as an HLS master playlist.
pub fn render(entries: &[ManifestEntry]) -> Result<Vec<u8>, ManifestError> {
    let playlist = MasterPlaylist {
        version: Some(PLAYLIST_VERSION),
        variants: entries
            .iter()
            .map(|entry| VariantStream {
                uri: entry.uri.clone(),
                bandwidth: entry.bandwidth_bps,
                resolution: Some(Resolution {
                    width: u64::from(entry.width),
                    height: u64::from(entry.height),
                }),
                ..Default::default()
            })
            .collect(),
        ..Default::default()
    };

    let mut buf = Vec::new();
    playlist.write_to(&mut buf).map_err(ManifestError::Render)?;
    Ok(buf)
}

/// Writes master playlists under a batch's output root.
#[derive(Debug, Clone)]
pub struct ManifestAssembler {
    file_name: String,
}

impl ManifestAssembler {
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
        }
    }

    /// Path the master playlist is written to.
    pub fn manifest_path(&self, output_root: &Path) -> PathBuf {
        output_root.join(&self.file_name)
    }

    /// Builds and persists the master playlist.
    ///
    /// The content goes to a temporary sibling first and is renamed into
    /// place, so readers never observe a half-written playlist.
    pub async fn assemble(
        &self,
        output_root: &Path,
        successes: &[RenditionSuccess],
    ) -> Result<Manifest, ManifestError> {
        if successes.is_empty() {
            return Err(ManifestError::NoVariants);
        }

        let entries: Vec<ManifestEntry> = successes.iter().map(ManifestEntry::from).collect();
        let content = render(&entries)?;

        let path = self.manifest_path(output_root);
        let tmp_path = output_root.join(format!(".{}.tmp", self.file_name));

        tokio::fs::write(&tmp_path, &content)
            .await
            .map_err(|source| ManifestError::Write {
                path: tmp_path.clone(),
                source,
            })?;

        if let Err(source) = tokio::fs::rename(&tmp_path, &path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(ManifestError::Write { path, source });
        }

        info!(
            path = %path.display(),
            variants = entries.len(),
            "Wrote master playlist"
        );

        Ok(Manifest { path, entries })
    }

    /// Removes the master playlist under `output_root`, if any.
    ///
    /// Returns whether a file was removed.
    pub async fn discard(&self, output_root: &Path) -> Result<bool, ManifestError> {
        let path = self.manifest_path(output_root);
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(source) => Err(ManifestError::Write { path, source }),
        }
    }
}

impl Default for ManifestAssembler {
    fn default() -> Self {
        Self::new("master.m3u8")
    }
}

//! Types for the dispatcher module.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::{JoinError, JoinHandle};

use crate::engine::{EncodeOutcome, EncodeRequest, EngineError};
use crate::profile::RenditionProfile;

use super::error::DispatchError;

/// A source file that has been checked to exist and be readable.
///
/// Only [`InputFile::open`] creates one, so holding an `InputFile` means the
/// precondition on the input has already been enforced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InputFile {
    path: PathBuf,
    size_bytes: u64,
}

impl InputFile {
    /// Checks that `path` is an existing, readable regular file.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, DispatchError> {
        let path = path.as_ref();

        let metadata = match tokio::fs::metadata(path).await {
            Ok(metadata) => metadata,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DispatchError::InputNotFound {
                    path: path.to_path_buf(),
                });
            }
            Err(source) => {
                return Err(DispatchError::InputNotReadable {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };

        if !metadata.is_file() {
            return Err(DispatchError::InputNotAFile {
                path: path.to_path_buf(),
            });
        }

        tokio::fs::File::open(path)
            .await
            .map_err(|source| DispatchError::InputNotReadable {
                path: path.to_path_buf(),
                source,
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            size_bytes: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn size_bytes(&self) -> u64 {
        self.size_bytes
    }
}

/// One rendition encode that has been prepared but not yet resolved.
///
/// A job is pending until [`EncodeJob::finish`] consumes it, so each job can
/// produce at most one [`JobCompletion`].
#[derive(Debug, Clone)]
pub struct EncodeJob {
    /// Position of the profile in the catalog.
    pub index: usize,
    /// Rendition being produced.
    pub profile: RenditionProfile,
    /// Media playlist path relative to the output root, `/`-separated.
    pub variant_uri: String,
    /// Request handed to the engine.
    pub request: EncodeRequest,
}

impl EncodeJob {
    /// Resolves the job with the engine's result.
    pub fn finish(
        self,
        result: Result<EncodeOutcome, EngineError>,
        elapsed: Duration,
    ) -> JobCompletion {
        let outcome = match result {
            Ok(outcome) => JobOutcome::Succeeded(outcome),
            Err(error) => JobOutcome::Failed(error),
        };

        JobCompletion {
            index: self.index,
            job_id: self.request.job_id,
            profile: self.profile,
            variant_uri: self.variant_uri,
            outcome,
            elapsed,
        }
    }
}

/// Terminal state of a job.
#[derive(Debug)]
pub enum JobOutcome {
    Succeeded(EncodeOutcome),
    Failed(EngineError),
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded(_))
    }
}

/// Completion event sent from a job task to the aggregator.
#[derive(Debug)]
pub struct JobCompletion {
    /// Position of the profile in the catalog.
    pub index: usize,
    /// Job identifier.
    pub job_id: String,
    /// Rendition that was encoded.
    pub profile: RenditionProfile,
    /// Media playlist path relative to the output root.
    pub variant_uri: String,
    /// Success or failure.
    pub outcome: JobOutcome,
    /// Time from dispatch to completion, including any wait for a permit.
    pub elapsed: Duration,
}

/// Handle to a dispatched job.
#[derive(Debug)]
pub struct JobHandle {
    /// Position of the profile in the catalog.
    pub index: usize,
    /// Job identifier.
    pub job_id: String,
    /// Rendition being produced.
    pub profile: RenditionProfile,
    /// Rendition directory.
    pub output_dir: PathBuf,
    /// Media playlist the engine will write.
    pub playlist_path: PathBuf,
    pub(crate) task: JoinHandle<()>,
}

impl JobHandle {
    /// Whether the job task has exited.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Waits for the job task to exit.
    pub async fn wait(self) -> Result<(), JoinError> {
        self.task.await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PlaylistType;
    use tempfile::TempDir;

    fn job() -> EncodeJob {
        EncodeJob {
            index: 2,
            profile: RenditionProfile::new(854, 480, 500),
            variant_uri: "480p/playlist.m3u8".to_string(),
            request: EncodeRequest {
                job_id: "b-480p".to_string(),
                input_path: PathBuf::from("/in.mp4"),
                output_dir: PathBuf::from("/out/480p"),
                width: 854,
                height: 480,
                video_bitrate_kbps: 500,
                video_codec: "libx264".to_string(),
                audio_codec: "aac".to_string(),
                segment_duration_secs: 10,
                playlist_type: PlaylistType::Vod,
                segment_pattern: PathBuf::from("/out/480p/segment%03d.ts"),
                playlist_path: PathBuf::from("/out/480p/playlist.m3u8"),
            },
        }
    }

    #[test]
    fn test_finish_carries_job_identity() {
        let completion = job().finish(
            Err(EngineError::encode_failed("disk full", None)),
            Duration::from_millis(5),
        );
        assert_eq!(completion.index, 2);
        assert_eq!(completion.job_id, "b-480p");
        assert_eq!(completion.variant_uri, "480p/playlist.m3u8");
        assert!(!completion.outcome.is_success());
    }

    #[tokio::test]
    async fn test_input_file_open() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("upload.mp4");
        tokio::fs::write(&path, b"not really a video").await.unwrap();

        let input = InputFile::open(&path).await.unwrap();
        assert_eq!(input.path(), path.as_path());
        assert_eq!(input.size_bytes(), 18);
    }

    #[tokio::test]
    async fn test_input_file_missing() {
        let dir = TempDir::new().unwrap();
        let result = InputFile::open(dir.path().join("nope.mp4")).await;
        assert!(matches!(result, Err(DispatchError::InputNotFound { .. })));
    }

    #[tokio::test]
    async fn test_input_file_directory() {
        let dir = TempDir::new().unwrap();
        let result = InputFile::open(dir.path()).await;
        assert!(matches!(result, Err(DispatchError::InputNotAFile { .. })));
    }
}

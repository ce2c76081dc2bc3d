//! Fan-out of one input into per-rendition encode jobs.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tracing::{debug, info, warn};

use crate::engine::{EncodeProgress, EncodeRequest, EncodingEngine};
use crate::pipeline::PipelineConfig;
use crate::profile::{RenditionCatalog, RenditionProfile};

use super::error::DispatchError;
use super::types::{EncodeJob, InputFile, JobCompletion, JobHandle};

/// Launches one engine invocation per rendition profile.
pub struct Dispatcher<E: EncodingEngine> {
    engine: Arc<E>,
    config: PipelineConfig,
    permits: Option<Arc<Semaphore>>,
}

impl<E: EncodingEngine + 'static> Dispatcher<E> {
    /// Creates a dispatcher. When `max_parallel_encodes` is set, the limit is
    /// shared by every batch dispatched through this instance.
    pub fn new(engine: Arc<E>, config: PipelineConfig) -> Self {
        let permits = config
            .max_parallel_encodes
            .map(|max| Arc::new(Semaphore::new(max.max(1))));

        Self {
            engine,
            config,
            permits,
        }
    }

    /// Directory a rendition writes into.
    pub fn rendition_dir(output_root: &Path, profile: &RenditionProfile) -> PathBuf {
        output_root.join(profile.name())
    }

    /// Media playlist path relative to the output root, as written in the
    /// master playlist.
    pub fn variant_uri(&self, profile: &RenditionProfile) -> String {
        format!("{}/{}", profile.name(), self.config.variant_playlist_name)
    }

    fn build_job(
        &self,
        batch_id: &str,
        index: usize,
        profile: RenditionProfile,
        input: &InputFile,
        output_root: &Path,
    ) -> EncodeJob {
        let output_dir = Self::rendition_dir(output_root, &profile);

        EncodeJob {
            index,
            profile,
            variant_uri: self.variant_uri(&profile),
            request: EncodeRequest {
                job_id: format!("{}-{}", batch_id, profile.name()),
                input_path: input.path().to_path_buf(),
                width: profile.width,
                height: profile.height,
                video_bitrate_kbps: profile.bitrate_kbps,
                video_codec: self.config.video_codec.clone(),
                audio_codec: self.config.audio_codec.clone(),
                segment_duration_secs: self.config.segment_duration_secs,
                playlist_type: self.config.playlist_type,
                segment_pattern: output_dir.join(&self.config.segment_filename_pattern),
                playlist_path: output_dir.join(&self.config.variant_playlist_name),
                output_dir,
            },
        }
    }

    /// Prepares the output tree and starts one job per profile.
    ///
    /// Returns as soon as every job has been spawned. Each job sends exactly
    /// one [`JobCompletion`] on `completions` when the engine resolves. No job
    /// is started if the catalog has a height collision or a directory cannot
    /// be created. Directories of jobs that later fail are left in place.
    pub async fn dispatch(
        &self,
        batch_id: &str,
        input: &InputFile,
        output_root: &Path,
        catalog: &RenditionCatalog,
        completions: mpsc::Sender<JobCompletion>,
        progress_tx: Option<mpsc::Sender<EncodeProgress>>,
    ) -> Result<Vec<JobHandle>, DispatchError> {
        catalog.check_unique_heights()?;

        create_dir(output_root).await?;

        let jobs: Vec<EncodeJob> = catalog
            .list()
            .iter()
            .enumerate()
            .map(|(index, profile)| self.build_job(batch_id, index, *profile, input, output_root))
            .collect();

        for job in &jobs {
            create_dir(&job.request.output_dir).await?;
        }

        let mut handles = Vec::with_capacity(jobs.len());
        for job in jobs {
            debug!(
                job_id = %job.request.job_id,
                rendition = %job.profile,
                "Dispatching encode job"
            );

            let handle = JobHandle {
                index: job.index,
                job_id: job.request.job_id.clone(),
                profile: job.profile,
                output_dir: job.request.output_dir.clone(),
                playlist_path: job.request.playlist_path.clone(),
                task: self.spawn_job(job, completions.clone(), progress_tx.clone()),
            };
            handles.push(handle);
        }

        info!(
            batch_id,
            jobs = handles.len(),
            output_root = %output_root.display(),
            "Dispatched rendition jobs"
        );

        Ok(handles)
    }

    fn spawn_job(
        &self,
        job: EncodeJob,
        completions: mpsc::Sender<JobCompletion>,
        progress_tx: Option<mpsc::Sender<EncodeProgress>>,
    ) -> tokio::task::JoinHandle<()> {
        let engine = Arc::clone(&self.engine);
        let permits = self.permits.clone();

        tokio::spawn(async move {
            let started = Instant::now();

            let _permit = match permits {
                Some(semaphore) => semaphore.acquire_owned().await.ok(),
                None => None,
            };

            let request = job.request.clone();
            let result = match progress_tx {
                Some(tx) => engine.encode_with_progress(request, tx).await,
                None => engine.encode(request).await,
            };

            let completion = job.finish(result, started.elapsed());
            if completions.send(completion).await.is_err() {
                warn!("Completion receiver dropped before job reported");
            }
        })
    }
}

async fn create_dir(path: &Path) -> Result<(), DispatchError> {
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|source| DispatchError::OutputDirectoryFailed {
            path: path.to_path_buf(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatcher::JobOutcome;
    use crate::testing::MockEngine;
    use std::time::Duration;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        input: InputFile,
    }

    impl Fixture {
        async fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let input_path = dir.path().join("upload.mp4");
            tokio::fs::write(&input_path, b"video").await.unwrap();
            let input = InputFile::open(&input_path).await.unwrap();
            Self { dir, input }
        }

        fn root(&self) -> PathBuf {
            self.dir.path().join("out")
        }
    }

    #[tokio::test]
    async fn test_dispatch_creates_directories_and_requests() {
        let fixture = Fixture::new().await;
        let engine = MockEngine::new();
        let dispatcher = Dispatcher::new(Arc::new(engine.clone()), PipelineConfig::default());
        let (tx, mut rx) = mpsc::channel(8);

        let handles = dispatcher
            .dispatch(
                "b1",
                &fixture.input,
                &fixture.root(),
                &RenditionCatalog::default(),
                tx,
                None,
            )
            .await
            .unwrap();

        assert_eq!(handles.len(), 5);
        for name in ["1080p", "720p", "480p", "360p", "144p"] {
            assert!(fixture.root().join(name).is_dir(), "{} missing", name);
        }

        let mut received = 0;
        while let Some(completion) = rx.recv().await {
            assert!(completion.outcome.is_success());
            received += 1;
        }
        assert_eq!(received, 5);

        let requests = engine.recorded_requests().await;
        let req_720 = requests.iter().find(|r| r.height == 720).unwrap();
        assert_eq!(req_720.job_id, "b1-720p");
        assert_eq!(req_720.width, 1280);
        assert_eq!(req_720.video_bitrate_kbps, 1000);
        assert_eq!(req_720.segment_duration_secs, 10);
        assert_eq!(req_720.segment_pattern, fixture.root().join("720p/segment%03d.ts"));
        assert_eq!(req_720.playlist_path, fixture.root().join("720p/playlist.m3u8"));
    }

    #[tokio::test]
    async fn test_dispatch_rejects_height_collision() {
        let fixture = Fixture::new().await;
        let engine = MockEngine::new();
        let dispatcher = Dispatcher::new(Arc::new(engine.clone()), PipelineConfig::default());
        let catalog = RenditionCatalog::new(vec![
            RenditionProfile::new(1280, 720, 1000),
            RenditionProfile::new(960, 720, 700),
        ])
        .unwrap();
        let (tx, _rx) = mpsc::channel(8);

        let result = dispatcher
            .dispatch("b1", &fixture.input, &fixture.root(), &catalog, tx, None)
            .await;

        assert!(matches!(result, Err(ref e) if e.is_configuration()));
        assert!(!fixture.root().exists());
        assert_eq!(engine.request_count().await, 0);
    }

    #[tokio::test]
    async fn test_dispatch_does_not_wait_for_jobs() {
        let fixture = Fixture::new().await;
        let engine = MockEngine::new();
        engine.set_default_delay(Duration::from_millis(200)).await;
        let dispatcher = Dispatcher::new(Arc::new(engine), PipelineConfig::default());
        let (tx, mut rx) = mpsc::channel(8);

        let handles = dispatcher
            .dispatch(
                "b1",
                &fixture.input,
                &fixture.root(),
                &RenditionCatalog::default(),
                tx,
                None,
            )
            .await
            .unwrap();

        assert!(handles.iter().all(|h| !h.is_finished()));
        assert!(rx.try_recv().is_err());

        for handle in handles {
            handle.wait().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_failed_job_reports_without_stopping_siblings() {
        let fixture = Fixture::new().await;
        let engine = MockEngine::new();
        engine.fail_rendition(480, "encoder crashed").await;
        let dispatcher = Dispatcher::new(Arc::new(engine), PipelineConfig::default());
        let (tx, mut rx) = mpsc::channel(8);

        dispatcher
            .dispatch(
                "b1",
                &fixture.input,
                &fixture.root(),
                &RenditionCatalog::default(),
                tx,
                None,
            )
            .await
            .unwrap();

        let mut failures = Vec::new();
        let mut successes = 0;
        while let Some(completion) = rx.recv().await {
            match completion.outcome {
                JobOutcome::Succeeded(_) => successes += 1,
                JobOutcome::Failed(_) => failures.push(completion.index),
            }
        }
        assert_eq!(successes, 4);
        assert_eq!(failures, vec![2]);
    }

    #[tokio::test]
    async fn test_max_parallel_limits_concurrency() {
        let fixture = Fixture::new().await;
        let engine = MockEngine::new();
        engine.set_default_delay(Duration::from_millis(20)).await;
        let dispatcher = Dispatcher::new(
            Arc::new(engine.clone()),
            PipelineConfig::default().with_max_parallel(2),
        );
        let (tx, mut rx) = mpsc::channel(8);

        dispatcher
            .dispatch(
                "b1",
                &fixture.input,
                &fixture.root(),
                &RenditionCatalog::default(),
                tx,
                None,
            )
            .await
            .unwrap();

        while rx.recv().await.is_some() {}
        assert!(engine.peak_concurrency().await <= 2);
        assert_eq!(engine.request_count().await, 5);
    }
}

//! Streaming pipeline implementation.

use futures::future::join_all;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::aggregator::{Aggregator, BatchVerdict};
use crate::dispatcher::{Dispatcher, InputFile, JobCompletion, JobHandle, JobOutcome};
use crate::engine::{EncodeProgress, EncodingEngine};
use crate::manifest::ManifestAssembler;
use crate::metrics;
use crate::profile::RenditionCatalog;

use super::config::PipelineConfig;
use super::error::PipelineError;
use super::types::{PipelineProgress, RenditionOutput, StreamingPackage};

/// Buffer for raw engine progress before it is relabelled per rendition.
const ENCODE_PROGRESS_BUFFER: usize = 64;

/// Packages one input into a multi-rendition HLS tree per call.
///
/// Every call is an independent batch with its own id, completion channel
/// and aggregator. Calls may run concurrently as long as they use different
/// output roots.
pub struct StreamingPipeline<E: EncodingEngine> {
    engine: Arc<E>,
    catalog: RenditionCatalog,
    dispatcher: Dispatcher<E>,
    assembler: ManifestAssembler,
    probe_input: bool,
}

impl<E: EncodingEngine + 'static> StreamingPipeline<E> {
    /// Creates a pipeline. Fails if the configured ladder is empty or has a
    /// zero dimension or bitrate.
    pub fn new(config: PipelineConfig, engine: Arc<E>) -> Result<Self, PipelineError> {
        let catalog = RenditionCatalog::new(config.profiles.clone())?;
        let assembler = ManifestAssembler::new(config.master_playlist_name.clone());
        let probe_input = config.probe_input;

        Ok(Self {
            dispatcher: Dispatcher::new(Arc::clone(&engine), config),
            engine,
            catalog,
            assembler,
            probe_input,
        })
    }

    /// Renditions produced for every input.
    pub fn catalog(&self) -> &RenditionCatalog {
        &self.catalog
    }

    /// Packages `input` under `output_root`.
    ///
    /// Resolves once every rendition has reported. Returns the package only if
    /// all of them succeeded and the master playlist was written; otherwise
    /// returns the first recorded failure and writes no master playlist.
    pub async fn process_for_streaming(
        &self,
        input: impl AsRef<Path>,
        output_root: impl AsRef<Path>,
    ) -> Result<StreamingPackage, PipelineError> {
        self.run_batch(input.as_ref(), output_root.as_ref(), None)
            .await
    }

    /// Like [`Self::process_for_streaming`], also reporting progress.
    ///
    /// The final event is always [`PipelineProgress::Completed`] or
    /// [`PipelineProgress::Failed`]. Its slot is reserved when the call starts,
    /// so the batch resolves even if nobody reads until afterwards. Other
    /// events are dropped rather than stalling the batch when the receiver
    /// falls behind.
    pub async fn process_with_progress(
        &self,
        input: impl AsRef<Path>,
        output_root: impl AsRef<Path>,
        progress: mpsc::Sender<PipelineProgress>,
    ) -> Result<StreamingPackage, PipelineError> {
        self.run_batch(input.as_ref(), output_root.as_ref(), Some(progress))
            .await
    }

    async fn run_batch(
        &self,
        input: &Path,
        output_root: &Path,
        progress: Option<mpsc::Sender<PipelineProgress>>,
    ) -> Result<StreamingPackage, PipelineError> {
        let batch_id = Uuid::new_v4().to_string();
        let span = info_span!("batch", batch_id = %batch_id);
        let started = Instant::now();

        // Holding a slot up front means the final event never waits on the receiver
        let terminal_slot = progress.as_ref().and_then(|tx| tx.try_reserve().ok());

        let result = self
            .execute(&batch_id, input, output_root, progress.as_ref())
            .instrument(span)
            .await;

        let label = match &result {
            Ok(_) => "success",
            Err(e) => e.metric_label(),
        };
        metrics::BATCHES_TOTAL.with_label_values(&[label]).inc();
        metrics::BATCH_DURATION
            .with_label_values(&[label])
            .observe(started.elapsed().as_secs_f64());

        if let Some(tx) = &progress {
            let event = match &result {
                Ok(package) => PipelineProgress::Completed {
                    batch_id: batch_id.clone(),
                    manifest_path: package.manifest_path.clone(),
                },
                Err(e) => PipelineProgress::Failed {
                    batch_id: batch_id.clone(),
                    error: e.to_string(),
                },
            };
            let delivered = match terminal_slot {
                Some(permit) => {
                    permit.send(event);
                    true
                }
                None => tx.try_send(event).is_ok(),
            };
            if !delivered {
                warn!(batch_id = %batch_id, "Progress receiver full or closed, final event dropped");
            }
        }

        result
    }

    async fn execute(
        &self,
        batch_id: &str,
        input: &Path,
        output_root: &Path,
        progress: Option<&mpsc::Sender<PipelineProgress>>,
    ) -> Result<StreamingPackage, PipelineError> {
        let input = InputFile::open(input).await?;

        info!(
            input = %input.path().display(),
            size_bytes = input.size_bytes(),
            output_root = %output_root.display(),
            renditions = self.catalog.len(),
            "Starting batch"
        );

        if self.probe_input {
            let info = self
                .engine
                .probe(input.path())
                .await
                .map_err(PipelineError::Probe)?;
            if !info.has_video() {
                return Err(PipelineError::NoVideoStream {
                    path: input.path().to_path_buf(),
                });
            }
            debug!(
                duration_secs = info.duration_secs,
                width = ?info.video_width,
                height = ?info.video_height,
                "Probed input"
            );
        }

        let total = self.catalog.len();
        let (completion_tx, mut completion_rx) = mpsc::channel(total);

        let (encode_tx, forwarder) = match progress {
            Some(tx) => {
                let (encode_tx, encode_rx) = mpsc::channel(ENCODE_PROGRESS_BUFFER);
                let forwarder =
                    tokio::spawn(forward_encode_progress(batch_id.to_string(), encode_rx, tx.clone()));
                (Some(encode_tx), Some(forwarder))
            }
            None => (None, None),
        };

        let dispatched_at = Instant::now();
        let handles = self
            .dispatcher
            .dispatch(
                batch_id,
                &input,
                output_root,
                &self.catalog,
                completion_tx,
                encode_tx,
            )
            .await?;

        metrics::ENCODES_IN_FLIGHT.add(total as i64);
        if let Some(tx) = progress {
            let _ = tx.try_send(PipelineProgress::Dispatched {
                batch_id: batch_id.to_string(),
                renditions: handles.iter().map(|h| h.profile.name()).collect(),
            });
        }

        let mut aggregator = Aggregator::new(total);
        let mut reported = 0;
        let collected = aggregator
            .collect(&mut completion_rx, |completion| {
                reported += 1;
                metrics::ENCODES_IN_FLIGHT.dec();
                observe_completion(batch_id, completion, reported, total, progress);
            })
            .await;

        join_jobs(handles).await;
        if let Some(forwarder) = forwarder {
            let _ = forwarder.await;
        }

        let verdict = match collected {
            Ok(verdict) => verdict,
            Err(incomplete) => {
                metrics::ENCODES_IN_FLIGHT.sub((incomplete.total - incomplete.completed) as i64);
                error!(error = %incomplete, "Batch ended without every job reporting");
                self.discard_stale_manifest(output_root).await;
                return Err(incomplete.into());
            }
        };

        match verdict {
            BatchVerdict::Succeeded(successes) => {
                let manifest = match self.assembler.assemble(output_root, &successes).await {
                    Ok(manifest) => manifest,
                    Err(e) => {
                        aggregator.abort();
                        error!(error = %e, "Failed to write master playlist");
                        self.discard_stale_manifest(output_root).await;
                        return Err(e.into());
                    }
                };
                aggregator.finish();

                let duration_ms = dispatched_at.elapsed().as_millis() as u64;
                info!(
                    manifest = %manifest.path.display(),
                    renditions = successes.len(),
                    duration_ms,
                    "Batch completed"
                );

                Ok(StreamingPackage {
                    batch_id: batch_id.to_string(),
                    manifest_path: manifest.path,
                    renditions: successes.iter().map(RenditionOutput::from).collect(),
                    duration_ms,
                })
            }
            BatchVerdict::Failed(failure) => {
                let rendition = failure.profile.name();
                error!(
                    rendition = %rendition,
                    error = %failure.error,
                    "Batch failed, no master playlist written"
                );
                self.discard_stale_manifest(output_root).await;
                Err(PipelineError::RenditionFailed {
                    rendition,
                    source: failure.error,
                })
            }
        }
    }

    /// Removes a master playlist an earlier batch left in `output_root`. Its
    /// variants may have been overwritten by the failed batch.
    async fn discard_stale_manifest(&self, output_root: &Path) {
        match self.assembler.discard(output_root).await {
            Ok(true) => warn!(
                output_root = %output_root.display(),
                "Removed master playlist from an earlier batch"
            ),
            Ok(false) => {}
            Err(e) => error!(error = %e, "Failed to remove stale master playlist"),
        }
    }
}

/// Records metrics, logs and progress for one completion event.
fn observe_completion(
    batch_id: &str,
    completion: &JobCompletion,
    reported: usize,
    total: usize,
    progress: Option<&mpsc::Sender<PipelineProgress>>,
) {
    let rendition = completion.profile.name();
    metrics::RENDITION_DURATION
        .with_label_values(&[rendition.as_str()])
        .observe(completion.elapsed.as_secs_f64());

    let event = match &completion.outcome {
        JobOutcome::Succeeded(outcome) => {
            metrics::RENDITIONS_TOTAL.with_label_values(&["success"]).inc();
            info!(
                rendition = %rendition,
                segments = outcome.segment_count,
                elapsed_ms = completion.elapsed.as_millis() as u64,
                reported,
                total,
                "Rendition completed"
            );
            PipelineProgress::RenditionCompleted {
                batch_id: batch_id.to_string(),
                rendition,
                completed: reported,
                total,
            }
        }
        JobOutcome::Failed(e) => {
            metrics::RENDITIONS_TOTAL.with_label_values(&["failed"]).inc();
            warn!(rendition = %rendition, error = %e, reported, total, "Rendition failed");
            PipelineProgress::RenditionFailed {
                batch_id: batch_id.to_string(),
                rendition,
                error: e.to_string(),
            }
        }
    };

    if let Some(tx) = progress {
        if tx.try_send(event).is_err() {
            debug!("Progress receiver full or closed, dropping update");
        }
    }
}

/// Relabels engine progress by rendition name and passes it on.
async fn forward_encode_progress(
    batch_id: String,
    mut updates: mpsc::Receiver<EncodeProgress>,
    progress: mpsc::Sender<PipelineProgress>,
) {
    let prefix = format!("{}-", batch_id);
    while let Some(update) = updates.recv().await {
        let rendition = update
            .job_id
            .strip_prefix(&prefix)
            .unwrap_or(&update.job_id)
            .to_string();

        let _ = progress.try_send(PipelineProgress::Encoding {
            batch_id: batch_id.clone(),
            rendition,
            percent: update.percent,
        });
    }
}

/// Waits for every job task to exit. A task only panics if the engine did.
async fn join_jobs(handles: Vec<JobHandle>) {
    let job_ids: Vec<String> = handles.iter().map(|h| h.job_id.clone()).collect();
    let results = join_all(handles.into_iter().map(JobHandle::wait)).await;

    for (job_id, result) in job_ids.iter().zip(results) {
        if let Err(e) = result {
            error!(job_id = %job_id, error = %e, "Encode task panicked");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fixtures, MockEngine};
    use std::time::Duration;
    use tempfile::TempDir;

    fn pipeline(engine: &MockEngine) -> StreamingPipeline<MockEngine> {
        StreamingPipeline::new(PipelineConfig::default(), Arc::new(engine.clone())).unwrap()
    }

    #[tokio::test]
    async fn test_new_rejects_empty_ladder() {
        let result = StreamingPipeline::new(
            PipelineConfig::default().with_profiles(vec![]),
            Arc::new(MockEngine::new()),
        );
        assert!(matches!(result, Err(PipelineError::Configuration(_))));
    }

    #[tokio::test]
    async fn test_success_package() {
        let dir = TempDir::new().unwrap();
        let input = fixtures::write_input(dir.path()).await;
        let root = dir.path().join("out");
        let engine = MockEngine::new();

        let package = pipeline(&engine)
            .process_for_streaming(&input, &root)
            .await
            .unwrap();

        assert_eq!(package.manifest_path, root.join("master.m3u8"));
        let names: Vec<&str> = package.renditions.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["1080p", "720p", "480p", "360p", "144p"]);
        assert_eq!(package.renditions[2].playlist_path, root.join("480p/playlist.m3u8"));
        assert_eq!(package.renditions[2].segment_count, 2);
    }

    #[tokio::test]
    async fn test_no_video_stream_rejected_before_dispatch() {
        let dir = TempDir::new().unwrap();
        let input = fixtures::write_input(dir.path()).await;
        let root = dir.path().join("out");
        let engine = MockEngine::new();
        engine
            .set_media_info(crate::engine::MediaInfo {
                path: input.clone(),
                size_bytes: 10,
                duration_secs: 30.0,
                format: "mp3".to_string(),
                video_codec: None,
                video_width: None,
                video_height: None,
                video_fps: None,
                audio_codec: Some("mp3".to_string()),
            })
            .await;

        let err = pipeline(&engine)
            .process_for_streaming(&input, &root)
            .await
            .unwrap_err();

        assert!(matches!(err, PipelineError::NoVideoStream { .. }));
        assert!(err.is_precondition());
        assert!(!root.exists());
        assert_eq!(engine.request_count().await, 0);
    }

    #[tokio::test]
    async fn test_probe_can_be_disabled() {
        let dir = TempDir::new().unwrap();
        let input = fixtures::write_input(dir.path()).await;
        let engine = MockEngine::new();
        engine.set_probe_error("not a media file").await;

        let pipeline = StreamingPipeline::new(
            PipelineConfig::default().with_probe(false),
            Arc::new(engine.clone()),
        )
        .unwrap();
        pipeline
            .process_for_streaming(&input, dir.path().join("out"))
            .await
            .unwrap();

        let err = StreamingPipeline::new(PipelineConfig::default(), Arc::new(engine))
            .unwrap()
            .process_for_streaming(&input, dir.path().join("out2"))
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Probe(_)));
    }

    #[tokio::test]
    async fn test_failure_waits_for_siblings() {
        let dir = TempDir::new().unwrap();
        let input = fixtures::write_input(dir.path()).await;
        let root = dir.path().join("out");
        let engine = MockEngine::new();
        engine.fail_rendition(720, "encoder crashed").await;
        engine
            .set_rendition_delay(144, Duration::from_millis(50))
            .await;

        let err = pipeline(&engine)
            .process_for_streaming(&input, &root)
            .await
            .unwrap_err();

        match err {
            PipelineError::RenditionFailed { rendition, .. } => assert_eq!(rendition, "720p"),
            other => panic!("unexpected error: {:?}", other),
        }
        // The slow sibling still ran to completion
        assert!(root.join("144p/playlist.m3u8").exists());
        assert!(!root.join("master.m3u8").exists());
    }

    #[tokio::test]
    async fn test_custom_ladder() {
        let dir = TempDir::new().unwrap();
        let input = fixtures::write_input(dir.path()).await;
        let root = dir.path().join("out");
        let config = PipelineConfig::default()
            .with_profiles(vec![fixtures::profile(360, 800), fixtures::profile(240, 300)]);

        let package = StreamingPipeline::new(config, Arc::new(MockEngine::new()))
            .unwrap()
            .process_for_streaming(&input, &root)
            .await
            .unwrap();

        assert_eq!(package.renditions.len(), 2);
        assert_eq!(package.renditions[0].bandwidth_bps, 800_000);
        assert_eq!(package.renditions[1].width, 426);
        assert!(!root.join("1080p").exists());
    }
}

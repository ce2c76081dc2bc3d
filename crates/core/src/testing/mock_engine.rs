//! Mock encoding engine for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};

use crate::engine::{
    EncodeOutcome, EncodeProgress, EncodeRequest, EncodingEngine, EngineError, MediaInfo,
};

/// Number of fake segments written per rendition.
const MOCK_SEGMENTS: usize = 2;

/// Mock implementation of the [`EncodingEngine`] trait.
///
/// Provides controllable behavior for testing:
/// - Records every request for assertions
/// - Fails, panics or delays specific renditions by height
/// - Tracks how many encodes ran at the same time
/// - Writes a small media playlist and segments so outputs can be inspected
///
/// Clones share state, so a test can keep one handle while the pipeline
/// owns another.
///
/// # Example
///
/// ```rust,ignore
/// use ladder_core::testing::MockEngine;
///
/// let engine = MockEngine::new();
/// engine.fail_rendition(480, "encoder crashed").await;
/// engine.set_rendition_delay(1080, Duration::from_millis(50)).await;
///
/// let pipeline = StreamingPipeline::new(config, Arc::new(engine.clone()))?;
/// // ...
/// assert_eq!(engine.request_count().await, 5);
/// ```
#[derive(Debug, Clone)]
pub struct MockEngine {
    /// Every request received, in arrival order.
    requests: Arc<RwLock<Vec<EncodeRequest>>>,
    /// Failure reason by rendition height.
    failures: Arc<RwLock<HashMap<u32, String>>>,
    /// Simulated encode time by rendition height.
    delays: Arc<RwLock<HashMap<u32, Duration>>>,
    /// Simulated encode time for renditions without a specific delay.
    default_delay: Arc<RwLock<Duration>>,
    /// Result returned by `probe`. `None` reports a generic 1080p video.
    media_info: Arc<RwLock<Option<MediaInfo>>>,
    /// If set, `probe` fails with this reason.
    probe_error: Arc<RwLock<Option<String>>>,
    /// Heights whose encode task panics instead of reporting.
    panics: Arc<RwLock<HashSet<u32>>>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl MockEngine {
    /// Create a new mock engine that succeeds instantly.
    pub fn new() -> Self {
        Self {
            requests: Arc::new(RwLock::new(Vec::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            delays: Arc::new(RwLock::new(HashMap::new())),
            default_delay: Arc::new(RwLock::new(Duration::ZERO)),
            media_info: Arc::new(RwLock::new(None)),
            probe_error: Arc::new(RwLock::new(None)),
            panics: Arc::new(RwLock::new(HashSet::new())),
            active: Arc::new(AtomicUsize::new(0)),
            peak: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Get all recorded requests.
    pub async fn recorded_requests(&self) -> Vec<EncodeRequest> {
        self.requests.read().await.clone()
    }

    /// Get the number of encodes started.
    pub async fn request_count(&self) -> usize {
        self.requests.read().await.len()
    }

    /// Make every encode of the given height fail.
    pub async fn fail_rendition(&self, height: u32, reason: impl Into<String>) {
        self.failures.write().await.insert(height, reason.into());
    }

    /// Set the simulated encode time for one height.
    pub async fn set_rendition_delay(&self, height: u32, delay: Duration) {
        self.delays.write().await.insert(height, delay);
    }

    /// Set the simulated encode time for every other height.
    pub async fn set_default_delay(&self, delay: Duration) {
        *self.default_delay.write().await = delay;
    }

    /// Set the media info returned by `probe`.
    pub async fn set_media_info(&self, info: MediaInfo) {
        *self.media_info.write().await = Some(info);
    }

    /// Make `probe` fail.
    pub async fn set_probe_error(&self, reason: impl Into<String>) {
        *self.probe_error.write().await = Some(reason.into());
    }

    /// Make every encode of the given height panic, so its job never reports.
    pub async fn panic_rendition(&self, height: u32) {
        self.panics.write().await.insert(height);
    }

    /// Highest number of encodes observed running at once.
    pub async fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    async fn delay_for(&self, height: u32) -> Duration {
        match self.delays.read().await.get(&height) {
            Some(delay) => *delay,
            None => *self.default_delay.read().await,
        }
    }

    fn default_info(path: &Path) -> MediaInfo {
        MediaInfo {
            path: path.to_path_buf(),
            size_bytes: 100 * 1024 * 1024,
            duration_secs: 120.0,
            format: "mov,mp4,m4a,3gp,3g2,mj2".to_string(),
            video_codec: Some("h264".to_string()),
            video_width: Some(1920),
            video_height: Some(1080),
            video_fps: Some(30.0),
            audio_codec: Some("aac".to_string()),
        }
    }

    /// Writes the files a real encode would leave behind.
    async fn write_outputs(request: &EncodeRequest) -> Result<(), EngineError> {
        let mut playlist = format!(
            "#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-TARGETDURATION:{}\n#EXT-X-MEDIA-SEQUENCE:0\n#EXT-X-PLAYLIST-TYPE:{}\n",
            request.segment_duration_secs,
            request.playlist_type.as_str().to_uppercase(),
        );

        let pattern = request
            .segment_pattern
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| "segment%03d.ts".to_string());

        for i in 0..MOCK_SEGMENTS {
            let name = segment_file_name(&pattern, i);
            tokio::fs::write(request.output_dir.join(&name), b"mock segment").await?;
            playlist.push_str(&format!(
                "#EXTINF:{}.000000,\n{}\n",
                request.segment_duration_secs, name
            ));
        }
        playlist.push_str("#EXT-X-ENDLIST\n");

        tokio::fs::write(&request.playlist_path, playlist).await?;
        Ok(())
    }

    async fn run(&self, request: EncodeRequest) -> Result<EncodeOutcome, EngineError> {
        self.requests.write().await.push(request.clone());

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        let delay = self.delay_for(request.height).await;
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.panics.read().await.contains(&request.height) {
            self.active.fetch_sub(1, Ordering::SeqCst);
            panic!("mock engine crashed encoding {}", request.job_id);
        }

        let result = self.finish(&request, delay).await;
        self.active.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn finish(
        &self,
        request: &EncodeRequest,
        delay: Duration,
    ) -> Result<EncodeOutcome, EngineError> {
        if let Some(reason) = self.failures.read().await.get(&request.height) {
            return Err(EngineError::encode_failed(
                reason.clone(),
                Some(format!("mock stderr for {}", request.job_id)),
            ));
        }

        if !request.output_dir.is_dir() {
            return Err(EngineError::OutputDirectoryMissing {
                path: request.output_dir.clone(),
            });
        }

        Self::write_outputs(request).await?;

        Ok(EncodeOutcome {
            job_id: request.job_id.clone(),
            playlist_path: request.playlist_path.clone(),
            segment_count: MOCK_SEGMENTS,
            duration_ms: delay.as_millis() as u64,
        })
    }
}

#[async_trait]
impl EncodingEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, EngineError> {
        if let Some(reason) = self.probe_error.read().await.as_ref() {
            return Err(EngineError::probe_failed(reason.clone()));
        }

        if let Some(info) = self.media_info.read().await.as_ref() {
            let mut info = info.clone();
            info.path = path.to_path_buf();
            return Ok(info);
        }

        Ok(Self::default_info(path))
    }

    async fn encode(&self, request: EncodeRequest) -> Result<EncodeOutcome, EngineError> {
        self.run(request).await
    }

    async fn encode_with_progress(
        &self,
        request: EncodeRequest,
        progress_tx: mpsc::Sender<EncodeProgress>,
    ) -> Result<EncodeOutcome, EngineError> {
        for percent in [25.0_f32, 50.0, 75.0] {
            let _ = progress_tx
                .send(EncodeProgress {
                    job_id: request.job_id.clone(),
                    percent,
                    time_secs: f64::from(percent) * 1.2,
                    duration_secs: Some(120.0),
                    speed: Some("8x".to_string()),
                })
                .await;
        }

        let result = self.run(request).await;

        if let Ok(outcome) = &result {
            let _ = progress_tx
                .send(EncodeProgress {
                    job_id: outcome.job_id.clone(),
                    percent: 100.0,
                    time_secs: 120.0,
                    duration_secs: Some(120.0),
                    speed: Some("8x".to_string()),
                })
                .await;
        }

        result
    }

    async fn validate(&self) -> Result<(), EngineError> {
        Ok(())
    }
}

/// Expands a printf-style `%d` or `%0Nd` index in a segment file name.
fn segment_file_name(pattern: &str, index: usize) -> String {
    if let Some(start) = pattern.find('%') {
        let rest = &pattern[start + 1..];
        if let Some(end) = rest.find('d') {
            let digits = &rest[..end];
            if digits.chars().all(|c| c.is_ascii_digit()) {
                let width = digits.parse::<usize>().unwrap_or(0);
                return format!(
                    "{}{:0width$}{}",
                    &pattern[..start],
                    index,
                    &rest[end + 1..],
                    width = width
                );
            }
        }
    }
    pattern.to_string()
}

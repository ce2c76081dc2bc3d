//! FFmpeg-based encoding engine.

use async_trait::async_trait;
use regex_lite::Regex;
use serde::Deserialize;
use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::time::{timeout, Duration};

use super::config::EngineConfig;
use super::error::EngineError;
use super::traits::EncodingEngine;
use super::types::{EncodeOutcome, EncodeProgress, EncodeRequest, MediaInfo};

/// Encoding engine that drives the `ffmpeg` HLS muxer.
pub struct FfmpegEngine {
    config: EngineConfig,
}

impl FfmpegEngine {
    /// Creates a new FFmpeg engine with the given configuration.
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    /// Creates an engine with default configuration.
    pub fn with_defaults() -> Self {
        Self::new(EngineConfig::default())
    }

    /// Builds ffmpeg arguments for one HLS rendition.
    fn build_hls_args(&self, request: &EncodeRequest) -> Vec<String> {
        let mut args = vec![
            "-y".to_string(),
            "-i".to_string(),
            request.input_path.to_string_lossy().to_string(),
        ];

        // Scaling and rate control
        args.extend([
            "-vf".to_string(),
            format!("scale=w={}:h={}", request.width, request.height),
            "-c:v".to_string(),
            request.video_codec.clone(),
            "-b:v".to_string(),
            format!("{}k", request.video_bitrate_kbps),
            "-c:a".to_string(),
            request.audio_codec.clone(),
        ]);

        // Segmenting
        args.extend([
            "-f".to_string(),
            "hls".to_string(),
            "-hls_time".to_string(),
            request.segment_duration_secs.to_string(),
            "-hls_playlist_type".to_string(),
            request.playlist_type.as_str().to_string(),
            "-hls_segment_filename".to_string(),
            request.segment_pattern.to_string_lossy().to_string(),
        ]);

        // Log level and progress
        args.extend([
            "-loglevel".to_string(),
            self.config.ffmpeg_log_level.clone(),
            "-progress".to_string(),
            "pipe:2".to_string(),
        ]);

        args.extend(self.config.extra_ffmpeg_args.iter().cloned());

        // Output
        args.push(request.playlist_path.to_string_lossy().to_string());

        args
    }

    /// Parses ffprobe JSON output into MediaInfo.
    fn parse_probe_output(path: &Path, output: &str) -> Result<MediaInfo, EngineError> {
        #[derive(Deserialize)]
        struct ProbeOutput {
            format: ProbeFormat,
            streams: Vec<ProbeStream>,
        }

        #[derive(Deserialize)]
        struct ProbeFormat {
            format_name: String,
            duration: Option<String>,
            size: Option<String>,
        }

        #[derive(Deserialize)]
        struct ProbeStream {
            codec_type: String,
            codec_name: Option<String>,
            width: Option<u32>,
            height: Option<u32>,
            r_frame_rate: Option<String>,
        }

        let probe: ProbeOutput =
            serde_json::from_str(output).map_err(|e| EngineError::ParseError {
                reason: format!("Failed to parse ffprobe output: {}", e),
            })?;

        let duration_secs = probe
            .format
            .duration
            .as_ref()
            .and_then(|d| d.parse::<f64>().ok())
            .unwrap_or(0.0);

        let size_bytes = probe
            .format
            .size
            .as_ref()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(0);

        let video_stream = probe.streams.iter().find(|s| s.codec_type == "video");
        let audio_stream = probe.streams.iter().find(|s| s.codec_type == "audio");

        let format_name = probe
            .format
            .format_name
            .split(',')
            .next()
            .unwrap_or("unknown");

        Ok(MediaInfo {
            path: path.to_path_buf(),
            size_bytes,
            duration_secs,
            format: format_name.to_string(),
            video_codec: video_stream.and_then(|s| s.codec_name.clone()),
            video_width: video_stream.and_then(|s| s.width),
            video_height: video_stream.and_then(|s| s.height),
            video_fps: video_stream
                .and_then(|s| s.r_frame_rate.as_deref())
                .and_then(parse_frame_rate),
            audio_codec: audio_stream.and_then(|s| s.codec_name.clone()),
        })
    }

    /// Runs one rendition encode with optional progress reporting.
    async fn run_encode(
        &self,
        request: &EncodeRequest,
        progress_tx: Option<mpsc::Sender<EncodeProgress>>,
    ) -> Result<EncodeOutcome, EngineError> {
        let start = Instant::now();

        // libx264 with yuv420p rejects odd frame sizes
        if request.width % 2 != 0 || request.height % 2 != 0 {
            return Err(EngineError::invalid_request(format!(
                "{}x{} has an odd dimension",
                request.width, request.height
            )));
        }

        if !tokio::fs::try_exists(&request.output_dir).await? {
            return Err(EngineError::OutputDirectoryMissing {
                path: request.output_dir.clone(),
            });
        }

        // Input duration drives the progress percentage
        let duration_secs = if progress_tx.is_some() {
            self.probe(&request.input_path)
                .await
                .ok()
                .map(|info| info.duration_secs)
        } else {
            None
        };

        let args = self.build_hls_args(request);
        tracing::debug!(job_id = %request.job_id, "Spawning ffmpeg: {}", args.join(" "));

        let mut child = Command::new(&self.config.ffmpeg_path)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::FfmpegNotFound {
                        path: self.config.ffmpeg_path.clone(),
                    }
                } else {
                    EngineError::Io(e)
                }
            })?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| EngineError::encode_failed("ffmpeg stderr was not captured", None))?;
        let mut reader = BufReader::new(stderr).lines();

        let mut current_time = 0.0;
        let mut current_speed = None;
        let time_regex = Regex::new(r"out_time_ms=(\d+)").ok();
        let speed_regex = Regex::new(r"speed=\s*(\d+\.?\d*)x").ok();

        let timeout_duration = Duration::from_secs(self.config.timeout_secs);
        let result = timeout(timeout_duration, async {
            let mut last_progress_send = Instant::now();
            let progress_interval = Duration::from_millis(500);
            let mut error_output = String::new();

            while let Ok(Some(line)) = reader.next_line().await {
                if line.contains("Error") || line.contains("error") {
                    error_output.push_str(&line);
                    error_output.push('\n');
                }

                if let Some(caps) = time_regex.as_ref().and_then(|re| re.captures(&line)) {
                    if let Some(Ok(us)) = caps.get(1).map(|m| m.as_str().parse::<f64>()) {
                        // out_time_ms is reported in microseconds
                        current_time = us / 1_000_000.0;
                    }
                }

                if let Some(caps) = speed_regex.as_ref().and_then(|re| re.captures(&line)) {
                    if let Some(speed) = caps.get(1) {
                        current_speed = Some(format!("{}x", speed.as_str()));
                    }
                }

                if let Some(ref tx) = progress_tx {
                    if last_progress_send.elapsed() >= progress_interval {
                        let percent = match duration_secs {
                            Some(dur) if dur > 0.0 => (current_time / dur * 100.0).min(100.0) as f32,
                            _ => 0.0,
                        };

                        // Non-blocking send
                        let _ = tx.try_send(EncodeProgress {
                            job_id: request.job_id.clone(),
                            percent,
                            time_secs: current_time,
                            duration_secs,
                            speed: current_speed.clone(),
                        });
                        last_progress_send = Instant::now();
                    }
                }
            }

            let status = child.wait().await?;
            Ok::<(std::process::ExitStatus, String), std::io::Error>((status, error_output))
        })
        .await;

        match result {
            Ok(Ok((status, error_output))) => {
                if !status.success() {
                    return Err(EngineError::encode_failed(
                        format!("FFmpeg exited with code: {:?}", status.code()),
                        if error_output.is_empty() {
                            None
                        } else {
                            Some(error_output)
                        },
                    ));
                }
            }
            Ok(Err(e)) => return Err(EngineError::Io(e)),
            Err(_) => {
                let _ = child.kill().await;
                return Err(EngineError::Timeout {
                    timeout_secs: self.config.timeout_secs,
                });
            }
        }

        if !tokio::fs::try_exists(&request.playlist_path).await? {
            return Err(EngineError::PlaylistMissing {
                path: request.playlist_path.clone(),
            });
        }

        let segment_count = count_segments(request).await?;

        Ok(EncodeOutcome {
            job_id: request.job_id.clone(),
            playlist_path: request.playlist_path.clone(),
            segment_count,
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Parses a frame rate like "24000/1001" or "30".
fn parse_frame_rate(rate: &str) -> Option<f32> {
    match rate.split_once('/') {
        Some((num, den)) => {
            let num = num.parse::<f32>().ok()?;
            let den = den.parse::<f32>().ok()?;
            if den > 0.0 {
                Some(num / den)
            } else {
                None
            }
        }
        None => rate.parse::<f32>().ok(),
    }
}

/// Counts files in the rendition directory sharing the segment extension.
async fn count_segments(request: &EncodeRequest) -> Result<usize, EngineError> {
    let extension = request
        .segment_pattern
        .extension()
        .unwrap_or_else(|| OsStr::new("ts"));

    let mut count = 0;
    let mut entries = tokio::fs::read_dir(&request.output_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        if entry.path().extension() == Some(extension) {
            count += 1;
        }
    }
    Ok(count)
}

#[async_trait]
impl EncodingEngine for FfmpegEngine {
    fn name(&self) -> &str {
        "ffmpeg"
    }

    async fn probe(&self, path: &Path) -> Result<MediaInfo, EngineError> {
        if !path.exists() {
            return Err(EngineError::InputNotFound {
                path: path.to_path_buf(),
            });
        }

        let output = Command::new(&self.config.ffprobe_path)
            .args([
                "-v",
                "quiet",
                "-print_format",
                "json",
                "-show_format",
                "-show_streams",
            ])
            .arg(path)
            .output()
            .await
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    EngineError::FfprobeNotFound {
                        path: self.config.ffprobe_path.clone(),
                    }
                } else {
                    EngineError::Io(e)
                }
            })?;

        if !output.status.success() {
            return Err(EngineError::probe_failed(format!(
                "ffprobe failed: {}",
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Self::parse_probe_output(path, &stdout)
    }

    async fn encode(&self, request: EncodeRequest) -> Result<EncodeOutcome, EngineError> {
        self.run_encode(&request, None).await
    }

    async fn encode_with_progress(
        &self,
        request: EncodeRequest,
        progress_tx: mpsc::Sender<EncodeProgress>,
    ) -> Result<EncodeOutcome, EngineError> {
        self.run_encode(&request, Some(progress_tx)).await
    }

    async fn validate(&self) -> Result<(), EngineError> {
        let ffmpeg_result = Command::new(&self.config.ffmpeg_path)
            .arg("-version")
            .output()
            .await;

        if let Err(e) = ffmpeg_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(EngineError::FfmpegNotFound {
                    path: self.config.ffmpeg_path.clone(),
                });
            }
            return Err(EngineError::Io(e));
        }

        let ffprobe_result = Command::new(&self.config.ffprobe_path)
            .arg("-version")
            .output()
            .await;

        if let Err(e) = ffprobe_result {
            if e.kind() == std::io::ErrorKind::NotFound {
                return Err(EngineError::FfprobeNotFound {
                    path: self.config.ffprobe_path.clone(),
                });
            }
            return Err(EngineError::Io(e));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::PlaylistType;
    use std::path::PathBuf;

    fn request() -> EncodeRequest {
        EncodeRequest {
            job_id: "b1-480p".to_string(),
            input_path: PathBuf::from("/uploads/input.mp4"),
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
        }
    }

    fn value_after<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
        args.iter()
            .position(|a| a == flag)
            .and_then(|i| args.get(i + 1))
            .map(String::as_str)
    }

    #[test]
    fn test_build_hls_args() {
        let engine = FfmpegEngine::with_defaults();
        let args = engine.build_hls_args(&request());

        assert_eq!(value_after(&args, "-i"), Some("/uploads/input.mp4"));
        assert_eq!(value_after(&args, "-vf"), Some("scale=w=854:h=480"));
        assert_eq!(value_after(&args, "-b:v"), Some("500k"));
        assert_eq!(value_after(&args, "-c:v"), Some("libx264"));
        assert_eq!(value_after(&args, "-c:a"), Some("aac"));
        assert_eq!(value_after(&args, "-f"), Some("hls"));
        assert_eq!(value_after(&args, "-hls_time"), Some("10"));
        assert_eq!(value_after(&args, "-hls_playlist_type"), Some("vod"));
        assert_eq!(
            value_after(&args, "-hls_segment_filename"),
            Some("/out/480p/segment%03d.ts")
        );
        assert_eq!(args.last().map(String::as_str), Some("/out/480p/playlist.m3u8"));
    }

    #[test]
    fn test_extra_args_precede_output() {
        let engine = FfmpegEngine::new(EngineConfig {
            extra_ffmpeg_args: vec!["-preset".to_string(), "veryfast".to_string()],
            ..Default::default()
        });

        let args = engine.build_hls_args(&request());
        let n = args.len();
        assert_eq!(args[n - 3], "-preset");
        assert_eq!(args[n - 2], "veryfast");
        assert_eq!(args[n - 1], "/out/480p/playlist.m3u8");
    }

    #[test]
    fn test_parse_probe_output_video() {
        let json = r#"{
            "format": {
                "filename": "input.mkv",
                "format_name": "matroska,webm",
                "duration": "600.0",
                "size": "500000000"
            },
            "streams": [
                {
                    "codec_type": "video",
                    "codec_name": "h264",
                    "width": 1920,
                    "height": 1080,
                    "r_frame_rate": "24000/1001"
                },
                {
                    "codec_type": "audio",
                    "codec_name": "aac"
                }
            ]
        }"#;

        let info = FfmpegEngine::parse_probe_output(Path::new("input.mkv"), json).unwrap();
        assert_eq!(info.format, "matroska");
        assert_eq!(info.size_bytes, 500_000_000);
        assert!((info.duration_secs - 600.0).abs() < 0.01);
        assert_eq!(info.video_codec, Some("h264".to_string()));
        assert_eq!(info.video_width, Some(1920));
        assert_eq!(info.video_height, Some(1080));
        let fps = info.video_fps.unwrap();
        assert!((fps - 23.976).abs() < 0.01);
        assert_eq!(info.audio_codec, Some("aac".to_string()));
    }

    #[test]
    fn test_parse_probe_output_audio_only() {
        let json = r#"{
            "format": {"filename": "a.flac", "format_name": "flac", "duration": "12.5"},
            "streams": [{"codec_type": "audio", "codec_name": "flac"}]
        }"#;

        let info = FfmpegEngine::parse_probe_output(Path::new("a.flac"), json).unwrap();
        assert!(!info.has_video());
        assert_eq!(info.size_bytes, 0);
    }

    #[test]
    fn test_parse_probe_output_garbage() {
        let result = FfmpegEngine::parse_probe_output(Path::new("x"), "not json");
        assert!(matches!(result, Err(EngineError::ParseError { .. })));
    }

    #[test]
    fn test_parse_frame_rate() {
        assert_eq!(parse_frame_rate("30/1"), Some(30.0));
        assert_eq!(parse_frame_rate("25"), Some(25.0));
        assert_eq!(parse_frame_rate("30/0"), None);
        assert_eq!(parse_frame_rate("n/a"), None);
    }

    #[tokio::test]
    async fn test_count_segments() {
        let dir = tempfile::TempDir::new().unwrap();
        for name in ["segment000.ts", "segment001.ts", "playlist.m3u8"] {
            tokio::fs::write(dir.path().join(name), b"").await.unwrap();
        }

        let mut req = request();
        req.output_dir = dir.path().to_path_buf();
        req.segment_pattern = dir.path().join("segment%03d.ts");

        assert_eq!(count_segments(&req).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_encode_requires_output_dir() {
        let engine = FfmpegEngine::with_defaults();
        let mut req = request();
        req.output_dir = PathBuf::from("/definitely/not/here/480p");

        let err = engine.encode(req).await.unwrap_err();
        assert!(matches!(err, EngineError::OutputDirectoryMissing { .. }));
    }

    #[tokio::test]
    async fn test_encode_rejects_odd_dimensions() {
        let engine = FfmpegEngine::with_defaults();
        let mut req = request();
        req.width = 853;

        let err = engine.encode(req).await.unwrap_err();
        assert!(matches!(err, EngineError::InvalidRequest { .. }));
        assert!(err.to_string().contains("853x480"));
    }

    #[tokio::test]
    async fn test_validate_missing_ffmpeg() {
        let engine = FfmpegEngine::new(EngineConfig::with_paths(
            PathBuf::from("/definitely/not/here/ffmpeg"),
            PathBuf::from("/definitely/not/here/ffprobe"),
        ));

        let err = engine.validate().await.unwrap_err();
        assert!(matches!(err, EngineError::FfmpegNotFound { .. }));
        assert!(err.to_string().contains("/definitely/not/here/ffmpeg"));
    }

    #[tokio::test]
    async fn test_probe_missing_input() {
        let engine = FfmpegEngine::with_defaults();
        let err = engine
            .probe(Path::new("/definitely/not/here.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::InputNotFound { .. }));
    }
}

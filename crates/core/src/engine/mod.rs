//! Encoding engine capability.
//!
//! The pipeline never encodes anything itself. It hands an [`EncodeRequest`]
//! per rendition to an [`EncodingEngine`] and waits for exactly one outcome.
//! [`FfmpegEngine`] drives the `ffmpeg` HLS muxer; tests use
//! [`crate::testing::MockEngine`].
//!
//! # Example
//!
//! ```ignore
//! use ladder_core::engine::{EncodingEngine, FfmpegEngine, EngineConfig};
//!
//! let engine = FfmpegEngine::new(EngineConfig::default());
//! engine.validate().await?;
//!
//! let info = engine.probe(Path::new("/uploads/talk.mp4")).await?;
//! println!("Duration: {} seconds", info.duration_secs);
//! ```

mod config;
mod error;
mod ffmpeg;
mod traits;
mod types;

pub use config::EngineConfig;
pub use error::EngineError;
pub use ffmpeg::FfmpegEngine;
pub use traits::EncodingEngine;
pub use types::{EncodeOutcome, EncodeProgress, EncodeRequest, MediaInfo, PlaylistType};

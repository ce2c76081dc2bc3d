//! Pipeline façade.
//!
//! [`StreamingPipeline`] is the single entry point collaborators use. One call
//! runs one batch end to end:
//!
//! 1. Check the input is a readable file, and optionally probe it for video
//! 2. Create `{output_root}/{height}p/` for every rendition and start one
//!    engine job per rendition
//! 3. Collect completions until every job has reported
//! 4. Write `{output_root}/master.m3u8` if and only if all renditions succeeded
//!
//! # Example
//!
//! ```ignore
//! use ladder_core::engine::{EngineConfig, FfmpegEngine};
//! use ladder_core::pipeline::{PipelineConfig, StreamingPipeline};
//!
//! let engine = Arc::new(FfmpegEngine::new(EngineConfig::default()));
//! let pipeline = StreamingPipeline::new(PipelineConfig::default(), engine)?;
//!
//! let package = pipeline
//!     .process_for_streaming("/uploads/talk.mp4", "/srv/hls/talk")
//!     .await?;
//! println!("Serve {}", package.manifest_path.display());
//! ```

mod config;
mod error;
mod streaming;
mod types;

pub use config::PipelineConfig;
pub use error::PipelineError;
pub use streaming::StreamingPipeline;
pub use types::{PipelineProgress, RenditionOutput, StreamingPackage};

//! Testing utilities and mock implementations.
//!
//! [`MockEngine`] stands in for ffmpeg so the whole pipeline can be exercised
//! without external binaries.
//!
//! # Example
//!
//! ```rust,ignore
//! use ladder_core::testing::{fixtures, MockEngine};
//!
//! let engine = MockEngine::new();
//! engine.fail_rendition(360, "out of memory").await;
//!
//! let input = fixtures::write_input(dir.path()).await;
//! ```

mod mock_engine;

pub use mock_engine::MockEngine;

/// Test fixtures and helper functions.
pub mod fixtures {
    use std::path::{Path, PathBuf};

    use crate::profile::RenditionProfile;

    /// Write a placeholder upload and return its path.
    pub async fn write_input(dir: &Path) -> PathBuf {
        let path = dir.join("upload.mp4");
        tokio::fs::write(&path, b"\x00\x00\x00\x18ftypmp42")
            .await
            .expect("write test input");
        path
    }

    /// A profile with a 16:9 width for the given height.
    pub fn profile(height: u32, bitrate_kbps: u32) -> RenditionProfile {
        RenditionProfile::new((height * 16 / 9) & !1, height, bitrate_kbps)
    }
}

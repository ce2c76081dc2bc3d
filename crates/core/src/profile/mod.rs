//! Rendition profile catalog.
//!
//! A catalog is the ordered list of renditions a source video is encoded into.
//! Catalog order is the order variants appear in the master playlist, so it is
//! fixed once the catalog is built.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// Target dimensions and bitrate of one rendition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RenditionProfile {
    /// Output width in pixels.
    pub width: u32,
    /// Output height in pixels.
    pub height: u32,
    /// Target video bitrate in kbps.
    pub bitrate_kbps: u32,
}

impl RenditionProfile {
    pub const fn new(width: u32, height: u32, bitrate_kbps: u32) -> Self {
        Self {
            width,
            height,
            bitrate_kbps,
        }
    }

    /// Short name of the rendition, also used as its output subdirectory.
    pub fn name(&self) -> String {
        format!("{}p", self.height)
    }

    /// Bitrate in bits per second, as advertised in `BANDWIDTH`.
    pub fn bandwidth_bps(&self) -> u64 {
        u64::from(self.bitrate_kbps) * 1000
    }

    /// Checks that every dimension is strictly positive.
    pub fn validate(&self) -> Result<(), ProfileError> {
        let reason = if self.width == 0 {
            Some("width must be greater than 0")
        } else if self.height == 0 {
            Some("height must be greater than 0")
        } else if self.bitrate_kbps == 0 {
            Some("bitrate must be greater than 0")
        } else {
            None
        };

        match reason {
            Some(reason) => Err(ProfileError::Invalid {
                profile: *self,
                reason: reason.to_string(),
            }),
            None => Ok(()),
        }
    }
}

impl std::fmt::Display for RenditionProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}x{}@{}kbps",
            self.width, self.height, self.bitrate_kbps
        )
    }
}

/// The baseline five-tier ladder, highest quality first.
pub const DEFAULT_PROFILES: [RenditionProfile; 5] = [
    RenditionProfile::new(1920, 1080, 2000),
    RenditionProfile::new(1280, 720, 1000),
    RenditionProfile::new(854, 480, 500),
    RenditionProfile::new(640, 360, 400),
    RenditionProfile::new(256, 144, 200),
];

/// Returns the default profile list (used by serde defaults).
pub fn default_profiles() -> Vec<RenditionProfile> {
    DEFAULT_PROFILES.to_vec()
}

/// Errors raised while building or checking a catalog.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProfileError {
    /// No renditions configured.
    #[error("Rendition catalog is empty")]
    Empty,

    /// A profile has a zero dimension or bitrate.
    #[error("Invalid rendition profile {profile}: {reason}")]
    Invalid {
        profile: RenditionProfile,
        reason: String,
    },

    /// Two profiles would write into the same `{height}p` directory.
    #[error(
        "Renditions #{first} and #{second} share height {height}p and would overwrite each other"
    )]
    HeightCollision {
        height: u32,
        first: usize,
        second: usize,
    },
}

/// Immutable, ordered set of renditions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenditionCatalog {
    profiles: Vec<RenditionProfile>,
}

impl RenditionCatalog {
    /// Builds a catalog, rejecting empty lists and non-positive profiles.
    ///
    /// Height collisions are not rejected here; they are checked when a batch
    /// is dispatched (see [`RenditionCatalog::check_unique_heights`]).
    pub fn new(profiles: Vec<RenditionProfile>) -> Result<Self, ProfileError> {
        if profiles.is_empty() {
            return Err(ProfileError::Empty);
        }
        for profile in &profiles {
            profile.validate()?;
        }
        Ok(Self { profiles })
    }

    /// Profiles in catalog order.
    pub fn list(&self) -> &[RenditionProfile] {
        &self.profiles
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }

    /// Fails on the first pair of profiles sharing a height.
    pub fn check_unique_heights(&self) -> Result<(), ProfileError> {
        let mut seen: HashMap<u32, usize> = HashMap::with_capacity(self.profiles.len());
        for (index, profile) in self.profiles.iter().enumerate() {
            if let Some(first) = seen.insert(profile.height, index) {
                return Err(ProfileError::HeightCollision {
                    height: profile.height,
                    first,
                    second: index,
                });
            }
        }
        Ok(())
    }
}

impl Default for RenditionCatalog {
    fn default() -> Self {
        Self {
            profiles: default_profiles(),
        }
    }
}

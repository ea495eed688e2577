//! Lossy block codec for 32×32 grayscale regions.
//!
//! The codec is layered bottom-up:
//!
//! - [`color`]: 16-bit Y:UV samples.
//! - [`block`]: 4×4 pixel blocks with two endpoints and per-pixel blends.
//! - [`region`]: 8×8 blocks plus a sharing table, and the stream format.
//! - [`image`]: whole images as grids of regions with per-region change maps.

pub mod block;
pub mod color;
pub mod image;
pub mod region;

use serde::{Deserialize, Serialize};

pub use block::{BlendFactor, Block};
pub use color::YuvColor;
pub use image::CompressedImage;
pub use region::{compare_regions, decode_region, encode_region, BlockCode, BlockTable, Region, REGION_SIZE};

// ── CodecConfig ──────────────────────────────────────────────────

/// Tunable codec thresholds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecConfig {
    /// Largest [`Block::difference`] at which a block reuses a neighbour.
    pub block_threshold: u32,
    /// Accumulated stream difference above which a region counts as changed.
    pub comparison_threshold: u32,
}

impl Default for CodecConfig {
    fn default() -> Self {
        Self {
            block_threshold: 24,
            comparison_threshold: 8,
        }
    }
}

//! Whole images as grids of independently coded regions.

use bytes::Bytes;

use crate::delta::TileGrid;
use crate::error::TilecastError;
use crate::grid::Grid2D;
use crate::pipeline::RegionJob;

use super::block::Block;
use super::region::{compare_regions, Region, BLOCK_COUNT, REGION_SIZE};
use super::CodecConfig;

/// An image stored as a grid of 32×32 [`Region`]s.
///
/// Dimensions are rounded down to multiples of [`REGION_SIZE`]; pixels past
/// the last full region are dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompressedImage {
    width: u32,
    height: u32,
    regions: Grid2D<Region>,
}

impl CompressedImage {
    /// A black image.
    pub fn new(width: u32, height: u32) -> Self {
        let (width, height) = round_down(width, height);
        let black = Region::from_blocks([Block::default(); BLOCK_COUNT]);
        let regions = Grid2D::from_fn(
            width as usize / REGION_SIZE,
            height as usize / REGION_SIZE,
            |_, _| black.clone(),
        );
        Self {
            width,
            height,
            regions,
        }
    }

    /// Build from a row-major luma plane of `width × height` bytes.
    pub fn from_luma(width: u32, height: u32, luma: &[u8]) -> Result<Self, TilecastError> {
        let expected = width as usize * height as usize;
        if luma.len() < expected {
            return Err(TilecastError::FrameTooShort {
                expected,
                actual: luma.len(),
            });
        }
        let stride = width as usize;
        let (rw, rh) = round_down(width, height);
        let mut regions = Vec::with_capacity((rw as usize / REGION_SIZE) * (rh as usize / REGION_SIZE));
        for ry in 0..rh as usize / REGION_SIZE {
            for rx in 0..rw as usize / REGION_SIZE {
                let start = ry * REGION_SIZE * stride + rx * REGION_SIZE;
                regions.push(Region::from_luma(&luma[start..], stride)?);
            }
        }
        Ok(Self {
            width: rw,
            height: rh,
            regions: Grid2D::from_vec(regions, rw as usize / REGION_SIZE, rh as usize / REGION_SIZE)?,
        })
    }

    /// Build from the committed pixels of a tile grid.
    pub fn from_tile_grid(grid: &TileGrid) -> Result<Self, TilecastError> {
        let (rw, rh) = RegionJob::regions_covered(grid);
        let mut regions = Vec::with_capacity(rw * rh);
        for ry in 0..rh {
            for rx in 0..rw {
                regions.push(RegionJob::from_tiles(grid, rx as u32, ry as u32)?.region()?);
            }
        }
        Ok(Self {
            width: (rw * REGION_SIZE) as u32,
            height: (rh * REGION_SIZE) as u32,
            regions: Grid2D::from_vec(regions, rw, rh)?,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn regions_wide(&self) -> usize {
        self.regions.width()
    }

    pub fn regions_tall(&self) -> usize {
        self.regions.height()
    }

    pub fn region(&self, x: usize, y: usize) -> Option<&Region> {
        self.regions.get(x, y)
    }

    /// Encode every region.
    pub fn encode(&self, config: &CodecConfig) -> Grid2D<Bytes> {
        Grid2D::from_fn(self.regions_wide(), self.regions_tall(), |x, y| {
            self.regions[(x, y)].encode(config.block_threshold)
        })
    }

    /// Per-region change map against `previous`, judged on the encoded
    /// streams with `config.comparison_threshold`.
    pub fn compare(&self, previous: &CompressedImage, config: &CodecConfig) -> Result<Grid2D<bool>, TilecastError> {
        if (self.width, self.height) != (previous.width, previous.height) {
            return Err(TilecastError::ImageSizeMismatch {
                left: (self.width, self.height),
                right: (previous.width, previous.height),
            });
        }
        let current = self.encode(config);
        let before = previous.encode(config);
        Ok(Grid2D::from_fn(current.width(), current.height(), |x, y| {
            compare_regions(&current[(x, y)], &before[(x, y)], config.comparison_threshold)
        }))
    }

    /// Reconstructed luma plane, `width × height` bytes row-major.
    pub fn to_luma(&self) -> Vec<u8> {
        let stride = self.width as usize;
        let mut out = vec![0u8; stride * self.height as usize];
        for (rx, ry, region) in self.regions.enumerate() {
            let pixels = region.to_luma();
            for (row, line) in pixels.chunks_exact(REGION_SIZE).enumerate() {
                let start = (ry * REGION_SIZE + row) * stride + rx * REGION_SIZE;
                out[start..start + REGION_SIZE].copy_from_slice(line);
            }
        }
        out
    }
}

fn round_down(width: u32, height: u32) -> (u32, u32) {
    let size = REGION_SIZE as u32;
    (width - width % size, height - height % size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dimensions_round_down_to_whole_regions() {
        let image = CompressedImage::new(100, 70);
        assert_eq!((image.width(), image.height()), (96, 64));
        assert_eq!((image.regions_wide(), image.regions_tall()), (3, 2));
        assert!(image.region(2, 1).is_some());
        assert!(image.region(3, 0).is_none());
    }

    #[test]
    fn flat_luma_reconstructs_exactly() {
        let luma = vec![123u8; 64 * 32];
        let image = CompressedImage::from_luma(64, 32, &luma).unwrap();
        assert_eq!(image.to_luma(), luma);
    }

    #[test]
    fn compare_flags_only_the_changed_region() {
        let config = CodecConfig::default();
        let before = vec![40u8; 64 * 64];
        let mut after = before.clone();
        // Bright square inside region (1, 1).
        for y in 40..56 {
            for x in 40..56 {
                after[y * 64 + x] = 220;
            }
        }
        let a = CompressedImage::from_luma(64, 64, &before).unwrap();
        let b = CompressedImage::from_luma(64, 64, &after).unwrap();

        let changes = b.compare(&a, &config).unwrap();
        assert!(changes[(1, 1)]);
        assert!(!changes[(0, 0)]);
        assert!(!changes[(1, 0)]);
        assert!(!changes[(0, 1)]);
        assert!(!a.compare(&a, &config).unwrap().iter().any(|&c| c));
    }

    #[test]
    fn compare_rejects_size_mismatch() {
        let a = CompressedImage::new(64, 64);
        let b = CompressedImage::new(96, 64);
        assert!(matches!(
            a.compare(&b, &CodecConfig::default()),
            Err(TilecastError::ImageSizeMismatch { .. })
        ));
    }

    #[test]
    fn short_luma_is_rejected() {
        assert!(CompressedImage::from_luma(64, 64, &[0; 100]).is_err());
    }
}

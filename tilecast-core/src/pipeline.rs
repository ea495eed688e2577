//! Glue between the delta engine and the codec.
//!
//! A codec region spans [`REGION_TILES`]² tiles. Regions with at least one
//! changed tile are gathered into [`RegionJob`]s and encoded independently,
//! which makes them natural units of work for the scheduler.

use bytes::Bytes;

use crate::codec::{CodecConfig, Region, REGION_SIZE};
use crate::delta::{TileGrid, CHUNK_SIZE};
use crate::error::TilecastError;

/// Tiles along each edge of a codec region.
pub const REGION_TILES: usize = REGION_SIZE / CHUNK_SIZE;

/// One encoded region ready to ship.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionUpdate {
    /// Column in region space.
    pub x: u32,
    /// Row in region space.
    pub y: u32,
    /// Encoded region stream.
    pub data: Bytes,
}

/// Regions with at least one changed tile, row-major.
///
/// Tiles in a trailing partial region are ignored.
pub fn dirty_regions(grid: &TileGrid) -> Vec<(u32, u32)> {
    let (rw, rh) = RegionJob::regions_covered(grid);
    let mut dirty = Vec::new();
    for ry in 0..rh {
        for rx in 0..rw {
            let any_changed = (0..REGION_TILES).any(|ty| {
                (0..REGION_TILES).any(|tx| {
                    grid[(rx * REGION_TILES + tx, ry * REGION_TILES + ty)].is_changed()
                })
            });
            if any_changed {
                dirty.push((rx as u32, ry as u32));
            }
        }
    }
    dirty
}

// ── RegionJob ────────────────────────────────────────────────────

/// The luma of one region, copied out of the tile grid so it can be encoded
/// after the grid has moved on.
#[derive(Debug, Clone)]
pub struct RegionJob {
    pub x: u32,
    pub y: u32,
    luma: Vec<u8>,
}

impl RegionJob {
    /// How many whole regions the grid covers, `(wide, tall)`.
    pub fn regions_covered(grid: &TileGrid) -> (usize, usize) {
        (grid.width() / REGION_TILES, grid.height() / REGION_TILES)
    }

    pub fn from_tiles(grid: &TileGrid, x: u32, y: u32) -> Result<Self, TilecastError> {
        let (rw, rh) = Self::regions_covered(grid);
        if x as usize >= rw || y as usize >= rh {
            return Err(TilecastError::InvalidDimensions {
                width: x,
                height: y,
                reason: "region lies outside the tile grid",
            });
        }

        let mut luma = vec![0u8; REGION_SIZE * REGION_SIZE];
        for ty in 0..REGION_TILES {
            for tx in 0..REGION_TILES {
                let tile = &grid[(x as usize * REGION_TILES + tx, y as usize * REGION_TILES + ty)];
                for row in 0..CHUNK_SIZE {
                    let start = (ty * CHUNK_SIZE + row) * REGION_SIZE + tx * CHUNK_SIZE;
                    luma[start..start + CHUNK_SIZE].copy_from_slice(tile.row(row));
                }
            }
        }
        Ok(Self { x, y, luma })
    }

    /// The gathered 32×32 luma, row-major.
    pub fn luma(&self) -> &[u8] {
        &self.luma
    }

    pub fn region(&self) -> Result<Region, TilecastError> {
        Region::from_luma(&self.luma, REGION_SIZE)
    }

    pub fn encode(&self, config: &CodecConfig) -> Result<RegionUpdate, TilecastError> {
        Ok(RegionUpdate {
            x: self.x,
            y: self.y,
            data: self.region()?.encode(config.block_threshold),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::decode_region;
    use crate::delta::{DeltaConfig, DeltaEngine};
    use crate::frame::RawFrame;
    use std::time::Duration;

    fn engine_after(frames: &[Vec<u8>], width: u32, height: u32) -> DeltaEngine {
        let mut engine = DeltaEngine::new(width, height, DeltaConfig::default()).unwrap();
        for data in frames {
            engine
                .process_frame(&RawFrame::gray(width, height, data.clone()), Duration::from_millis(100))
                .unwrap();
        }
        engine
    }

    #[test]
    fn region_spans_two_by_two_tiles() {
        assert_eq!(REGION_TILES, 2);
    }

    #[test]
    fn first_frame_dirties_every_whole_region() {
        // 80×64 → 5×4 tiles → 2×2 whole regions; the fifth tile column is partial.
        let engine = engine_after(&[vec![9u8; 80 * 64]], 80, 64);
        assert_eq!(dirty_regions(engine.committed()), vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }

    #[test]
    fn only_regions_with_changed_tiles_are_dirty() {
        let first = vec![50u8; 64 * 64];
        let mut second = first.clone();
        for y in 0..16 {
            for x in 48..64 {
                second[y * 64 + x] = 250;
            }
        }
        let engine = engine_after(&[first, second], 64, 64);
        assert_eq!(dirty_regions(engine.committed()), vec![(1, 0)]);
    }

    #[test]
    fn job_gathers_region_pixels_in_place() {
        let luma: Vec<u8> = (0..64 * 64).map(|i| ((i % 64) + (i / 64)) as u8).collect();
        let engine = engine_after(&[luma.clone()], 64, 64);
        let job = RegionJob::from_tiles(engine.committed(), 1, 1).unwrap();
        for y in 0..REGION_SIZE {
            for x in 0..REGION_SIZE {
                assert_eq!(job.luma()[y * REGION_SIZE + x], luma[(32 + y) * 64 + 32 + x]);
            }
        }
        assert!(RegionJob::from_tiles(engine.committed(), 2, 0).is_err());
    }

    #[test]
    fn encoded_update_decodes() {
        let engine = engine_after(&[vec![77u8; 64 * 64]], 64, 64);
        let update = RegionJob::from_tiles(engine.committed(), 0, 1)
            .unwrap()
            .encode(&CodecConfig::default())
            .unwrap();
        assert_eq!((update.x, update.y), (0, 1));
        let blocks = decode_region(&update.data).unwrap();
        assert!(blocks.iter().all(|b| b.to_luma() == [77; 16]));
    }
}

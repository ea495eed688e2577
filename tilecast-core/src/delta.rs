//! Tile-level change detection between consecutive frames.
//!
//! Divides the luma plane into `CHUNK_SIZE × CHUNK_SIZE` tiles and compares
//! each freshly captured tile against its committed counterpart with a
//! jitter-tolerant metric. Only tiles that differ enough, or that have gone
//! unrefreshed for longer than the configured maximum age, replace their
//! committed version; consumers read the committed grid and its per-tile
//! `changed` flags.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::error::TilecastError;
use crate::frame::RawFrame;
use crate::grid::Grid2D;
use crate::source::FrameSource;

/// Side length of a tile in pixels. Divides the 32-pixel codec region, so
/// each region is covered by exactly 2×2 tiles.
pub const CHUNK_SIZE: usize = 16;

/// Number of pixels in a tile.
pub const CHUNK_PIXELS: usize = CHUNK_SIZE * CHUNK_SIZE;

// ── Tile ─────────────────────────────────────────────────────────

/// One cell of the tracked grid: a grayscale `CHUNK_SIZE²` patch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tile {
    /// Column in tile space.
    pub x: u32,
    /// Row in tile space.
    pub y: u32,
    pixels: [u8; CHUNK_PIXELS],
    age: Duration,
    changed: bool,
}

impl Tile {
    /// A black tile at grid position `(x, y)`.
    pub fn new(x: u32, y: u32) -> Self {
        Self {
            x,
            y,
            pixels: [0; CHUNK_PIXELS],
            age: Duration::ZERO,
            changed: false,
        }
    }

    /// Top-left corner in pixel space.
    pub fn pixel_origin(&self) -> (u32, u32) {
        (self.x * CHUNK_SIZE as u32, self.y * CHUNK_SIZE as u32)
    }

    /// The whole buffer, row-major.
    pub fn pixels(&self) -> &[u8; CHUNK_PIXELS] {
        &self.pixels
    }

    /// Row `i` of the tile.
    pub fn row(&self, i: usize) -> &[u8] {
        &self.pixels[i * CHUNK_SIZE..(i + 1) * CHUNK_SIZE]
    }

    fn row_mut(&mut self, i: usize) -> &mut [u8] {
        &mut self.pixels[i * CHUNK_SIZE..(i + 1) * CHUNK_SIZE]
    }

    /// Time since this tile was last accepted.
    pub fn age(&self) -> Duration {
        self.age
    }

    /// Whether the tile was replaced during the most recent cycle.
    pub fn is_changed(&self) -> bool {
        self.changed
    }
}

impl Default for Tile {
    fn default() -> Self {
        Self::new(0, 0)
    }
}

/// The grid of tiles covering one frame.
pub type TileGrid = Grid2D<Tile>;

// ── DeltaConfig ──────────────────────────────────────────────────

/// Runtime-tunable change-detection thresholds (byte-scale intensities).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeltaConfig {
    /// Largest jitter-tolerant difference a single pixel may show.
    pub per_pixel_threshold: u32,
    /// Largest summed difference across a tile.
    pub per_tile_threshold: u32,
    /// Tiles older than this are refreshed even when unchanged.
    pub max_tile_age_ms: u64,
}

impl Default for DeltaConfig {
    fn default() -> Self {
        Self {
            per_pixel_threshold: 12,
            per_tile_threshold: 768,
            max_tile_age_ms: 10_000,
        }
    }
}

/// Outcome of comparing a candidate tile with its committed counterpart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileDiff {
    /// Close enough to keep the committed tile.
    Similar { total: u32 },
    /// One pixel moved further than the per-pixel threshold.
    PixelOverThreshold { index: usize, diff: u32 },
    /// The accumulated difference crossed the per-tile threshold.
    TotalOverThreshold { total: u32 },
}

impl TileDiff {
    pub fn is_similar(&self) -> bool {
        matches!(self, TileDiff::Similar { .. })
    }
}

impl DeltaConfig {
    pub fn max_tile_age(&self) -> Duration {
        Duration::from_millis(self.max_tile_age_ms)
    }

    /// Jitter-tolerant comparison of `candidate` (new frame) with
    /// `committed`.
    ///
    /// Each interior pixel of the candidate is matched against the committed
    /// pixel at the same flattened index and its two flattened neighbours, and
    /// the smallest absolute difference counts. A one-pixel shift between
    /// frames therefore costs nothing. The two border indices are skipped.
    pub fn compare(&self, candidate: &[u8], committed: &[u8]) -> TileDiff {
        debug_assert_eq!(candidate.len(), committed.len());
        let len = candidate.len().min(committed.len());
        let mut total: u32 = 0;

        for i in 1..len.saturating_sub(1) {
            let a = candidate[i];
            let diff = a
                .abs_diff(committed[i - 1])
                .min(a.abs_diff(committed[i]))
                .min(a.abs_diff(committed[i + 1])) as u32;
            if diff > self.per_pixel_threshold {
                return TileDiff::PixelOverThreshold { index: i, diff };
            }
            total += diff;
        }

        if total > self.per_tile_threshold {
            TileDiff::TotalOverThreshold { total }
        } else {
            TileDiff::Similar { total }
        }
    }
}

// ── DeltaEngine ──────────────────────────────────────────────────

/// Stateful change detector holding the committed and scratch tile grids.
///
/// The first cycle after construction (or [`reset`](Self::reset)) accepts
/// every tile.
pub struct DeltaEngine {
    frame_width: u32,
    frame_height: u32,
    config: DeltaConfig,
    committed: TileGrid,
    scratch: TileGrid,
    luma: Vec<u8>,
    last_cycle: Option<Instant>,
    primed: bool,
    cycles: u64,
}

impl DeltaEngine {
    /// Create an engine for frames of `frame_width × frame_height` pixels.
    ///
    /// Tiles cover the largest multiple of `CHUNK_SIZE` in each direction;
    /// the remaining margin is ignored.
    pub fn new(frame_width: u32, frame_height: u32, config: DeltaConfig) -> Result<Self, TilecastError> {
        let tiles_x = frame_width as usize / CHUNK_SIZE;
        let tiles_y = frame_height as usize / CHUNK_SIZE;
        if tiles_x == 0 || tiles_y == 0 {
            return Err(TilecastError::InvalidDimensions {
                width: frame_width,
                height: frame_height,
                reason: "frame is smaller than one tile",
            });
        }

        let make = |x: usize, y: usize| Tile::new(x as u32, y as u32);
        Ok(Self {
            frame_width,
            frame_height,
            config,
            committed: Grid2D::from_fn(tiles_x, tiles_y, make),
            scratch: Grid2D::from_fn(tiles_x, tiles_y, make),
            luma: Vec::with_capacity(frame_width as usize * frame_height as usize),
            last_cycle: None,
            primed: false,
            cycles: 0,
        })
    }

    pub fn config(&self) -> &DeltaConfig {
        &self.config
    }

    /// Replace the thresholds; takes effect on the next cycle.
    pub fn set_config(&mut self, config: DeltaConfig) {
        self.config = config;
    }

    /// Force the next cycle to accept every tile.
    pub fn reset(&mut self) {
        self.primed = false;
    }

    /// The authoritative tile grid.
    pub fn committed(&self) -> &TileGrid {
        &self.committed
    }

    /// A shareable copy of the committed grid for concurrent readers.
    pub fn snapshot(&self) -> Arc<TileGrid> {
        Arc::new(self.committed.clone())
    }

    pub fn tile_count(&self) -> usize {
        self.committed.len()
    }

    /// Tiles replaced during the most recent cycle.
    pub fn changed_count(&self) -> usize {
        self.committed.iter().filter(|t| t.changed).count()
    }

    /// Completed cycles since construction.
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Pull one frame from `source` and run a full cycle on it.
    ///
    /// Acquisition errors are returned as-is; the engine state is untouched
    /// in that case.
    pub fn capture_cycle<S>(&mut self, source: &mut S) -> Result<&TileGrid, TilecastError>
    where
        S: FrameSource + ?Sized,
    {
        let frame = source.next_frame()?;
        let now = Instant::now();
        let elapsed = self
            .last_cycle
            .map(|last| now.duration_since(last))
            .unwrap_or_default();
        self.last_cycle = Some(now);
        self.process_frame(&frame, elapsed)
    }

    /// Run a cycle on an already acquired frame, ageing unchanged tiles by
    /// `elapsed`.
    pub fn process_frame(&mut self, frame: &RawFrame, elapsed: Duration) -> Result<&TileGrid, TilecastError> {
        if (frame.width, frame.height) != (self.frame_width, self.frame_height) {
            return Err(TilecastError::FrameSizeMismatch {
                expected: (self.frame_width, self.frame_height),
                actual: (frame.width, frame.height),
            });
        }

        frame.write_luma(&mut self.luma)?;
        self.partition();
        let changed = self.commit(elapsed);
        self.cycles += 1;

        debug!(
            cycle = self.cycles,
            changed,
            tiles = self.committed.len(),
            "capture cycle complete"
        );
        Ok(&self.committed)
    }

    // ── Internal ─────────────────────────────────────────────────

    /// Copy the luma plane into the scratch grid, one tile row at a time.
    fn partition(&mut self) {
        let width = self.frame_width as usize;
        let luma = &self.luma;

        for tile in self.scratch.iter_mut() {
            let (px, py) = tile.pixel_origin();
            let (px, py) = (px as usize, py as usize);
            for row in 0..CHUNK_SIZE {
                let start = (py + row) * width + px;
                tile.row_mut(row)
                    .copy_from_slice(&luma[start..start + CHUNK_SIZE]);
            }
        }
    }

    /// Fold the scratch grid into the committed grid. Returns how many tiles
    /// were accepted.
    fn commit(&mut self, elapsed: Duration) -> usize {
        let force_all = !self.primed;
        let max_age = self.config.max_tile_age();
        let config = &self.config;
        let mut accepted = 0;

        for (committed, scratch) in self.committed.iter_mut().zip(self.scratch.iter()) {
            let over_age = committed.age > max_age;
            let update = force_all
                || over_age
                || !config.compare(&scratch.pixels, &committed.pixels).is_similar();

            if update {
                if over_age {
                    trace!(x = committed.x, y = committed.y, "tile refreshed by age");
                }
                committed.pixels = scratch.pixels;
                committed.age = Duration::ZERO;
                committed.changed = true;
                accepted += 1;
            } else {
                committed.changed = false;
                committed.age += elapsed;
            }
        }

        self.primed = true;
        accepted
    }
}

// ── Tests ────────────────────────────────────────────────────────

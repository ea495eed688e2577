//! # tilecast-core
//!
//! Building blocks for streaming a camera feed over a thin link by sending
//! only what changed.
//!
//! This crate contains:
//! - **Grid**: `Grid2D`, the row-major 2D container behind every grid
//! - **Frames**: `RawFrame`, `PixelFormat` and the `FrameSource` seam
//! - **Delta**: `DeltaEngine`, jitter-tolerant tile change detection
//! - **Scheduler**: `WorkScheduler`, a priority pool with cooperative yields
//! - **Codec**: `Block`, `Region`, `CompressedImage` and the block-table stream
//! - **Pipeline**: dirty tiles → `RegionJob` → `RegionUpdate`
//! - **Service**: `CaptureService`, the periodic capture loop
//! - **Error**: `TilecastError` and `WorkError`, `thiserror`-based
//!
//! ```text
//! FrameSource ─► DeltaEngine ─► committed TileGrid ─► snapshot (watch)
//!                                      │
//!                                      ▼
//!                               dirty_regions ─► RegionJob ─► encode ─► RegionUpdate (mpsc)
//!                                                   (scheduled above the capture loop)
//! ```

pub mod codec;
pub mod delta;
pub mod error;
pub mod frame;
pub mod grid;
pub mod meter;
pub mod pipeline;
pub mod scheduler;
pub mod service;
pub mod source;

// ── Re-exports for ergonomic usage ───────────────────────────────

pub use codec::{Block, CodecConfig, CompressedImage, Region, YuvColor};
pub use delta::{DeltaConfig, DeltaEngine, Tile, TileGrid, CHUNK_SIZE};
pub use error::{TilecastError, WorkError};
pub use frame::{PixelFormat, RawFrame};
pub use grid::Grid2D;
pub use meter::ThroughputMeter;
pub use pipeline::{dirty_regions, RegionJob, RegionUpdate};
pub use scheduler::{
    Priority, SchedulerConfig, SchedulerStats, WorkEvent, WorkHandle, WorkScheduler, WorkState,
};
pub use service::{CaptureConfig, CaptureOutputs, CaptureService, CycleReport, Tuning};
pub use source::{FrameSource, SyntheticSource};

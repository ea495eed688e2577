//! Domain-specific error types for tilecast.
//!
//! All fallible operations return `Result<T, TilecastError>`.
//! Work items report through the narrower [`WorkError`].

use thiserror::Error;

/// The canonical error type for tilecast.
#[derive(Debug, Error)]
pub enum TilecastError {
    // ── Configuration Errors ─────────────────────────────────────
    /// A grid's backing storage does not match `width * height`.
    #[error("dimension mismatch: width * height = {expected}, backing length = {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Frame or grid dimensions cannot be used.
    #[error("invalid dimensions {width}x{height}: {reason}")]
    InvalidDimensions {
        width: u32,
        height: u32,
        reason: &'static str,
    },

    // ── Frame Errors ─────────────────────────────────────────────
    /// A frame does not have the size the engine was built for.
    #[error("frame size mismatch: expected {expected:?}, got {actual:?}")]
    FrameSizeMismatch {
        expected: (u32, u32),
        actual: (u32, u32),
    },

    /// The frame buffer holds fewer bytes than its geometry requires.
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort { expected: usize, actual: usize },

    /// The camera collaborator failed to deliver a frame.
    #[error("capture failed: {0}")]
    Capture(String),

    // ── Codec Errors ─────────────────────────────────────────────
    /// A region stream ended before all announced payloads.
    #[error("region stream truncated: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    /// A region stream carries bytes past its last payload.
    #[error("region stream has {0} trailing bytes")]
    TrailingBytes(usize),

    /// A block table references a neighbour that cannot be resolved.
    #[error("invalid region: {0}")]
    InvalidRegion(&'static str),

    /// Two compressed images of different sizes were compared.
    #[error("image size mismatch: {left:?} vs {right:?}")]
    ImageSizeMismatch { left: (u32, u32), right: (u32, u32) },

    // ── Work Errors ──────────────────────────────────────────────
    /// A scheduled work item failed.
    #[error("work error: {0}")]
    Work(#[from] WorkError),

    /// Catch-all for errors that do not fit another variant.
    #[error("{0}")]
    Other(String),
}

// ── WorkError ─────────────────────────────────────────────────────

/// Typed outcome of a failed work item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkError {
    /// The item observed its cancellation flag and stopped early.
    #[error("work item was cancelled")]
    Cancelled,

    /// The item's action returned an error.
    #[error("work item failed: {0}")]
    Failed(String),

    /// The item's action panicked; the worker survived.
    #[error("work item panicked: {0}")]
    Panicked(String),

    /// A dependency was still queued and this thread is at its nesting limit.
    #[error("work item {0} could not run: nesting limit reached")]
    Blocked(u64),
}

// ── Convenient From implementations ──────────────────────────────

impl From<String> for TilecastError {
    fn from(s: String) -> Self {
        TilecastError::Other(s)
    }
}

impl From<&str> for TilecastError {
    fn from(s: &str) -> Self {
        TilecastError::Other(s.to_string())
    }
}

impl From<TilecastError> for WorkError {
    fn from(e: TilecastError) -> Self {
        match e {
            TilecastError::Work(inner) => inner,
            other => WorkError::Failed(other.to_string()),
        }
    }
}

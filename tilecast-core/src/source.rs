//! Frame acquisition seam.
//!
//! The camera driver is an external collaborator; the delta engine only
//! needs something it can pull frames from. [`SyntheticSource`] stands in for
//! a real camera in the node binary and in tests.

use crate::error::TilecastError;
use crate::frame::{PixelFormat, RawFrame};

/// Pull-based frame provider with a fixed output size.
///
/// `next_frame` may block until the device has a frame ready. Errors are
/// handed to the caller untouched; retry policy belongs to the caller.
pub trait FrameSource: Send {
    /// `(width, height)` of every frame this source produces.
    fn frame_size(&self) -> (u32, u32);

    /// Acquire the next frame.
    fn next_frame(&mut self) -> Result<RawFrame, TilecastError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn frame_size(&self) -> (u32, u32) {
        (**self).frame_size()
    }

    fn next_frame(&mut self) -> Result<RawFrame, TilecastError> {
        (**self).next_frame()
    }
}

// ── SyntheticSource ──────────────────────────────────────────────

/// Deterministic BGR test pattern: a static diagonal gradient with a bright
/// square sweeping horizontally across it.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    /// Pixels the square advances per frame (0 = static scene).
    step: u32,
    /// Side of the moving square in pixels.
    square: u32,
    frame_index: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, step: u32) -> Self {
        Self {
            width,
            height,
            step,
            square: (width.min(height) / 8).max(1),
            frame_index: 0,
        }
    }

    /// Number of frames produced so far.
    pub fn frames_produced(&self) -> u64 {
        self.frame_index
    }

    fn square_origin(&self) -> (u32, u32) {
        let travel = self.width.saturating_sub(self.square).max(1) as u64;
        let x = (self.frame_index * self.step as u64 % travel) as u32;
        let y = self.height.saturating_sub(self.square) / 2;
        (x, y)
    }
}

impl FrameSource for SyntheticSource {
    fn frame_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn next_frame(&mut self) -> Result<RawFrame, TilecastError> {
        let (sx, sy) = self.square_origin();
        let (w, h) = (self.width as usize, self.height as usize);
        let mut data = Vec::with_capacity(w * h * 3);

        for y in 0..h {
            for x in 0..w {
                let inside = (x as u32) >= sx
                    && (x as u32) < sx + self.square
                    && (y as u32) >= sy
                    && (y as u32) < sy + self.square;
                if inside {
                    data.extend_from_slice(&[240, 240, 240]);
                } else {
                    let shade = ((x + y) * 128 / (w + h).max(1)) as u8;
                    data.extend_from_slice(&[shade, shade / 2 + 32, shade]);
                }
            }
        }

        self.frame_index += 1;
        Ok(RawFrame::new(self.width, self.height, PixelFormat::Bgr8, data))
    }
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_have_advertised_size() {
        let mut src = SyntheticSource::new(64, 48, 4);
        let frame = src.next_frame().unwrap();
        assert_eq!(src.frame_size(), (64, 48));
        assert_eq!((frame.width, frame.height), (64, 48));
        assert_eq!(frame.data.len(), 64 * 48 * 3);
        assert_eq!(src.frames_produced(), 1);
    }

    #[test]
    fn static_scene_repeats_exactly() {
        let mut src = SyntheticSource::new(32, 32, 0);
        let a = src.next_frame().unwrap();
        let b = src.next_frame().unwrap();
        assert_eq!(a.data, b.data);
    }

    #[test]
    fn moving_square_changes_frames() {
        let mut src = SyntheticSource::new(64, 64, 8);
        let a = src.next_frame().unwrap();
        let b = src.next_frame().unwrap();
        assert_ne!(a.data, b.data);
    }
}

//! Raw frames handed over by the camera collaborator.
//!
//! These are the only pixel buffers that cross the acquisition boundary.
//! Everything downstream works on the grayscale luma plane produced by
//! [`RawFrame::write_luma`].

use std::time::Instant;

use crate::error::TilecastError;

// ── PixelFormat ──────────────────────────────────────────────────

/// Pixel layout of a raw frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PixelFormat {
    /// 3 bytes per pixel: Blue, Green, Red (typical webcam output).
    Bgr8,
    /// 3 bytes per pixel: Red, Green, Blue.
    Rgb8,
    /// 4 bytes per pixel: Blue, Green, Red, Alpha.
    Bgra8,
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba8,
    /// 1 byte per pixel, already grayscale.
    Gray8,
}

impl PixelFormat {
    /// Bytes consumed by a single pixel in this format.
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgr8 | PixelFormat::Rgb8 => 3,
            PixelFormat::Bgra8 | PixelFormat::Rgba8 => 4,
            PixelFormat::Gray8 => 1,
        }
    }
}

// ── RawFrame ─────────────────────────────────────────────────────

/// An uncompressed frame as delivered by the camera.
///
/// The `data` buffer holds `height` rows of `stride` bytes each.
/// `stride` may exceed `width * bytes_per_pixel` when the driver pads rows.
#[derive(Debug, Clone)]
pub struct RawFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Row pitch in **bytes**.
    pub stride: u32,
    /// Pixel layout.
    pub format: PixelFormat,
    /// Raw pixel data, `stride * height` bytes.
    pub data: Vec<u8>,
    /// Monotonic capture timestamp.
    pub timestamp: Instant,
}

impl RawFrame {
    /// Build a tightly packed frame (`stride = width * bpp`).
    pub fn new(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            stride: width * format.bytes_per_pixel() as u32,
            format,
            data,
            timestamp: Instant::now(),
        }
    }

    /// Build a tightly packed grayscale frame.
    pub fn gray(width: u32, height: u32, data: Vec<u8>) -> Self {
        Self::new(width, height, PixelFormat::Gray8, data)
    }

    /// Total byte size the bitmap occupies.
    pub fn byte_len(&self) -> usize {
        self.stride as usize * self.height as usize
    }

    /// Bytes of row `y`, padding included. The final row may be cut short
    /// when the driver omits its trailing padding.
    pub fn row(&self, y: u32) -> &[u8] {
        let start = (y as usize * self.stride as usize).min(self.data.len());
        let end = (start + self.stride as usize).min(self.data.len());
        &self.data[start..end]
    }

    /// Convert to a tightly packed luma plane of `width * height` bytes.
    ///
    /// Luma is the integer average of the three colour channels; alpha is
    /// ignored and `Gray8` rows are copied unchanged. `out` is resized and
    /// reused across calls.
    pub fn write_luma(&self, out: &mut Vec<u8>) -> Result<(), TilecastError> {
        let bpp = self.format.bytes_per_pixel();
        let row_bytes = self.width as usize * bpp;
        // The final row does not need trailing padding.
        let expected = if self.height == 0 {
            0
        } else {
            (self.height as usize - 1) * self.stride as usize + row_bytes
        };
        if self.data.len() < expected || (self.stride as usize) < row_bytes {
            return Err(TilecastError::FrameTooShort {
                expected: expected.max(self.byte_len()),
                actual: self.data.len(),
            });
        }

        let width = self.width as usize;
        out.clear();
        out.reserve(width * self.height as usize);

        for y in 0..self.height {
            let row = &self.row(y)[..row_bytes];
            match self.format {
                PixelFormat::Gray8 => out.extend_from_slice(row),
                _ => out.extend(row.chunks_exact(bpp).map(|px| {
                    ((px[0] as u16 + px[1] as u16 + px[2] as u16) / 3) as u8
                })),
            }
        }
        Ok(())
    }
}

// ── Tests ────────────────────────────────────────────────────────

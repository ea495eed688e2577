//! 4×4 pixel blocks: two colour endpoints plus a 2-bit blend per pixel.

use super::color::YuvColor;

/// How a pixel mixes the block's two endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum BlendFactor {
    /// 100% color 1.
    Color1 = 0,
    /// 66% color 1, 33% color 2.
    Mostly1 = 1,
    /// 33% color 1, 66% color 2.
    Mostly2 = 2,
    /// 100% color 2.
    Color2 = 3,
}

impl BlendFactor {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => BlendFactor::Color1,
            1 => BlendFactor::Mostly1,
            2 => BlendFactor::Mostly2,
            _ => BlendFactor::Color2,
        }
    }
}

/// A 4×4 pixel tile encoded in 64 bits.
///
/// Pixel `i = y * 4 + x` stores its [`BlendFactor`] in `selectors[i / 4]`
/// at bit shift `(i % 4) * 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Block {
    pub color1: YuvColor,
    pub color2: YuvColor,
    selectors: [u8; Block::SELECTOR_BYTES],
}

impl Block {
    pub const WIDTH: usize = 4;
    pub const HEIGHT: usize = 4;
    pub const PIXELS: usize = Self::WIDTH * Self::HEIGHT;
    const SELECTOR_BYTES: usize = Self::PIXELS * 2 / 8;
    /// Encoded size: two colour samples plus the selector bits.
    pub const SIZE_BYTES: usize = 2 * YuvColor::SIZE_BYTES + Self::SELECTOR_BYTES;

    /// A block where every pixel uses `color1`.
    pub fn solid(color: YuvColor) -> Self {
        Self {
            color1: color,
            color2: color,
            selectors: [0; Self::SELECTOR_BYTES],
        }
    }

    /// Fit a block to 16 samples.
    ///
    /// The darkest and brightest samples become the endpoints and every
    /// pixel picks the nearest of the four blends.
    pub fn from_yuv(pixels: &[YuvColor; Self::PIXELS]) -> Self {
        let mut low = pixels[0];
        let mut high = pixels[0];
        for &p in &pixels[1..] {
            if p.y() < low.y() {
                low = p;
            }
            if p.y() > high.y() {
                high = p;
            }
        }
        // Endpoints go through packing so the fit sees the stored precision.
        let low = YuvColor::new(low.y(), low.u(), low.v());
        let high = YuvColor::new(high.y(), high.u(), high.v());
        let palette = [0, 1, 2, 3].map(|k| low.blend_thirds(high, k));

        let mut block = Self {
            color1: low,
            color2: high,
            selectors: [0; Self::SELECTOR_BYTES],
        };
        for (i, &p) in pixels.iter().enumerate() {
            let mut best = 0u8;
            let mut best_dist = p.distance(palette[0]);
            for (k, &candidate) in palette.iter().enumerate().skip(1) {
                let dist = p.distance(candidate);
                if dist < best_dist {
                    best = k as u8;
                    best_dist = dist;
                }
            }
            block.set_factor(i, BlendFactor::from_bits(best));
        }
        block
    }

    /// Fit a block to 16 grayscale intensities.
    pub fn from_luma(pixels: &[u8; Self::PIXELS]) -> Self {
        Self::from_yuv(&pixels.map(YuvColor::gray))
    }

    pub fn blend_factor(&self, x: usize, y: usize) -> BlendFactor {
        let i = y * Self::WIDTH + x;
        BlendFactor::from_bits(self.selectors[i / 4] >> ((i % 4) * 2))
    }

    fn set_factor(&mut self, i: usize, factor: BlendFactor) {
        let shift = (i % 4) * 2;
        let byte = &mut self.selectors[i / 4];
        *byte = (*byte & !(0b11 << shift)) | ((factor as u8) << shift);
    }

    /// Reconstruct the colour of pixel `(x, y)`.
    pub fn decode_pixel(&self, x: usize, y: usize) -> YuvColor {
        self.color1
            .blend_thirds(self.color2, self.blend_factor(x, y) as u8)
    }

    /// Reconstructed luma of all 16 pixels, row-major.
    pub fn to_luma(&self) -> [u8; Self::PIXELS] {
        std::array::from_fn(|i| self.decode_pixel(i % Self::WIDTH, i / Self::WIDTH).y())
    }

    /// Visual distance: summed channel differences of the decoded pixels.
    pub fn difference(&self, other: &Block) -> u32 {
        if self == other {
            return 0;
        }
        (0..Self::PIXELS)
            .map(|i| {
                let (x, y) = (i % Self::WIDTH, i / Self::WIDTH);
                self.decode_pixel(x, y).distance(other.decode_pixel(x, y))
            })
            .sum()
    }

    /// Wire layout: `color1.y, color1.uv, color2.y, color2.uv, selectors[0..4]`.
    pub fn to_bytes(&self) -> [u8; Self::SIZE_BYTES] {
        let [c1h, c1l] = self.color1.to_bits().to_be_bytes();
        let [c2h, c2l] = self.color2.to_bits().to_be_bytes();
        let [s0, s1, s2, s3] = self.selectors;
        [c1h, c1l, c2h, c2l, s0, s1, s2, s3]
    }

    pub fn from_bytes(bytes: &[u8; Self::SIZE_BYTES]) -> Self {
        Self {
            color1: YuvColor::from_bits(u16::from_be_bytes([bytes[0], bytes[1]])),
            color2: YuvColor::from_bits(u16::from_be_bytes([bytes[2], bytes[3]])),
            selectors: [bytes[4], bytes[5], bytes[6], bytes[7]],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn block_is_64_bits() {
        assert_eq!(Block::SIZE_BYTES * 8, 64);
    }

    #[test]
    fn two_level_block_is_exact() {
        let mut pixels = [20u8; 16];
        for p in pixels.iter_mut().skip(8) {
            *p = 200;
        }
        let block = Block::from_luma(&pixels);
        assert_eq!(block.color1.y(), 20);
        assert_eq!(block.color2.y(), 200);
        assert_eq!(block.to_luma(), pixels);
        assert_eq!(block.blend_factor(0, 0), BlendFactor::Color1);
        assert_eq!(block.blend_factor(3, 3), BlendFactor::Color2);
    }

    #[test]
    fn intermediate_levels_use_blends() {
        let pixels: [u8; 16] = std::array::from_fn(|i| [0, 30, 60, 90][i % 4]);
        let block = Block::from_luma(&pixels);
        assert_eq!(block.blend_factor(1, 0), BlendFactor::Mostly1);
        assert_eq!(block.blend_factor(2, 2), BlendFactor::Mostly2);
        assert_eq!(block.to_luma(), pixels);
    }

    #[test]
    fn bytes_round_trip() {
        let pixels: [u8; 16] = std::array::from_fn(|i| (i * 13) as u8);
        let block = Block::from_luma(&pixels);
        let bytes = block.to_bytes();
        assert_eq!(bytes[0], block.color1.y());
        assert_eq!(Block::from_bytes(&bytes), block);
    }

    #[test]
    fn difference_is_zero_for_identical_and_symmetric() {
        let a = Block::from_luma(&[50; 16]);
        let b = Block::from_luma(&std::array::from_fn(|i| if i < 4 { 80 } else { 50 }));
        assert_eq!(a.difference(&a), 0);
        assert_eq!(a.difference(&b), b.difference(&a));
        assert_eq!(a.difference(&b), 4 * 30);
    }
}

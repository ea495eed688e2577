//! 16-bit Y:UV colour samples.

/// One colour sample: 8-bit luma plus two 4-bit chroma components woven
/// into a single byte.
///
/// U keeps its four high-order even bits (`0xAA` mask) and V's are shifted
/// into the odd positions (`0x55` mask):
///
/// ```text
/// U : u.u.u.u.
/// V : .v.v.v.v   (V >> 1)
/// UV: uvuvuvuv
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct YuvColor {
    y: u8,
    uv: u8,
}

impl YuvColor {
    /// Size of one sample on the wire.
    pub const SIZE_BYTES: usize = 2;

    const U_MASK: u8 = 0xAA;
    const V_MASK: u8 = 0x55;

    pub const fn new(y: u8, u: u8, v: u8) -> Self {
        Self {
            y,
            uv: (u & Self::U_MASK) | ((v >> 1) & Self::V_MASK),
        }
    }

    /// Neutral-chroma sample for a grayscale intensity.
    pub const fn gray(luma: u8) -> Self {
        Self::new(luma, 128, 128)
    }

    pub const fn y(self) -> u8 {
        self.y
    }

    /// The packed chroma byte.
    pub const fn uv(self) -> u8 {
        self.uv
    }

    /// U with its low-precision bits cleared.
    pub const fn u(self) -> u8 {
        self.uv & Self::U_MASK
    }

    /// V with its low-precision bits cleared.
    pub const fn v(self) -> u8 {
        (self.uv & Self::V_MASK) << 1
    }

    /// `Y` in the high byte, `UV` in the low byte.
    pub const fn to_bits(self) -> u16 {
        (self.y as u16) << 8 | self.uv as u16
    }

    pub const fn from_bits(bits: u16) -> Self {
        Self {
            y: (bits >> 8) as u8,
            uv: bits as u8,
        }
    }

    /// BT.601 studio-swing conversion from 8-bit RGB.
    pub fn from_rgb(r: u8, g: u8, b: u8) -> Self {
        let (r, g, b) = (r as f32, g as f32, b as f32);
        let y = 0.257 * r + 0.504 * g + 0.098 * b + 16.0;
        let u = -0.148 * r - 0.291 * g + 0.439 * b + 128.0;
        let v = 0.439 * r - 0.368 * g - 0.071 * b + 128.0;
        Self::new(clamp_u8(y), clamp_u8(u), clamp_u8(v))
    }

    /// Inverse of [`from_rgb`](Self::from_rgb), at the reduced chroma
    /// precision.
    pub fn to_rgb(self) -> [u8; 3] {
        let y = self.y as f32 - 16.0;
        let u = self.u() as f32 - 128.0;
        let v = self.v() as f32 - 128.0;
        [
            clamp_u8(1.164 * y + 1.596 * v),
            clamp_u8(1.164 * y - 0.392 * u - 0.813 * v),
            clamp_u8(1.164 * y + 2.017 * u),
        ]
    }

    /// Per-channel blend `(self * (3 - k) + other * k) / 3` for `k` in `0..=3`.
    pub fn blend_thirds(self, other: Self, k: u8) -> Self {
        let mix = |a: u8, b: u8| ((a as u16 * (3 - k) as u16 + b as u16 * k as u16) / 3) as u8;
        Self::new(
            mix(self.y, other.y),
            mix(self.u(), other.u()),
            mix(self.v(), other.v()),
        )
    }

    /// Sum of absolute channel differences.
    pub fn distance(self, other: Self) -> u32 {
        self.y.abs_diff(other.y) as u32
            + self.u().abs_diff(other.u()) as u32
            + self.v().abs_diff(other.v()) as u32
    }
}

fn clamp_u8(v: f32) -> u8 {
    v.round().clamp(0.0, 255.0) as u8
}

//! 32×32 pixel regions: an 8×8 block grid behind a 2-bit sharing table.
//!
//! Stream layout:
//!
//! ```text
//! ┌──────────────────────┬─────────────────────────────────────┐
//! │ block table (16 B)   │ 8-byte payload per `Own` block,     │
//! │ 64 × 2-bit BlockCode │ in row-major scan order             │
//! └──────────────────────┴─────────────────────────────────────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::TilecastError;

use super::block::Block;

/// Region edge length in pixels.
pub const REGION_SIZE: usize = 32;
/// Blocks along each region edge.
pub const BLOCKS_PER_ROW: usize = REGION_SIZE / Block::WIDTH;
/// Blocks per region.
pub const BLOCK_COUNT: usize = BLOCKS_PER_ROW * BLOCKS_PER_ROW;
/// Size of the block table prefix.
pub const TABLE_BYTES: usize = BLOCK_COUNT * 2 / 8;

// ── BlockCode ────────────────────────────────────────────────────

/// Where the decoder finds a block's contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BlockCode {
    /// Payload follows in the stream.
    #[default]
    Own = 0,
    /// Same as the block to the left.
    ShareLeft = 1,
    /// Same as the block above.
    ShareAbove = 2,
    /// Same as the block to the right.
    ShareRight = 3,
}

impl BlockCode {
    pub const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => BlockCode::Own,
            1 => BlockCode::ShareLeft,
            2 => BlockCode::ShareAbove,
            _ => BlockCode::ShareRight,
        }
    }
}

// ── BlockTable ───────────────────────────────────────────────────

/// 64 packed [`BlockCode`]s; block `i` lives in byte `i / 4` at shift `(i % 4) * 2`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockTable([u8; TABLE_BYTES]);

impl BlockTable {
    pub fn get(&self, index: usize) -> BlockCode {
        BlockCode::from_bits(self.0[index / 4] >> ((index % 4) * 2))
    }

    pub fn set(&mut self, index: usize, code: BlockCode) {
        let shift = (index % 4) * 2;
        let byte = &mut self.0[index / 4];
        *byte = (*byte & !(0b11 << shift)) | ((code as u8) << shift);
    }

    /// Number of blocks that carry their own payload.
    pub fn own_count(&self) -> usize {
        (0..BLOCK_COUNT).filter(|&i| self.get(i) == BlockCode::Own).count()
    }

    pub fn as_bytes(&self) -> &[u8; TABLE_BYTES] {
        &self.0
    }
}

impl From<[u8; TABLE_BYTES]> for BlockTable {
    fn from(bytes: [u8; TABLE_BYTES]) -> Self {
        Self(bytes)
    }
}

// ── Region ───────────────────────────────────────────────────────

/// An 8×8 grid of blocks covering 32×32 pixels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Region {
    blocks: [Block; BLOCK_COUNT],
}

impl Region {
    pub fn from_blocks(blocks: [Block; BLOCK_COUNT]) -> Self {
        Self { blocks }
    }

    /// Fit every block of a 32×32 luma window, `stride` bytes per row.
    pub fn from_luma(luma: &[u8], stride: usize) -> Result<Self, TilecastError> {
        let needed = stride * (REGION_SIZE - 1) + REGION_SIZE;
        if stride < REGION_SIZE || luma.len() < needed {
            return Err(TilecastError::FrameTooShort {
                expected: needed.max(REGION_SIZE * REGION_SIZE),
                actual: luma.len(),
            });
        }
        let blocks = std::array::from_fn(|b| {
            let (bx, by) = (b % BLOCKS_PER_ROW, b / BLOCKS_PER_ROW);
            let pixels = std::array::from_fn(|p| {
                let x = bx * Block::WIDTH + p % Block::WIDTH;
                let y = by * Block::HEIGHT + p / Block::WIDTH;
                luma[y * stride + x]
            });
            Block::from_luma(&pixels)
        });
        Ok(Self { blocks })
    }

    pub fn blocks(&self) -> &[Block; BLOCK_COUNT] {
        &self.blocks
    }

    pub fn block(&self, x: usize, y: usize) -> &Block {
        &self.blocks[y * BLOCKS_PER_ROW + x]
    }

    /// Reconstructed 32×32 luma, row-major.
    pub fn to_luma(&self) -> Vec<u8> {
        let mut out = vec![0u8; REGION_SIZE * REGION_SIZE];
        for (b, block) in self.blocks.iter().enumerate() {
            let (bx, by) = (b % BLOCKS_PER_ROW, b / BLOCKS_PER_ROW);
            for (p, value) in block.to_luma().into_iter().enumerate() {
                let x = bx * Block::WIDTH + p % Block::WIDTH;
                let y = by * Block::HEIGHT + p / Block::WIDTH;
                out[y * REGION_SIZE + x] = value;
            }
        }
        out
    }

    pub fn encode(&self, block_threshold: u32) -> Bytes {
        encode_region(&self.blocks, block_threshold)
    }

    pub fn decode(data: &[u8]) -> Result<Self, TilecastError> {
        decode_region(data).map(Self::from_blocks)
    }
}

// ── Encoding ─────────────────────────────────────────────────────

/// Encode 64 blocks, sharing any block within `block_threshold` of a
/// neighbour the decoder will already have resolved.
///
/// Candidates are tried left, then above, then right. Sharing to the right
/// is only chosen when the right neighbour is itself about to resolve
/// through the block above it, so reference chains always terminate.
pub fn encode_region(blocks: &[Block; BLOCK_COUNT], block_threshold: u32) -> Bytes {
    let similar = |a: &Block, b: &Block| a.difference(b) <= block_threshold;

    let mut table = BlockTable::default();
    let mut resolved = [Block::default(); BLOCK_COUNT];
    let mut payload = BytesMut::with_capacity(BLOCK_COUNT * Block::SIZE_BYTES);

    for i in 0..BLOCK_COUNT {
        let (x, y) = (i % BLOCKS_PER_ROW, i / BLOCKS_PER_ROW);
        let block = &blocks[i];

        let shares_left = x > 0
            && table.get(i - 1) != BlockCode::ShareRight
            && similar(block, &resolved[i - 1]);
        let shares_above = y > 0 && similar(block, &resolved[i - BLOCKS_PER_ROW]);
        // The right neighbour must be able to take the block above it.
        let shares_right = y > 0
            && x + 1 < BLOCKS_PER_ROW
            && similar(&blocks[i + 1], &resolved[i + 1 - BLOCKS_PER_ROW])
            && similar(block, &resolved[i + 1 - BLOCKS_PER_ROW]);

        let (code, value) = if shares_left {
            (BlockCode::ShareLeft, resolved[i - 1])
        } else if shares_above {
            (BlockCode::ShareAbove, resolved[i - BLOCKS_PER_ROW])
        } else if shares_right {
            (BlockCode::ShareRight, resolved[i + 1 - BLOCKS_PER_ROW])
        } else {
            payload.put_slice(&block.to_bytes());
            (BlockCode::Own, *block)
        };

        table.set(i, code);
        resolved[i] = value;
    }

    let mut out = BytesMut::with_capacity(TABLE_BYTES + payload.len());
    out.put_slice(table.as_bytes());
    out.put(payload);
    out.freeze()
}

// ── Decoding ─────────────────────────────────────────────────────

/// Decode a region stream produced by [`encode_region`].
pub fn decode_region(data: &[u8]) -> Result<[Block; BLOCK_COUNT], TilecastError> {
    let Some((table_bytes, mut payload)) = data.split_first_chunk::<TABLE_BYTES>() else {
        return Err(TilecastError::Truncated {
            expected: TABLE_BYTES,
            actual: data.len(),
        });
    };
    let table = BlockTable::from(*table_bytes);

    let expected = TABLE_BYTES + table.own_count() * Block::SIZE_BYTES;
    if data.len() < expected {
        return Err(TilecastError::Truncated {
            expected,
            actual: data.len(),
        });
    }
    if data.len() > expected {
        return Err(TilecastError::TrailingBytes(data.len() - expected));
    }

    let mut blocks = [Block::default(); BLOCK_COUNT];
    for y in 0..BLOCKS_PER_ROW {
        let row = y * BLOCKS_PER_ROW;

        for x in 0..BLOCKS_PER_ROW {
            let i = row + x;
            match table.get(i) {
                BlockCode::Own => {
                    let Some((bytes, rest)) = payload.split_first_chunk::<{ Block::SIZE_BYTES }>()
                    else {
                        return Err(TilecastError::Truncated {
                            expected,
                            actual: data.len(),
                        });
                    };
                    blocks[i] = Block::from_bytes(bytes);
                    payload = rest;
                }
                BlockCode::ShareLeft => {
                    if x == 0 {
                        return Err(TilecastError::InvalidRegion("left reference in first column"));
                    }
                    if table.get(i - 1) == BlockCode::ShareRight {
                        return Err(TilecastError::InvalidRegion(
                            "left reference to a right-sharing block",
                        ));
                    }
                    blocks[i] = blocks[i - 1];
                }
                BlockCode::ShareAbove => {
                    if y == 0 {
                        return Err(TilecastError::InvalidRegion("above reference in first row"));
                    }
                    blocks[i] = blocks[i - BLOCKS_PER_ROW];
                }
                BlockCode::ShareRight => {
                    if x + 1 == BLOCKS_PER_ROW {
                        return Err(TilecastError::InvalidRegion("right reference in last column"));
                    }
                }
            }
        }

        for x in (0..BLOCKS_PER_ROW - 1).rev() {
            let i = row + x;
            if table.get(i) == BlockCode::ShareRight {
                blocks[i] = blocks[i + 1];
            }
        }
    }

    Ok(blocks)
}

// ── Comparison ───────────────────────────────────────────────────

/// Whether two encoded regions differ by more than `threshold`.
///
/// The running total counts one per differing table entry, the absolute
/// difference of every overlapping payload byte and 255 for each payload
/// byte present in only one stream. Stops as soon as the total exceeds
/// `threshold`.
pub fn compare_regions(a: &[u8], b: &[u8], threshold: u32) -> bool {
    let code_at = |data: &[u8], i: usize| {
        data.get(i / 4)
            .map(|&byte| BlockCode::from_bits(byte >> ((i % 4) * 2)))
    };

    let mut total: u64 = 0;
    let limit = threshold as u64;

    for i in 0..BLOCK_COUNT {
        if code_at(a, i) != code_at(b, i) {
            total += 1;
            if total > limit {
                return true;
            }
        }
    }

    let pa = a.get(TABLE_BYTES..).unwrap_or_default();
    let pb = b.get(TABLE_BYTES..).unwrap_or_default();
    for (x, y) in pa.iter().zip(pb) {
        total += x.abs_diff(*y) as u64;
        if total > limit {
            return true;
        }
    }

    total += 255 * pa.len().abs_diff(pb.len()) as u64;
    total > limit
}

// ── Tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn distinct_blocks() -> [Block; BLOCK_COUNT] {
        // Striped blocks whose endpoints step by 2 luma levels.
        std::array::from_fn(|i| {
            let lo = (i * 2) as u8;
            Block::from_luma(&std::array::from_fn(|p| if p % 2 == 0 { lo } else { lo + 60 }))
        })
    }

    #[test]
    fn table_packs_two_bits_per_block() {
        let mut table = BlockTable::default();
        table.set(0, BlockCode::ShareRight);
        table.set(5, BlockCode::ShareAbove);
        assert_eq!(table.as_bytes()[0], 0b11);
        assert_eq!(table.as_bytes()[1], 0b10 << 2);
        assert_eq!(table.get(5), BlockCode::ShareAbove);
        assert_eq!(table.own_count(), 62);
    }

    #[test]
    fn distinct_blocks_are_all_own() {
        let blocks = distinct_blocks();
        let data = encode_region(&blocks, 0);
        assert_eq!(data.len(), TABLE_BYTES + BLOCK_COUNT * Block::SIZE_BYTES);
        assert!(data[..TABLE_BYTES].iter().all(|&b| b == 0));
        assert_eq!(decode_region(&data).unwrap(), blocks);
    }

    #[test]
    fn uniform_region_collapses_to_one_payload() {
        let blocks = [Block::from_luma(&[90; 16]); BLOCK_COUNT];
        let data = encode_region(&blocks, 24);
        assert_eq!(data.len(), TABLE_BYTES + Block::SIZE_BYTES);

        let table = BlockTable::from(*data.first_chunk::<TABLE_BYTES>().unwrap());
        assert_eq!(table.get(0), BlockCode::Own);
        assert_eq!(table.get(1), BlockCode::ShareLeft);
        assert_eq!(table.get(BLOCKS_PER_ROW), BlockCode::ShareAbove);
        assert_eq!(decode_region(&data).unwrap(), blocks);
    }

    #[test]
    fn right_sharing_resolves_through_the_block_above_its_neighbour() {
        let dark = Block::from_luma(&[10; 16]);
        let light = Block::from_luma(&[200; 16]);
        let mid = Block::from_luma(&[100; 16]);

        // Row 0: dark, light, mid, mid...; row 1: light, light, ...
        let mut blocks = [mid; BLOCK_COUNT];
        blocks[0] = dark;
        blocks[1] = light;
        blocks[BLOCKS_PER_ROW] = light;
        blocks[BLOCKS_PER_ROW + 1] = light;

        let data = encode_region(&blocks, 0);
        let table = BlockTable::from(*data.first_chunk::<TABLE_BYTES>().unwrap());
        assert_eq!(table.get(BLOCKS_PER_ROW), BlockCode::ShareRight);
        assert_eq!(table.get(BLOCKS_PER_ROW + 1), BlockCode::ShareAbove);
        assert_eq!(decode_region(&data).unwrap(), blocks);
    }

    #[test]
    fn lossy_sharing_stays_within_threshold() {
        let blocks: [Block; BLOCK_COUNT] =
            std::array::from_fn(|i| Block::from_luma(&[100 + (i % 3) as u8; 16]));
        let data = encode_region(&blocks, 24);
        let decoded = decode_region(&data).unwrap();
        assert!(data.len() < TABLE_BYTES + BLOCK_COUNT * Block::SIZE_BYTES);
        for (orig, dec) in blocks.iter().zip(&decoded) {
            assert!(orig.difference(dec) <= 24);
        }
    }

    #[test]
    fn length_is_validated() {
        let data = encode_region(&distinct_blocks(), 0);
        assert!(matches!(
            decode_region(&data[..TABLE_BYTES + 3]),
            Err(TilecastError::Truncated { .. })
        ));
        assert!(matches!(decode_region(&data[..4]), Err(TilecastError::Truncated { .. })));

        let mut long = data.to_vec();
        long.extend_from_slice(&[0, 0]);
        assert!(matches!(decode_region(&long), Err(TilecastError::TrailingBytes(2))));
    }

    #[test]
    fn malformed_references_are_rejected() {
        let payload = [0u8; Block::SIZE_BYTES];
        let stream = |table: BlockTable| {
            let mut v = table.as_bytes().to_vec();
            for _ in 0..table.own_count() {
                v.extend_from_slice(&payload);
            }
            v
        };

        let mut left_edge = BlockTable::default();
        left_edge.set(0, BlockCode::ShareLeft);
        assert!(matches!(decode_region(&stream(left_edge)), Err(TilecastError::InvalidRegion(_))));

        let mut top_edge = BlockTable::default();
        top_edge.set(3, BlockCode::ShareAbove);
        assert!(matches!(decode_region(&stream(top_edge)), Err(TilecastError::InvalidRegion(_))));

        let mut right_edge = BlockTable::default();
        right_edge.set(BLOCKS_PER_ROW - 1, BlockCode::ShareRight);
        assert!(matches!(decode_region(&stream(right_edge)), Err(TilecastError::InvalidRegion(_))));

        let mut cycle = BlockTable::default();
        cycle.set(10, BlockCode::ShareRight);
        cycle.set(11, BlockCode::ShareLeft);
        assert!(matches!(decode_region(&stream(cycle)), Err(TilecastError::InvalidRegion(_))));
    }

    #[test]
    fn compare_is_reflexive() {
        let data = encode_region(&distinct_blocks(), 0);
        assert!(!compare_regions(&data, &data, 0));
    }

    #[test]
    fn compare_counts_table_and_payload_differences() {
        let uniform = encode_region(&[Block::from_luma(&[90; 16]); BLOCK_COUNT], 24);
        let mut shifted = uniform.to_vec();
        // Nudge color1.y by 5.
        shifted[TABLE_BYTES] += 5;
        assert!(!compare_regions(&uniform, &shifted, 8));
        assert!(compare_regions(&uniform, &shifted, 4));

        let distinct = encode_region(&distinct_blocks(), 0);
        assert!(compare_regions(&uniform, &distinct, 8));
    }

    #[test]
    fn region_luma_round_trip_for_flat_window() {
        let luma = vec![77u8; REGION_SIZE * REGION_SIZE];
        let region = Region::from_luma(&luma, REGION_SIZE).unwrap();
        let decoded = Region::decode(&region.encode(24)).unwrap();
        assert_eq!(decoded.to_luma(), luma);
        assert!(Region::from_luma(&luma[..100], REGION_SIZE).is_err());
    }
}

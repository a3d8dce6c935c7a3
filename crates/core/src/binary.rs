//! Fixed-block binary diff codec
//!
//! Both buffers are split into blocks of `block_size` bytes (the last block
//! may be shorter). A diff stores every block of the new buffer that differs
//! from the block at the same index in the old buffer.
//!
//! Payload layout (all integers big-endian):
//! ```text
//! removed_blocks: u32   blocks(old) - blocks(new), or 0 when new is not shorter
//! final_block:    u32   byte length of the last block of new (0 if new is empty)
//! records:        (block_id: u32, bytes: [u8; min(block_size, rest)])*
//! ```
//!
//! Only the final block of the new buffer can be shorter than `block_size`,
//! and it is always the last record when emitted, so record lengths need not
//! be stored.

use crate::compression::{CompressionScheme, DEFAULT_COMPRESSION_THRESHOLD};
use crate::error::{CodecError, Result};
use crate::handler::{EncodedDiff, TypeHandler};
use bytes::{Buf, BufMut};

/// Width of the block index field in bytes
pub const BLOCK_ID_WIDTH: usize = 4;

/// Length of the payload header
pub const HEADER_LEN: usize = 8;

/// Default block size for the generic handler
pub const DEFAULT_BLOCK_SIZE: usize = 256;

/// Generic block-diff handler
#[derive(Debug, Clone)]
pub struct BlockDiffCodec {
    block_size: usize,
    compression_threshold: usize,
}

impl BlockDiffCodec {
    /// Create a codec with the given block size and compression threshold
    ///
    /// # Panics
    /// Panics if `block_size` is 0.
    pub fn new(block_size: usize, compression_threshold: usize) -> Self {
        assert!(block_size > 0, "block size must be positive");
        Self {
            block_size,
            compression_threshold,
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn compression_threshold(&self) -> usize {
        self.compression_threshold
    }

    fn block_count(&self, len: usize) -> usize {
        len.div_ceil(self.block_size)
    }

    /// Compute the uncompressed diff payload between `old` and `new`
    pub fn raw_diff(&self, old: &[u8], new: &[u8]) -> Result<Vec<u8>> {
        let new_blocks = self.block_count(new.len());
        if new_blocks > 0 && new_blocks - 1 > u32::MAX as usize {
            return Err(CodecError::BlockIndexOverflow {
                len: new.len(),
                block_size: self.block_size,
            });
        }
        let removed = self.block_count(old.len()).saturating_sub(new_blocks);
        let final_block = new.chunks(self.block_size).last().map_or(0, <[u8]>::len);

        let mut payload = Vec::with_capacity(HEADER_LEN + new.len() / 8);
        payload.put_u32(removed as u32);
        payload.put_u32(final_block as u32);

        let mut old_blocks = old.chunks(self.block_size);
        for (index, new_block) in new.chunks(self.block_size).enumerate() {
            // Blocks past the end of old are new data
            if old_blocks.next() == Some(new_block) {
                continue;
            }
            payload.put_u32(index as u32);
            payload.put_slice(new_block);
        }

        Ok(payload)
    }

    /// Apply a payload to `base`, reusing its allocation
    pub fn apply(&self, mut base: Vec<u8>, payload: &[u8]) -> Result<Vec<u8>> {
        let mut reader = payload;
        if reader.remaining() < HEADER_LEN {
            return Err(CodecError::truncated("block diff header", HEADER_LEN, reader.remaining()));
        }
        let removed = reader.get_u32() as usize;
        let final_block = reader.get_u32() as usize;
        if final_block > self.block_size {
            return Err(CodecError::Corrupt(format!(
                "final block of {final_block} bytes exceeds block size {}",
                self.block_size
            )));
        }

        // New blocks past the end of base are emitted contiguously and all but
        // the last are full, which bounds how far a valid payload can grow base
        let base_blocks = self.block_count(base.len());
        let index_limit = base_blocks + reader.remaining() / (BLOCK_ID_WIDTH + self.block_size) + 1;

        let mut blocks = base_blocks.saturating_sub(removed);
        while reader.has_remaining() {
            if reader.remaining() <= BLOCK_ID_WIDTH {
                return Err(CodecError::truncated(
                    "block record",
                    BLOCK_ID_WIDTH + 1,
                    reader.remaining(),
                ));
            }
            let index = reader.get_u32() as usize;
            if index >= index_limit {
                return Err(CodecError::Corrupt(format!(
                    "block {index} lies beyond what the payload can describe ({index_limit} blocks)"
                )));
            }
            let len = reader.remaining().min(self.block_size);
            let offset = index * self.block_size;
            if base.len() < offset + len {
                base.resize(offset + len, 0);
            }
            base[offset..offset + len].copy_from_slice(&reader[..len]);
            reader.advance(len);
            blocks = blocks.max(index + 1);
        }

        let result_len = match blocks {
            0 => 0,
            n => (n - 1) * self.block_size + final_block,
        };
        base.resize(result_len, 0);
        Ok(base)
    }
}

impl Default for BlockDiffCodec {
    fn default() -> Self {
        Self::new(DEFAULT_BLOCK_SIZE, DEFAULT_COMPRESSION_THRESHOLD)
    }
}

impl TypeHandler for BlockDiffCodec {
    fn name(&self) -> &'static str {
        "block"
    }

    fn diff(&self, old: &[u8], new: &[u8]) -> Result<Option<EncodedDiff>> {
        let payload = self.raw_diff(old, new)?;
        if payload.len() == HEADER_LEN && old.len() == new.len() {
            return Ok(None);
        }
        let scheme = CompressionScheme::for_payload(payload.len(), self.compression_threshold);
        Ok(Some(EncodedDiff { payload, scheme }))
    }

    fn patch(&self, base: Vec<u8>, payload: &[u8]) -> Result<Vec<u8>> {
        self.apply(base, payload)
    }

    fn init_compression(&self, data: &[u8]) -> CompressionScheme {
        CompressionScheme::for_payload(data.len(), self.compression_threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    fn roundtrip(codec: &BlockDiffCodec, old: &[u8], new: &[u8]) {
        let payload = codec.raw_diff(old, new).unwrap();
        let patched = codec.apply(old.to_vec(), &payload).unwrap();
        assert_eq!(
            patched,
            new,
            "block size {} old {} new {}",
            codec.block_size(),
            old.len(),
            new.len()
        );
    }

    #[test]
    fn test_roundtrip_length_grid() {
        let mut rng = ChaCha8Rng::seed_from_u64(0x5eed);
        for block_size in [1usize, 16, 256] {
            let codec = BlockDiffCodec::new(block_size, DEFAULT_COMPRESSION_THRESHOLD);
            let lengths = [
                0,
                1,
                block_size,
                block_size + 1,
                block_size * 3,
                block_size * 3 + block_size / 2 + 1,
                block_size * 8 - 1,
            ];
            for &old_len in &lengths {
                for &new_len in &lengths {
                    let old: Vec<u8> = (0..old_len).map(|_| rng.gen()).collect();
                    // Keep a shared prefix so some blocks match
                    let mut new: Vec<u8> = old.iter().copied().take(new_len).collect();
                    new.resize(new_len, 0xAB);
                    if let Some(byte) = new.get_mut(new_len / 2) {
                        *byte ^= 0xFF;
                    }
                    roundtrip(&codec, &old, &new);
                    // Entirely unrelated content
                    let fresh: Vec<u8> = (0..new_len).map(|_| rng.gen()).collect();
                    roundtrip(&codec, &old, &fresh);
                }
            }
        }
    }

    #[test]
    fn test_identical_buffers_emit_header_only() {
        let codec = BlockDiffCodec::new(16, 1024);
        let data = vec![9u8; 100];
        let payload = codec.raw_diff(&data, &data).unwrap();
        assert_eq!(payload.len(), HEADER_LEN);
        assert!(codec.diff(&data, &data).unwrap().is_none());
    }

    #[test]
    fn test_single_block_change_emits_one_record() {
        let codec = BlockDiffCodec::new(16, 1024);
        let old = vec![0u8; 64];
        let mut new = old.clone();
        new[37] = 1;
        let payload = codec.raw_diff(&old, &new).unwrap();
        assert_eq!(payload.len(), HEADER_LEN + BLOCK_ID_WIDTH + 16);
        assert_eq!(&payload[8..12], &2u32.to_be_bytes());
    }

    #[test]
    fn test_empty_old_emits_every_block() {
        let codec = BlockDiffCodec::new(16, 1024);
        let new = vec![5u8; 40];
        let payload = codec.raw_diff(&[], &new).unwrap();
        assert_eq!(payload.len(), HEADER_LEN + 3 * BLOCK_ID_WIDTH + 40);
        assert_eq!(codec.apply(Vec::new(), &payload).unwrap(), new);
    }

    #[test]
    fn test_whole_block_truncation_needs_no_records() {
        let codec = BlockDiffCodec::new(16, 1024);
        let old: Vec<u8> = (0..64).collect();
        let new = old[..32].to_vec();
        let payload = codec.raw_diff(&old, &new).unwrap();
        assert_eq!(payload.len(), HEADER_LEN);
        assert_eq!(&payload[0..4], &2u32.to_be_bytes());
        assert_eq!(&payload[4..8], &16u32.to_be_bytes());
        assert_eq!(codec.apply(old, &payload).unwrap(), new);
    }

    #[test]
    fn test_partial_final_block_shrink() {
        let codec = BlockDiffCodec::new(16, 1024);
        let old: Vec<u8> = (0..48).collect();
        let new = old[..40].to_vec();
        let payload = codec.raw_diff(&old, &new).unwrap();
        assert_eq!(&payload[0..4], &0u32.to_be_bytes());
        assert_eq!(&payload[4..8], &8u32.to_be_bytes());
        assert_eq!(codec.apply(old, &payload).unwrap(), new);
    }

    #[test]
    fn test_patch_grows_short_base() {
        let codec = BlockDiffCodec::new(4, 1024);
        let mut payload = Vec::new();
        payload.put_u32(0);
        payload.put_u32(4);
        payload.put_u32(5);
        payload.put_slice(b"tail");
        let patched = codec.apply(b"head".to_vec(), &payload).unwrap();
        assert_eq!(patched.len(), 24);
        assert_eq!(&patched[..4], b"head");
        assert_eq!(&patched[20..], b"tail");
    }

    #[test]
    fn test_no_stale_bytes_after_shrink() {
        let codec = BlockDiffCodec::new(8, 1024);
        let old = vec![0xEEu8; 30];
        let new = vec![0x11u8; 3];
        let payload = codec.raw_diff(&old, &new).unwrap();
        let patched = codec.apply(old, &payload).unwrap();
        assert_eq!(patched, new);
    }

    #[test]
    fn test_malformed_payloads() {
        let codec = BlockDiffCodec::new(16, 1024);
        assert!(codec.apply(Vec::new(), &[0, 0, 0]).is_err());

        let mut oversized_final = Vec::new();
        oversized_final.put_u32(0);
        oversized_final.put_u32(17);
        assert!(codec.apply(Vec::new(), &oversized_final).is_err());

        let mut far_index = Vec::new();
        far_index.put_u32(0);
        far_index.put_u32(16);
        far_index.put_u32(0x0FFF_FFFF);
        far_index.put_slice(&[1u8; 16]);
        assert!(matches!(codec.apply(Vec::new(), &far_index), Err(CodecError::Corrupt(_))));

        let mut dangling_id = Vec::new();
        dangling_id.put_u32(0);
        dangling_id.put_u32(1);
        dangling_id.put_u16(7);
        assert!(codec.apply(Vec::new(), &dangling_id).is_err());
    }

    #[test]
    fn test_appended_blocks_within_index_limit() {
        // Growth from an empty base puts every block at the limit's edge
        for block_size in [1usize, 3, 16] {
            let codec = BlockDiffCodec::new(block_size, 1024);
            for len in [1usize, block_size, block_size * 5 + 1, 300] {
                let new: Vec<u8> = (0..len).map(|i| i as u8).collect();
                let payload = codec.raw_diff(&[], &new).unwrap();
                assert_eq!(codec.apply(Vec::new(), &payload).unwrap(), new);
                let base = vec![7u8; block_size * 2];
                let payload = codec.raw_diff(&base, &new).unwrap();
                assert_eq!(codec.apply(base, &payload).unwrap(), new);
            }
        }
    }

    #[test]
    fn test_payload_compression_policy() {
        let codec = BlockDiffCodec::new(16, 64);
        let small = codec.diff(&[0u8; 16], &[1u8; 16]).unwrap().unwrap();
        assert_eq!(small.scheme, CompressionScheme::Identity);
        let large = codec.diff(&[0u8; 160], &[1u8; 160]).unwrap().unwrap();
        assert_eq!(large.scheme, CompressionScheme::Deflate);
    }
}

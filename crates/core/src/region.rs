//! Structure-aware diff codec for sector-addressed region files
//!
//! A region file starts with two 4 KiB header sectors:
//! ```text
//! 0x0000  1024 × { offset: u24 BE (sectors), sector_count: u8 }
//! 0x1000  1024 × { timestamp: u32 BE }
//! ```
//! A record at sector `offset` is `{ length: u32 BE, tag: u8, payload: [u8; length - 1] }`,
//! where `tag` names the record's own compression.
//!
//! Diff payload (big-endian), one entry per changed slot:
//! ```text
//! slot: u32, offset: u32, sector_count: u8, timestamp: u32,
//! [ mode: u8, tag: u8, length: u32, nested: [u8; length] ]   only when the slot carries new content
//! ```
//! With [`RECORD_DIFF`], `nested` is a block diff of the decompressed record
//! payloads. When the record cannot be rebuilt byte-for-byte by recompression
//! (foreign encoder, unknown tag), the mode is [`RECORD_VERBATIM`] and
//! `nested` is the stored payload itself. `tag` is always the record's own
//! tag byte, copied unchanged.

use crate::binary::BlockDiffCodec;
use crate::compression::{CompressionScheme, DEFAULT_COMPRESSION_THRESHOLD};
use crate::error::{CodecError, Result};
use crate::handler::{EncodedDiff, TypeHandler};
use bytes::{Buf, BufMut};
use flate2::read::{GzDecoder, ZlibDecoder};
use flate2::write::{GzEncoder, ZlibEncoder};
use flate2::Compression;
use std::io::{Read, Write};

/// Addressing unit of the data region
pub const SECTOR_SIZE: usize = 4096;

/// Number of header slots
pub const SLOT_COUNT: usize = 1024;

/// Sectors occupied by the location and timestamp tables
pub const HEADER_SECTORS: u32 = 2;

/// Byte length of the header
pub const HEADER_LEN: usize = HEADER_SECTORS as usize * SECTOR_SIZE;

/// Nested record is a block diff of the decompressed payload
pub const RECORD_DIFF: u8 = 0;

/// Nested record is the stored payload, carried as-is
pub const RECORD_VERBATIM: u8 = 1;

const TIMESTAMP_TABLE: usize = SECTOR_SIZE;
const SLOT_ENTRY_LEN: usize = 4 + 4 + 1 + 4;
const NESTED_HEADER_LEN: usize = 1 + 1 + 4;
const MAX_OFFSET: u32 = 0x00FF_FFFF;

/// Block size used for nested record diffs
pub const DEFAULT_RECORD_BLOCK_SIZE: usize = 16;

/// Location and timestamp of one slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slot {
    /// First sector of the record
    pub offset: u32,
    /// Sectors reserved for the record; 0 means absent
    pub sectors: u8,
    /// Last modification time written by the producer
    pub timestamp: u32,
}

impl Slot {
    pub fn is_empty(&self) -> bool {
        self.sectors == 0
    }

    /// Sector just past the record
    fn end(&self) -> u32 {
        self.offset + u32::from(self.sectors)
    }
}

/// Compression applied to an individual record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordCompression {
    Gzip = 1,
    Zlib = 2,
    Uncompressed = 3,
}

impl RecordCompression {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Gzip),
            2 => Some(Self::Zlib),
            3 => Some(Self::Uncompressed),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }

    pub fn compress(self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
            Self::Zlib => {
                let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
            Self::Uncompressed => Ok(data.to_vec()),
        }
    }

    pub fn decompress(self, data: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        match self {
            Self::Gzip => {
                GzDecoder::new(data).read_to_end(&mut out)?;
            }
            Self::Zlib => {
                ZlibDecoder::new(data).read_to_end(&mut out)?;
            }
            Self::Uncompressed => out.extend_from_slice(data),
        }
        Ok(out)
    }
}

/// A record as stored in the file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record<'a> {
    pub tag: u8,
    pub data: &'a [u8],
}

impl Record<'_> {
    /// Decompressed payload, if the tag is understood and the data inflates
    fn plain(&self) -> Option<Vec<u8>> {
        let compression = RecordCompression::from_tag(self.tag)?;
        compression.decompress(self.data).ok()
    }
}

/// Slot table parsed from a region buffer
///
/// Rebuilt from the raw bytes on every read; never patched in place.
#[derive(Debug)]
pub struct RegionView<'a> {
    bytes: &'a [u8],
    slots: Vec<Slot>,
}

impl<'a> RegionView<'a> {
    pub fn parse(bytes: &'a [u8]) -> Result<Self> {
        if bytes.len() < HEADER_LEN {
            return Err(CodecError::truncated("region header", HEADER_LEN, bytes.len()));
        }
        let mut locations = &bytes[..TIMESTAMP_TABLE];
        let mut timestamps = &bytes[TIMESTAMP_TABLE..HEADER_LEN];
        let slots = (0..SLOT_COUNT)
            .map(|_| {
                let location = locations.get_u32();
                Slot {
                    offset: location >> 8,
                    sectors: (location & 0xFF) as u8,
                    timestamp: timestamps.get_u32(),
                }
            })
            .collect();
        Ok(Self { bytes, slots })
    }

    pub fn slot(&self, index: usize) -> Slot {
        self.slots[index]
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Stored record of a slot
    ///
    /// Empty slots and slots pointing into the header have no record.
    pub fn record(&self, index: usize) -> Result<Option<Record<'a>>> {
        let slot = self.slots[index];
        if slot.is_empty() || slot.offset < HEADER_SECTORS {
            return Ok(None);
        }
        let start = slot.offset as usize * SECTOR_SIZE;
        let Some(mut header) = self.bytes.get(start..start + 5) else {
            return Err(CodecError::Corrupt(format!(
                "slot {index} points past the end of the file (sector {})",
                slot.offset
            )));
        };
        let length = header.get_u32() as usize;
        let tag = header.get_u8();
        if length == 0 {
            return Err(CodecError::Corrupt(format!("slot {index} has a zero-length record")));
        }
        let data = self
            .bytes
            .get(start + 5..start + 4 + length)
            .ok_or_else(|| {
                CodecError::Corrupt(format!("slot {index} record of {length} bytes is truncated"))
            })?;
        Ok(Some(Record { tag, data }))
    }
}

/// Region-file handler
#[derive(Debug, Clone)]
pub struct RegionCodec {
    records: BlockDiffCodec,
    compression_threshold: usize,
}

impl RegionCodec {
    pub fn new(record_block_size: usize, compression_threshold: usize) -> Self {
        Self {
            records: BlockDiffCodec::new(record_block_size, compression_threshold),
            compression_threshold,
        }
    }

    /// Uncompressed diff payload between two region buffers
    pub fn raw_diff(&self, old: &[u8], new: &[u8]) -> Result<Vec<u8>> {
        let old_view = RegionView::parse(old)?;
        let new_view = RegionView::parse(new)?;
        let mut payload = Vec::new();

        for index in 0..SLOT_COUNT {
            let before = old_view.slot(index);
            let after = new_view.slot(index);
            if before == after {
                continue;
            }
            payload.put_u32(index as u32);
            payload.put_u32(after.offset);
            payload.put_u8(after.sectors);
            payload.put_u32(after.timestamp);

            let old_record = old_view.record(index)?;
            if carries_content(before, old_record.is_some(), after) {
                let (mode, tag, nested) = self.encode_record(old_record, new_view.record(index)?)?;
                payload.put_u8(mode);
                payload.put_u8(tag);
                payload.put_u32(nested.len() as u32);
                payload.put_slice(&nested);
            }
        }

        Ok(payload)
    }

    fn encode_record(&self, old: Option<Record<'_>>, new: Option<Record<'_>>) -> Result<(u8, u8, Vec<u8>)> {
        let Some(new) = new else {
            return Ok((RECORD_VERBATIM, RecordCompression::Uncompressed.tag(), Vec::new()));
        };
        let verbatim = || -> Result<(u8, u8, Vec<u8>)> { Ok((RECORD_VERBATIM, new.tag, new.data.to_vec())) };

        let Some(compression) = RecordCompression::from_tag(new.tag) else {
            return verbatim();
        };
        let Some(plain) = new.plain() else {
            return verbatim();
        };
        if compression.compress(&plain)? != new.data {
            tracing::trace!(tag = new.tag, "record not reproducible by recompression");
            return verbatim();
        }

        let base = old.and_then(|record| record.plain()).unwrap_or_default();
        Ok((RECORD_DIFF, new.tag, self.records.raw_diff(&base, &plain)?))
    }

    /// Apply a diff payload to a region buffer
    pub fn apply(&self, base: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
        let view = RegionView::parse(base)?;
        let mut out = vec![0u8; HEADER_LEN];
        let mut touched = vec![false; SLOT_COUNT];
        let mut end = HEADER_SECTORS;
        let mut reader = payload;

        while reader.has_remaining() {
            if reader.remaining() < SLOT_ENTRY_LEN {
                return Err(CodecError::truncated("region slot entry", SLOT_ENTRY_LEN, reader.remaining()));
            }
            let index = reader.get_u32() as usize;
            let slot = Slot {
                offset: reader.get_u32(),
                sectors: reader.get_u8(),
                timestamp: reader.get_u32(),
            };
            if index >= SLOT_COUNT {
                return Err(CodecError::Corrupt(format!("slot index {index} out of range")));
            }
            if slot.offset > MAX_OFFSET {
                return Err(CodecError::Corrupt(format!("slot {index} offset {} exceeds 24 bits", slot.offset)));
            }
            if std::mem::replace(&mut touched[index], true) {
                return Err(CodecError::Corrupt(format!("slot {index} listed twice")));
            }

            write_slot(&mut out, index, slot);
            let base_record = view.record(index)?;

            if carries_content(view.slot(index), base_record.is_some(), slot) {
                if reader.remaining() < NESTED_HEADER_LEN {
                    return Err(CodecError::truncated(
                        "nested record header",
                        NESTED_HEADER_LEN,
                        reader.remaining(),
                    ));
                }
                let mode = reader.get_u8();
                let tag = reader.get_u8();
                let len = reader.get_u32() as usize;
                if reader.remaining() < len {
                    return Err(CodecError::truncated("nested record", len, reader.remaining()));
                }
                let nested = &reader[..len];
                let data = self.decode_record(base_record, mode, tag, nested)?;
                reader.advance(len);

                if slot.offset >= HEADER_SECTORS {
                    write_record(&mut out, slot.offset, tag, &data);
                    end = end.max(slot.end());
                }
            } else if !slot.is_empty() && slot.offset >= HEADER_SECTORS {
                // Same content, possibly moved
                if let Some(record) = base_record {
                    write_record(&mut out, slot.offset, record.tag, record.data);
                    end = end.max(slot.end());
                }
            }
        }

        for (index, was_touched) in touched.iter().enumerate() {
            if *was_touched {
                continue;
            }
            let slot = view.slot(index);
            write_slot(&mut out, index, slot);
            if let Some(record) = view.record(index)? {
                write_record(&mut out, slot.offset, record.tag, record.data);
                end = end.max(slot.end());
            }
        }

        out.resize(end as usize * SECTOR_SIZE, 0);
        Ok(out)
    }

    fn decode_record(&self, base: Option<Record<'_>>, mode: u8, tag: u8, nested: &[u8]) -> Result<Vec<u8>> {
        match mode {
            RECORD_VERBATIM => Ok(nested.to_vec()),
            RECORD_DIFF => {
                let compression =
                    RecordCompression::from_tag(tag).ok_or(CodecError::UnsupportedRecordCompression(tag))?;
                let plain_base = base.and_then(|record| record.plain()).unwrap_or_default();
                let plain = self.records.apply(plain_base, nested)?;
                compression.compress(&plain)
            }
            other => Err(CodecError::Corrupt(format!("unknown nested record mode {other}"))),
        }
    }
}

impl Default for RegionCodec {
    fn default() -> Self {
        Self::new(DEFAULT_RECORD_BLOCK_SIZE, DEFAULT_COMPRESSION_THRESHOLD)
    }
}

impl TypeHandler for RegionCodec {
    fn name(&self) -> &'static str {
        "region"
    }

    fn diff(&self, old: &[u8], new: &[u8]) -> Result<Option<EncodedDiff>> {
        let payload = self.raw_diff(old, new)?;
        if payload.is_empty() {
            return Ok(None);
        }
        let scheme = CompressionScheme::for_payload(payload.len(), self.compression_threshold);
        Ok(Some(EncodedDiff { payload, scheme }))
    }

    fn patch(&self, base: Vec<u8>, payload: &[u8]) -> Result<Vec<u8>> {
        self.apply(&base, payload)
    }

    fn init_compression(&self, _data: &[u8]) -> CompressionScheme {
        CompressionScheme::Deflate
    }

    fn is_valid(&self, data: &[u8]) -> bool {
        RegionView::parse(data).is_ok()
    }

    fn equivalent(&self, combined: &[u8], expected: &[u8]) -> bool {
        let (Ok(combined), Ok(expected)) = (RegionView::parse(combined), RegionView::parse(expected)) else {
            return false;
        };
        for index in 0..SLOT_COUNT {
            let slot = expected.slot(index);
            if combined.slot(index) != slot {
                tracing::debug!(slot = index, "region slot header mismatch");
                return false;
            }
            if slot.is_empty() {
                continue;
            }
            match (combined.record(index), expected.record(index)) {
                (Ok(a), Ok(b)) if a == b => {}
                _ => {
                    tracing::debug!(slot = index, "region record mismatch");
                    return false;
                }
            }
        }
        true
    }
}

/// Whether a changed slot ships record content in the diff
///
/// Evaluated identically by diff (against old) and patch (against base),
/// which hold the same bytes.
fn carries_content(base: Slot, base_has_record: bool, new: Slot) -> bool {
    !new.is_empty() && (base.timestamp != new.timestamp || !base_has_record)
}

fn write_slot(out: &mut [u8], index: usize, slot: Slot) {
    let location = (slot.offset << 8) | u32::from(slot.sectors);
    out[index * 4..index * 4 + 4].copy_from_slice(&location.to_be_bytes());
    let ts = TIMESTAMP_TABLE + index * 4;
    out[ts..ts + 4].copy_from_slice(&slot.timestamp.to_be_bytes());
}

fn write_record(out: &mut Vec<u8>, offset: u32, tag: u8, data: &[u8]) {
    let start = offset as usize * SECTOR_SIZE;
    let needed = start + 5 + data.len();
    if out.len() < needed {
        out.resize(needed, 0);
    }
    out[start..start + 4].copy_from_slice(&(data.len() as u32 + 1).to_be_bytes());
    out[start + 4] = tag;
    out[start + 5..needed].copy_from_slice(data);
}

//! Self-describing compression schemes for stored artifacts
//!
//! A scheme's id is written into every artifact name, so the id space is a
//! permanent, append-only registry:
//!
//! | id   | scheme                              |
//! |------|-------------------------------------|
//! | `""` | identity (stored as-is)             |
//! | `"z"`| raw deflate stream, no checksum     |
//!
//! The id `r` is reserved: it marks removal artifacts in the name grammar.

use crate::error::{CodecError, Result};
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::fmt;
use std::io::{Read, Write};

/// Default payload size (bytes) at or above which callers compress
pub const DEFAULT_COMPRESSION_THRESHOLD: usize = 1024;

/// Reversible byte transform applied to artifact payloads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CompressionScheme {
    /// Pass-through
    #[default]
    Identity,
    /// Raw deflate
    Deflate,
}

impl CompressionScheme {
    /// Every scheme this release can read
    pub const ALL: [CompressionScheme; 2] = [CompressionScheme::Identity, CompressionScheme::Deflate];

    /// Resolve a scheme from the id and flags found in an artifact name
    pub fn from_id(id: &str, flags: &str) -> Result<Self> {
        ensure_alphanumeric(id)?;
        ensure_alphanumeric(flags)?;
        // Neither scheme consumes flags yet
        match id {
            "" => Ok(Self::Identity),
            "z" => Ok(Self::Deflate),
            other => Err(CodecError::UnknownCompression(other.to_string())),
        }
    }

    /// Short alphanumeric id; empty means "no compression"
    pub fn id(&self) -> &'static str {
        match self {
            Self::Identity => "",
            Self::Deflate => "z",
        }
    }

    /// Per-scheme parameters, reserved for future use
    pub fn flags(&self) -> &'static str {
        ""
    }

    /// Caller-side policy: compress only payloads of at least `threshold` bytes
    pub fn for_payload(len: usize, threshold: usize) -> Self {
        if len >= threshold {
            Self::Deflate
        } else {
            Self::Identity
        }
    }

    pub fn compress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Identity => Ok(data.to_vec()),
            Self::Deflate => {
                let mut encoder =
                    DeflateEncoder::new(Vec::with_capacity(data.len() / 2), Compression::default());
                encoder.write_all(data)?;
                Ok(encoder.finish()?)
            }
        }
    }

    pub fn decompress(&self, data: &[u8]) -> Result<Vec<u8>> {
        match self {
            Self::Identity => Ok(data.to_vec()),
            Self::Deflate => {
                let mut decoder = DeflateDecoder::new(data);
                let mut out = Vec::with_capacity(data.len() * 2);
                decoder.read_to_end(&mut out)?;
                Ok(out)
            }
        }
    }
}

impl fmt::Display for CompressionScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "identity"),
            Self::Deflate => write!(f, "deflate"),
        }
    }
}

fn ensure_alphanumeric(token: &str) -> Result<()> {
    if token.bytes().all(|b| b.is_ascii_alphanumeric()) {
        Ok(())
    } else {
        Err(CodecError::NotAlphanumeric(token.to_string()))
    }
}

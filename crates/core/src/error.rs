//! Error types for the chainback codecs

use thiserror::Error;

/// Result type alias for codec operations
pub type Result<T> = std::result::Result<T, CodecError>;

/// Errors raised while encoding, decoding or applying stored artifacts
#[derive(Error, Debug)]
pub enum CodecError {
    /// An artifact file name does not follow `rev.(r|id-flags).name`
    #[error("Malformed artifact name '{name}': {reason}")]
    MalformedName { name: String, reason: &'static str },

    /// A compression id that no release has ever written
    #[error("Unknown compression scheme id '{0}'")]
    UnknownCompression(String),

    /// Compression ids and flags are restricted to `[A-Za-z0-9]*`
    #[error("Compression token '{0}' is not alphanumeric")]
    NotAlphanumeric(String),

    /// A diff payload ended before a complete field could be read
    #[error("Truncated {what}: need {needed} bytes, {available} available")]
    Truncated {
        what: &'static str,
        needed: usize,
        available: usize,
    },

    /// A diff payload is structurally invalid
    #[error("Corrupt payload: {0}")]
    Corrupt(String),

    /// A region record uses an inner compression this codec cannot rebuild
    #[error("Unsupported region record compression tag {0}")]
    UnsupportedRecordCompression(u8),

    /// More blocks than the 4-byte block id can address
    #[error("Buffer of {len} bytes exceeds the addressable block range for block size {block_size}")]
    BlockIndexOverflow { len: usize, block_size: usize },

    /// `reconstruct` was handed an empty chain
    #[error("Cannot reconstruct a file from an empty artifact chain")]
    EmptyChain,

    /// Compression or decompression I/O failure
    #[error("Compression I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CodecError {
    pub(crate) fn malformed(name: &str, reason: &'static str) -> Self {
        Self::MalformedName {
            name: name.to_string(),
            reason,
        }
    }

    pub(crate) fn truncated(what: &'static str, needed: usize, available: usize) -> Self {
        Self::Truncated {
            what,
            needed,
            available,
        }
    }
}

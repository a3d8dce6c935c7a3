//! Storage codecs for chainback
//!
//! This crate provides:
//! - Self-describing compression schemes for stored artifacts
//! - The artifact file-name grammar
//! - A fixed-block binary diff codec
//! - A structure-aware diff codec for region files
//! - The per-format handler trait and its extension dispatch table

pub mod binary;
pub mod compression;
pub mod error;
pub mod handler;
pub mod naming;
pub mod region;

// Re-exports
pub use binary::BlockDiffCodec;
pub use compression::{CompressionScheme, DEFAULT_COMPRESSION_THRESHOLD};
pub use error::{CodecError, Result};
pub use handler::{EncodedDiff, HandlerRegistry, StoredArtifact, TypeHandler};
pub use naming::ArtifactName;
pub use region::{RecordCompression, RegionCodec};

//! Artifact file names
//!
//! Every stored artifact carries its metadata in its file name:
//!
//! ```text
//! <revision>.r.<name>          removal marker
//! <revision>.<id>-<flags>.<name>  snapshot or diff
//! ```
//!
//! The codec never looks at file contents.

use crate::compression::CompressionScheme;
use crate::error::{CodecError, Result};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

const REMOVED_MARKER: &str = "r";

/// Metadata decoded from (or encoded into) an artifact file name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArtifactName {
    /// Revision within the generation that wrote this artifact
    pub revision: u32,
    /// Whether this artifact marks the file as deleted
    pub removed: bool,
    /// Scheme the payload is stored with (identity for removal markers)
    pub compression: CompressionScheme,
    /// Base name of the original file
    pub name: String,
}

impl ArtifactName {
    /// Name for a snapshot or diff payload
    pub fn stored(revision: u32, name: impl Into<String>, compression: CompressionScheme) -> Self {
        Self {
            revision,
            removed: false,
            compression,
            name: name.into(),
        }
    }

    /// Name for a zero-length removal marker
    pub fn removal(revision: u32, name: impl Into<String>) -> Self {
        Self {
            revision,
            removed: true,
            compression: CompressionScheme::Identity,
            name: name.into(),
        }
    }

    /// Encode into a file name
    pub fn to_file_name(&self) -> String {
        if self.removed {
            format!("{}.{}.{}", self.revision, REMOVED_MARKER, self.name)
        } else {
            format!(
                "{}.{}-{}.{}",
                self.revision,
                self.compression.id(),
                self.compression.flags(),
                self.name
            )
        }
    }

    /// Decode a file name
    pub fn parse(file_name: &str) -> Result<Self> {
        let mut parts = file_name.splitn(3, '.');
        let revision_token = parts.next().unwrap_or_default();
        let (Some(meta), Some(name)) = (parts.next(), parts.next()) else {
            return Err(CodecError::malformed(file_name, "expected at least three '.'-separated segments"));
        };

        if revision_token.is_empty() || !revision_token.bytes().all(|b| b.is_ascii_digit()) {
            return Err(CodecError::malformed(file_name, "revision is not an integer"));
        }
        let revision = revision_token
            .parse::<u32>()
            .map_err(|_| CodecError::malformed(file_name, "revision out of range"))?;

        if name.is_empty() {
            return Err(CodecError::malformed(file_name, "original name is empty"));
        }

        if meta == REMOVED_MARKER {
            return Ok(Self::removal(revision, name));
        }

        let Some((id, flags)) = meta.split_once('-') else {
            return Err(CodecError::malformed(file_name, "compression segment lacks '-'"));
        };
        let compression = CompressionScheme::from_id(id, flags)?;

        Ok(Self::stored(revision, name, compression))
    }

    /// Chain order: by revision, with a removal sorting before a stored
    /// artifact of the same revision
    pub fn chain_cmp(&self, other: &Self) -> Ordering {
        self.revision
            .cmp(&other.revision)
            .then_with(|| other.removed.cmp(&self.removed))
    }
}

impl fmt::Display for ArtifactName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_file_name())
    }
}

impl FromStr for ArtifactName {
    type Err = CodecError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

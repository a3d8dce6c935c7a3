//! Per-format diff handlers and their dispatch table

use crate::binary::BlockDiffCodec;
use crate::compression::CompressionScheme;
use crate::error::{CodecError, Result};
use crate::naming::ArtifactName;
use ahash::AHashMap;
use std::path::Path;
use std::sync::Arc;

/// A diff payload plus the scheme it should be stored with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedDiff {
    /// Uncompressed payload
    pub payload: Vec<u8>,
    /// Scheme chosen by the handler's size policy
    pub scheme: CompressionScheme,
}

/// One stored element of an artifact chain, as read from disk
#[derive(Debug, Clone)]
pub struct StoredArtifact {
    pub name: ArtifactName,
    /// Stored bytes, still compressed with `name.compression`
    pub data: Vec<u8>,
}

/// Format-specific diff/patch contract
///
/// The engine never inspects file formats; a new format only needs an
/// implementation of this trait and a registration in [`HandlerRegistry`].
pub trait TypeHandler: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &'static str;

    /// Diff `new` against `old`
    ///
    /// Returns `None` when the two buffers are equivalent for this format and
    /// nothing needs to be stored.
    fn diff(&self, old: &[u8], new: &[u8]) -> Result<Option<EncodedDiff>>;

    /// Apply an uncompressed diff payload to `base`
    fn patch(&self, base: Vec<u8>, payload: &[u8]) -> Result<Vec<u8>>;

    /// Compression for a full snapshot of `data`
    fn init_compression(&self, data: &[u8]) -> CompressionScheme;

    /// Whether `data` can be admitted as a snapshot for this format
    fn is_valid(&self, _data: &[u8]) -> bool {
        true
    }

    /// Compare a reconstructed buffer against the expected one
    fn equivalent(&self, combined: &[u8], expected: &[u8]) -> bool {
        combined == expected
    }

    /// Check that `patch(old, diff)` reproduces `new`
    fn verify(&self, old: &[u8], diff: &[u8], new: &[u8]) -> bool {
        match self.patch(old.to_vec(), diff) {
            Ok(combined) => self.equivalent(&combined, new),
            Err(err) => {
                tracing::debug!(handler = self.name(), error = %err, "verification patch failed");
                false
            }
        }
    }

    /// Replay a chain: the first element is a snapshot, every later element
    /// a diff against the running result
    fn reconstruct(&self, chain: &[StoredArtifact]) -> Result<Vec<u8>> {
        let (first, rest) = chain.split_first().ok_or(CodecError::EmptyChain)?;
        let mut data = first.name.compression.decompress(&first.data)?;
        for link in rest {
            let payload = link.name.compression.decompress(&link.data)?;
            data = self.patch(data, &payload)?;
        }
        Ok(data)
    }
}

/// Extension-keyed handler table with a fallback
#[derive(Clone)]
pub struct HandlerRegistry {
    handlers: AHashMap<String, Arc<dyn TypeHandler>>,
    default: Arc<dyn TypeHandler>,
}

impl HandlerRegistry {
    /// Registry that routes everything to `default`
    pub fn new(default: Arc<dyn TypeHandler>) -> Self {
        Self {
            handlers: AHashMap::new(),
            default,
        }
    }

    /// Route files with any of `extensions` (case-insensitive, no dot) to `handler`
    pub fn register<S: AsRef<str>>(&mut self, handler: Arc<dyn TypeHandler>, extensions: &[S]) {
        for ext in extensions {
            let key = ext.as_ref().trim_start_matches('.').to_ascii_lowercase();
            self.handlers.insert(key, Arc::clone(&handler));
        }
    }

    /// Handler for a file, chosen by its extension
    pub fn handler_for(&self, path: &Path) -> &Arc<dyn TypeHandler> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| self.handlers.get(&ext.to_ascii_lowercase()))
            .unwrap_or(&self.default)
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new(Arc::new(BlockDiffCodec::default()))
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut routes: Vec<_> = self
            .handlers
            .iter()
            .map(|(ext, handler)| (ext.as_str(), handler.name()))
            .collect();
        routes.sort_unstable();
        f.debug_struct("HandlerRegistry")
            .field("routes", &routes)
            .field("default", &self.default.name())
            .finish()
    }
}

//! Engine configuration

use crate::error::{EngineError, Result};
use chainback_core::binary::DEFAULT_BLOCK_SIZE;
use chainback_core::region::DEFAULT_RECORD_BLOCK_SIZE;
use chainback_core::DEFAULT_COMPRESSION_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Largest accepted block size (16 MiB)
pub const MAX_BLOCK_SIZE: usize = 16 * 1024 * 1024;

/// Default number of read attempts for a changing source file
pub const DEFAULT_READ_RETRIES: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Block size of the generic diff handler
    pub block_size: usize,

    /// Payloads at least this large are stored deflated
    pub compression_threshold: usize,

    /// Block size for diffs of individual region records
    pub region_block_size: usize,

    /// Extensions routed to the region handler
    pub region_extensions: Vec<String>,

    /// Gitignore-syntax patterns excluded from every run
    pub ignore_patterns: Vec<String>,

    /// Honor `.backupignore` at the source root
    pub use_ignore_file: bool,

    /// Process files on the rayon pool
    pub parallel: bool,

    /// Read attempts before a changing file is reported
    pub read_retries: u8,

    /// Skip files whose mtime still matches their latest artifact instead of
    /// comparing contents
    pub skip_unmodified: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            compression_threshold: DEFAULT_COMPRESSION_THRESHOLD,
            region_block_size: DEFAULT_RECORD_BLOCK_SIZE,
            region_extensions: vec!["mca".to_string(), "mcr".to_string()],
            ignore_patterns: Vec::new(),
            use_ignore_file: true,
            parallel: true,
            read_retries: DEFAULT_READ_RETRIES,
            skip_unmodified: true,
        }
    }
}

impl EngineConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self = toml::from_str(text).map_err(|e| EngineError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| EngineError::io(path, e))?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        for (name, size) in [
            ("block_size", self.block_size),
            ("region_block_size", self.region_block_size),
        ] {
            if size == 0 || size > MAX_BLOCK_SIZE {
                return Err(EngineError::Config(format!(
                    "{name} must be between 1 and {MAX_BLOCK_SIZE}, got {size}"
                )));
            }
        }
        if self.read_retries == 0 {
            return Err(EngineError::Config("read_retries must be at least 1".to_string()));
        }
        if let Some(bad) = self
            .region_extensions
            .iter()
            .find(|ext| ext.trim_start_matches('.').is_empty())
        {
            return Err(EngineError::Config(format!("empty region extension '{bad}'")));
        }
        Ok(())
    }
}

//! chainback.toml loading
//!
//! ```toml
//! [paths]
//! source = "world"
//! backup_root = "/srv/backups/world"
//!
//! [engine]
//! block_size = 256
//! ignore_patterns = ["logs/", "*.tmp"]
//! ```
//!
//! Relative paths are resolved against the directory holding the file.
//! Command-line flags override both paths.

use anyhow::{anyhow, Context, Result};
use chainback_engine::{BackupEngine, EngineConfig};
use serde::Deserialize;
use std::path::{Path, PathBuf};

pub const DEFAULT_CONFIG_FILE: &str = "chainback.toml";

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    paths: PathsSection,
    engine: EngineConfig,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PathsSection {
    source: Option<PathBuf>,
    backup_root: Option<PathBuf>,
}

/// Fully resolved run settings
#[derive(Debug)]
pub struct Settings {
    pub source: PathBuf,
    pub backup_root: PathBuf,
    pub engine: EngineConfig,
}

impl Settings {
    /// Merge the config file (explicit or `./chainback.toml`) with flags
    pub fn resolve(
        config_path: Option<&Path>,
        source: Option<PathBuf>,
        backup_root: Option<PathBuf>,
    ) -> Result<Self> {
        let (file, base) = match config_path {
            Some(path) => (load(path)?, parent_dir(path)),
            None => {
                let default = Path::new(DEFAULT_CONFIG_FILE);
                if default.is_file() {
                    (load(default)?, PathBuf::new())
                } else {
                    (FileConfig::default(), PathBuf::new())
                }
            }
        };

        let source = source
            .or_else(|| file.paths.source.map(|p| base.join(p)))
            .ok_or_else(|| anyhow!("no source directory: pass --source or set paths.source"))?;
        let backup_root = backup_root
            .or_else(|| file.paths.backup_root.map(|p| base.join(p)))
            .ok_or_else(|| anyhow!("no backup root: pass --backup-root or set paths.backup_root"))?;

        file.engine.validate().context("Invalid [engine] configuration")?;

        Ok(Self {
            source: absolute(source)?,
            backup_root: absolute(backup_root)?,
            engine: file.engine,
        })
    }

    pub fn open_engine(&self) -> Result<BackupEngine> {
        BackupEngine::open(&self.source, &self.backup_root, self.engine.clone())
            .context("Failed to open backup engine")
    }
}

fn load(path: &Path) -> Result<FileConfig> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config {}", path.display()))?;
    toml::from_str(&text).with_context(|| format!("Failed to parse config {}", path.display()))
}

fn absolute(path: PathBuf) -> Result<PathBuf> {
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = std::env::current_dir().context("Failed to read current directory")?;
    Ok(cwd.join(path))
}

fn parent_dir(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

//! On-disk layout of a backup root
//!
//! ```text
//! <root>/.chainback.lock
//! <root>/<generation>/journal
//! <root>/<generation>/<mirrored dir>/<artifact>
//! ```
//!
//! Source directories are mirrored by name, except that a directory named
//! like the journal, or already starting with [`ESCAPE_PREFIX`], gains one
//! leading prefix character. A source tree with a top-level `journal/`
//! therefore never lands on the journal file.

use crate::error::{JournalError, Result};
use std::borrow::Cow;
use std::path::{Component, Path, PathBuf};

/// Reserved file name at every generation root
pub const JOURNAL_FILE: &str = "journal";

/// Advisory lock file at the backup root
pub const LOCK_FILE: &str = ".chainback.lock";

/// Leading character of an escaped mirrored directory name
pub const ESCAPE_PREFIX: char = '~';

#[derive(Debug, Clone)]
pub struct BackupLayout {
    root: PathBuf,
}

impl BackupLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn generation_dir(&self, generation: u32) -> PathBuf {
        self.root.join(generation.to_string())
    }

    pub fn journal_path(&self, generation: u32) -> PathBuf {
        self.generation_dir(generation).join(JOURNAL_FILE)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.root.join(LOCK_FILE)
    }

    /// Directory holding the artifacts of files in source directory `relative_dir`
    pub fn artifact_dir(&self, generation: u32, relative_dir: &Path) -> PathBuf {
        let mut dir = self.generation_dir(generation);
        for component in relative_dir.components() {
            if let Component::Normal(name) = component {
                match name.to_str() {
                    Some(name) => dir.push(mirror_dir_name(name).as_ref()),
                    None => dir.push(name),
                }
            }
        }
        dir
    }

    /// All generation directories, ascending
    ///
    /// Entries whose name is not a decimal u32 are ignored. A missing root
    /// has no generations.
    pub fn generations(&self) -> Result<Vec<u32>> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(JournalError::io(&self.root, e)),
        };

        let mut generations = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| JournalError::io(&self.root, e))?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir {
                continue;
            }
            if let Some(generation) = entry.file_name().to_str().and_then(parse_generation) {
                generations.push(generation);
            }
        }
        generations.sort_unstable();
        Ok(generations)
    }

    pub fn latest_generation(&self) -> Result<Option<u32>> {
        Ok(self.generations()?.last().copied())
    }
}

/// Whether a file name inside a generation is reserved and never an artifact
pub fn is_reserved(file_name: &str) -> bool {
    file_name == JOURNAL_FILE
}

/// Name a source directory is stored under inside a generation
pub fn mirror_dir_name(name: &str) -> Cow<'_, str> {
    if name == JOURNAL_FILE || name.starts_with(ESCAPE_PREFIX) {
        Cow::Owned(format!("{ESCAPE_PREFIX}{name}"))
    } else {
        Cow::Borrowed(name)
    }
}

/// Source directory name of a mirrored one
pub fn source_dir_name(mirrored: &str) -> &str {
    mirrored.strip_prefix(ESCAPE_PREFIX).unwrap_or(mirrored)
}

/// Source-relative '/'-separated directory of a mirrored '/'-separated one
pub fn source_dir_key(mirrored: &str) -> String {
    if mirrored.is_empty() {
        return String::new();
    }
    mirrored.split('/').map(source_dir_name).collect::<Vec<_>>().join("/")
}

fn parse_generation(name: &str) -> Option<u32> {
    if name.is_empty() || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

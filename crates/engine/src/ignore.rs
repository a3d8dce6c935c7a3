//! Ignore rules for source enumeration
//!
//! Sources, highest priority first:
//! 1. Built-in: the backup root, when it lives inside the source tree
//! 2. `.backupignore` at the source root (optional)
//! 3. Patterns from [`EngineConfig::ignore_patterns`]

use crate::config::EngineConfig;
use anyhow::{Context, Result};
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

/// Name of the per-source ignore file
pub const IGNORE_FILE: &str = ".backupignore";

pub struct IgnoreRules {
    /// Backup root relative to the source root, if nested inside it
    backup_root: Option<PathBuf>,
    ignore_file: Option<Gitignore>,
    configured: Option<Gitignore>,
}

impl IgnoreRules {
    pub fn load(source: &Path, backup_root: &Path, config: &EngineConfig) -> Result<Self> {
        let backup_root = nested_backup_root(source, backup_root);

        let ignore_file_path = source.join(IGNORE_FILE);
        let ignore_file = if config.use_ignore_file && ignore_file_path.is_file() {
            let mut builder = GitignoreBuilder::new(source);
            if let Some(err) = builder.add(&ignore_file_path) {
                return Err(err).with_context(|| format!("Failed to parse {}", ignore_file_path.display()));
            }
            Some(builder.build()?)
        } else {
            None
        };

        let configured = if config.ignore_patterns.is_empty() {
            None
        } else {
            let mut builder = GitignoreBuilder::new(source);
            for pattern in &config.ignore_patterns {
                builder
                    .add_line(None, pattern)
                    .with_context(|| format!("Invalid ignore pattern '{pattern}'"))?;
            }
            Some(builder.build()?)
        };

        Ok(Self {
            backup_root,
            ignore_file,
            configured,
        })
    }

    /// Check a source-relative path
    pub fn should_ignore(&self, relative: &Path, is_dir: bool) -> bool {
        if let Some(root) = &self.backup_root {
            if relative.starts_with(root) {
                return true;
            }
        }

        [&self.ignore_file, &self.configured]
            .into_iter()
            .flatten()
            .any(|rules| rules.matched_path_or_any_parents(relative, is_dir).is_ignore())
    }

    /// Number of active rule sources, built-in included
    pub fn active_sources(&self) -> usize {
        1 + usize::from(self.ignore_file.is_some()) + usize::from(self.configured.is_some())
    }
}

fn nested_backup_root(source: &Path, backup_root: &Path) -> Option<PathBuf> {
    let source = source.canonicalize().unwrap_or_else(|_| source.to_path_buf());
    let backup_root = backup_root
        .canonicalize()
        .unwrap_or_else(|_| backup_root.to_path_buf());
    backup_root
        .strip_prefix(&source)
        .ok()
        .filter(|rel| !rel.as_os_str().is_empty())
        .map(Path::to_path_buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config(patterns: &[&str], use_ignore_file: bool) -> EngineConfig {
        EngineConfig {
            ignore_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            use_ignore_file,
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_nested_backup_root_always_ignored() {
        let temp_dir = TempDir::new().unwrap();
        let backups = temp_dir.path().join("backups");
        fs::create_dir(&backups).unwrap();

        let rules = IgnoreRules::load(temp_dir.path(), &backups, &config(&[], false)).unwrap();
        assert!(rules.should_ignore(Path::new("backups"), true));
        assert!(rules.should_ignore(Path::new("backups/0/journal"), false));
        assert!(!rules.should_ignore(Path::new("backups.txt"), false));
        assert!(!rules.should_ignore(Path::new("src/main.rs"), false));
        assert_eq!(rules.active_sources(), 1);
    }

    #[test]
    fn test_outside_backup_root_not_special() {
        let source = TempDir::new().unwrap();
        let backups = TempDir::new().unwrap();
        let rules = IgnoreRules::load(source.path(), backups.path(), &config(&[], false)).unwrap();
        assert!(rules.backup_root.is_none());
    }

    #[test]
    fn test_config_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let rules = IgnoreRules::load(
            temp_dir.path(),
            Path::new("/elsewhere"),
            &config(&["*.log", "cache/"], false),
        )
        .unwrap();

        assert!(rules.should_ignore(Path::new("server.log"), false));
        assert!(rules.should_ignore(Path::new("logs/old/server.log"), false));
        assert!(rules.should_ignore(Path::new("cache"), true));
        assert!(rules.should_ignore(Path::new("cache/blob.bin"), false));
        assert!(!rules.should_ignore(Path::new("world/level.dat"), false));
    }

    #[test]
    fn test_ignore_file() -> Result<()> {
        let temp_dir = TempDir::new()?;
        fs::write(temp_dir.path().join(IGNORE_FILE), "*.tmp\nsession.lock\n")?;

        let rules = IgnoreRules::load(temp_dir.path(), Path::new("/elsewhere"), &config(&[], true))?;
        assert!(rules.should_ignore(Path::new("a.tmp"), false));
        assert!(rules.should_ignore(Path::new("world/session.lock"), false));
        assert!(!rules.should_ignore(Path::new("world/level.dat"), false));
        assert_eq!(rules.active_sources(), 2);

        // Disabled in config
        let rules = IgnoreRules::load(temp_dir.path(), Path::new("/elsewhere"), &config(&[], false))?;
        assert!(!rules.should_ignore(Path::new("a.tmp"), false));
        Ok(())
    }
}

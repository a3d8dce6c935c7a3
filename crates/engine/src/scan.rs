//! Source tree enumeration

use crate::error::{EngineError, Result};
use crate::ignore::IgnoreRules;
use crate::report::{FailureKind, FileFailure};
use std::path::Path;
use walkdir::WalkDir;

/// Files found under a source root
#[derive(Debug, Default)]
pub struct ScanOutcome {
    /// Regular files, source-relative and '/'-separated, sorted
    pub files: Vec<String>,
    /// Entries that could not be walked
    pub failures: Vec<FileFailure>,
    /// Relative paths whose subtree is unknown this run
    pub unreadable: Vec<String>,
}

impl ScanOutcome {
    /// Whether `path` lies in a subtree that could not be enumerated
    pub fn is_unreadable(&self, path: &str) -> bool {
        self.unreadable.iter().any(|prefix| {
            prefix.is_empty()
                || path == prefix
                || path.strip_prefix(prefix.as_str()).is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

/// Walk `source` and collect every regular file not excluded by `rules`
///
/// Symlinks are not followed. A walk error affects only its own subtree.
pub fn scan_source(source: &Path, rules: &IgnoreRules) -> Result<ScanOutcome> {
    if !source.is_dir() {
        return Err(EngineError::SourceUnavailable(source.to_path_buf()));
    }

    let mut outcome = ScanOutcome::default();
    let walker = WalkDir::new(source)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| {
            entry.depth() == 0
                || entry
                    .path()
                    .strip_prefix(source)
                    .map(|rel| !rules.should_ignore(rel, entry.file_type().is_dir()))
                    .unwrap_or(true)
        });

    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                let relative = err
                    .path()
                    .and_then(|p| p.strip_prefix(source).ok())
                    .and_then(relative_key)
                    .unwrap_or_default();
                tracing::warn!(path = %relative, error = %err, "enumeration failed");
                outcome.failures.push(FileFailure {
                    path: relative.clone(),
                    kind: FailureKind::Enumerate,
                    message: err.to_string(),
                });
                outcome.unreadable.push(relative);
                continue;
            }
        };

        if !entry.file_type().is_file() {
            if entry.file_type().is_symlink() {
                tracing::debug!(path = %entry.path().display(), "skipping symlink");
            }
            continue;
        }

        let Ok(rel) = entry.path().strip_prefix(source) else {
            continue;
        };
        match relative_key(rel) {
            Some(key) => outcome.files.push(key),
            None => {
                let path = rel.to_string_lossy().into_owned();
                tracing::warn!(path = %path, "skipping file with non UTF-8 name");
                outcome.failures.push(FileFailure {
                    path,
                    kind: FailureKind::Enumerate,
                    message: "file name is not valid UTF-8".to_string(),
                });
            }
        }
    }

    outcome.files.sort_unstable();
    tracing::debug!(files = outcome.files.len(), failures = outcome.failures.len(), "scan complete");
    Ok(outcome)
}

/// '/'-joined UTF-8 form of a relative path
pub fn relative_key(rel: &Path) -> Option<String> {
    let parts = rel
        .components()
        .map(|c| c.as_os_str().to_str())
        .collect::<Option<Vec<_>>>()?;
    Some(parts.join("/"))
}

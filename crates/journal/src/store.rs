//! Crash-safe file replacement

use crate::error::{JournalError, Result};
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

/// Atomically replace `target` with `data`
///
/// Writes to a temporary file in the target's directory, fsyncs it, then
/// renames it over the target. Readers see either the old or the new content.
pub fn atomic_write(target: &Path, data: &[u8]) -> Result<()> {
    let dir = target
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));

    let mut tmp = NamedTempFile::new_in(dir).map_err(|e| JournalError::io(dir, e))?;
    tmp.write_all(data).map_err(|e| JournalError::io(tmp.path(), e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| JournalError::io(tmp.path(), e))?;
    tmp.persist(target)
        .map_err(|e| JournalError::io(target, e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_atomic_write_creates_and_replaces() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("data.bin");

        atomic_write(&target, b"first").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"first");

        atomic_write(&target, b"second, longer").unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"second, longer");

        // No temp files left behind
        let entries = std::fs::read_dir(temp_dir.path()).unwrap().count();
        assert_eq!(entries, 1);
    }

    #[test]
    fn test_atomic_write_missing_dir_fails() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("missing/data.bin");
        assert!(matches!(atomic_write(&target, b"x"), Err(JournalError::Io { .. })));
    }
}

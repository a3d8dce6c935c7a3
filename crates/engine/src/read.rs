//! Consistent reads of files that may be changing underneath us

use anyhow::{Context, Result};
use filetime::FileTime;
use std::fs;
use std::path::Path;
use std::thread::sleep;
use std::time::{Duration, SystemTime};

/// How long an mtime must lie before the read for it to identify the content
///
/// Covers coarse file-system timestamps: a write landing in the same tick as
/// the read can leave the mtime unchanged.
pub const MTIME_SETTLE: Duration = Duration::from_secs(2);

/// Contents of a file plus the mtime they were read at
#[derive(Debug)]
pub struct StableRead {
    pub data: Vec<u8>,
    pub modified: FileTime,
    /// Wall clock just before the accepted attempt started
    pub started: SystemTime,
}

impl StableRead {
    /// The mtime, if old enough that a later change must move it
    pub fn settled_mtime(&self) -> Option<FileTime> {
        let cutoff = self.started.checked_sub(MTIME_SETTLE)?;
        (self.modified <= FileTime::from_system_time(cutoff)).then_some(self.modified)
    }
}

/// Read a file, retrying while it changes during the read
///
/// The file is stat'ed before and after reading; the contents are accepted
/// only when size and mtime did not move. Retries back off exponentially
/// (50ms, 100ms, 200ms, ...).
pub fn read_stable(path: &Path, max_attempts: u8) -> Result<StableRead> {
    let attempts = max_attempts.max(1);

    for attempt in 0..attempts {
        let started = SystemTime::now();
        let before = fs::metadata(path).with_context(|| format!("Failed to stat (pre): {}", path.display()))?;
        let data = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
        let after = fs::metadata(path).with_context(|| format!("Failed to stat (post): {}", path.display()))?;

        let modified = FileTime::from_last_modification_time(&after);
        if before.len() == after.len()
            && after.len() == data.len() as u64
            && FileTime::from_last_modification_time(&before) == modified
        {
            return Ok(StableRead {
                data,
                modified,
                started,
            });
        }

        if attempt + 1 < attempts {
            let backoff_ms = 50u64 << attempt;
            tracing::debug!(path = %path.display(), attempt, backoff_ms, "file changed during read, retrying");
            sleep(Duration::from_millis(backoff_ms));
        }
    }

    anyhow::bail!(
        "File {} is unstable after {} read attempts (changing too rapidly)",
        path.display(),
        attempts
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_stable_file() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("stable.txt");
        fs::write(&path, b"settled content")?;

        let read = read_stable(&path, 3)?;
        assert_eq!(read.data, b"settled content");
        // Just written, so the mtime cannot vouch for the content yet
        assert_eq!(read.settled_mtime(), None);
        Ok(())
    }

    #[test]
    fn test_old_mtime_is_settled() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("old.dat");
        fs::write(&path, b"from last week")?;
        let week_ago = SystemTime::now() - Duration::from_secs(7 * 24 * 3600);
        filetime::set_file_mtime(&path, FileTime::from_system_time(week_ago))?;

        let read = read_stable(&path, 1)?;
        assert_eq!(read.modified.unix_seconds(), FileTime::from_system_time(week_ago).unix_seconds());
        assert_eq!(read.settled_mtime(), Some(read.modified));
        Ok(())
    }

    #[test]
    fn test_read_missing_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let err = read_stable(&temp_dir.path().join("missing"), 3).unwrap_err();
        assert!(format!("{err:#}").contains("Failed to stat (pre)"));
    }

    #[test]
    fn test_read_empty_file() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("empty");
        fs::File::create(&path)?.flush()?;
        assert!(read_stable(&path, 1)?.data.is_empty());
        Ok(())
    }

    #[test]
    fn test_read_file_being_appended() -> Result<()> {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;

        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("growing.log");
        fs::write(&path, vec![b'x'; 1 << 20])?;

        let stop = Arc::new(AtomicBool::new(false));
        let writer = {
            let stop = Arc::clone(&stop);
            let path = path.clone();
            std::thread::spawn(move || {
                let mut file = fs::OpenOptions::new().append(true).open(&path).unwrap();
                while !stop.load(Ordering::Relaxed) {
                    file.write_all(&[b'y'; 4096]).unwrap();
                    std::thread::sleep(Duration::from_millis(1));
                }
            })
        };

        // Either a consistent snapshot or a clean instability error
        match read_stable(&path, 3) {
            Ok(read) => assert!(read.data.len() >= 1 << 20),
            Err(err) => assert!(err.to_string().contains("unstable")),
        }

        stop.store(true, Ordering::Relaxed);
        writer.join().unwrap();
        Ok(())
    }
}

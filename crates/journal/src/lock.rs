//! Advisory lock giving one writer ownership of a backup root

use crate::error::{JournalError, Result};
use crate::layout::LOCK_FILE;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Exclusive `flock` on `<root>/.chainback.lock`, released on drop
#[derive(Debug)]
pub struct RootLock {
    path: PathBuf,
    #[allow(dead_code)]
    file: File,
}

impl RootLock {
    /// Acquire the lock, waiting for any current holder
    pub fn acquire(root: &Path) -> Result<Self> {
        let (path, mut file) = open_lock_file(root)?;
        flock(&file, false, &path)?;
        write_holder(&mut file, &path);
        tracing::debug!(path = %path.display(), "backup root locked");
        Ok(Self { path, file })
    }

    /// Acquire the lock without waiting; `None` if another holder exists
    pub fn try_acquire(root: &Path) -> Result<Option<Self>> {
        let (path, mut file) = open_lock_file(root)?;
        if !flock(&file, true, &path)? {
            return Ok(None);
        }
        write_holder(&mut file, &path);
        Ok(Some(Self { path, file }))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn open_lock_file(root: &Path) -> Result<(PathBuf, File)> {
    std::fs::create_dir_all(root).map_err(|e| JournalError::io(root, e))?;
    let path = root.join(LOCK_FILE);
    // The file itself is never removed; unlinking it would let two
    // processes lock different inodes.
    let file = OpenOptions::new()
        .create(true)
        .truncate(false)
        .read(true)
        .write(true)
        .open(&path)
        .map_err(|e| JournalError::io(&path, e))?;
    Ok((path, file))
}

/// Record the holder's pid for operators; purely informational
fn write_holder(file: &mut File, path: &Path) {
    let result = file
        .set_len(0)
        .and_then(|()| writeln!(file, "{}", std::process::id()));
    if let Err(err) = result {
        tracing::debug!(path = %path.display(), error = %err, "failed to record lock holder pid");
    }
}

#[cfg(unix)]
fn flock(file: &File, nonblocking: bool, path: &Path) -> Result<bool> {
    use nix::fcntl::FlockArg;
    use std::os::unix::io::AsRawFd;

    let arg = if nonblocking {
        FlockArg::LockExclusiveNonblock
    } else {
        FlockArg::LockExclusive
    };
    match nix::fcntl::flock(file.as_raw_fd(), arg) {
        Ok(()) => Ok(true),
        Err(nix::errno::Errno::EWOULDBLOCK) if nonblocking => Ok(false),
        Err(source) => Err(JournalError::Lock {
            path: path.to_path_buf(),
            source,
        }),
    }
}

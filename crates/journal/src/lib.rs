//! Backup-root bookkeeping
//!
//! This crate provides:
//! - The per-generation journal (counters + tracked-file set)
//! - The on-disk layout of a backup root
//! - Atomic file replacement
//! - The advisory lock that gives one writer ownership of a root

pub mod error;
pub mod journal;
pub mod layout;
pub mod lock;
pub mod store;

// Re-exports
pub use error::{JournalError, Result};
pub use journal::JournalRecord;
pub use layout::{
    is_reserved, mirror_dir_name, source_dir_key, source_dir_name, BackupLayout, ESCAPE_PREFIX, JOURNAL_FILE,
    LOCK_FILE,
};
pub use lock::RootLock;
pub use store::atomic_write;

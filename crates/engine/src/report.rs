//! Run, restore and status reports

use std::fmt;

/// Where a run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunPhase {
    #[default]
    Idle,
    Enumerating,
    Snapshotting,
    Diffing,
    Finalizing,
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Idle => "idle",
            Self::Enumerating => "enumerating",
            Self::Snapshotting => "snapshotting",
            Self::Diffing => "diffing",
            Self::Finalizing => "finalizing",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    Full,
    Incremental,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => f.write_str("full"),
            Self::Incremental => f.write_str("incremental"),
        }
    }
}

/// Stage at which a single file failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Directory walk error
    Enumerate,
    /// Source file could not be read or kept changing
    Read,
    /// Handler refused the bytes as a snapshot
    Invalid,
    /// Existing chain could not be loaded or replayed
    Chain,
    /// Handler failed to diff
    Diff,
    /// Diff did not reproduce the new bytes
    VerifyMismatch,
    /// Artifact or restored file could not be written
    Write,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Enumerate => "enumerate",
            Self::Read => "read",
            Self::Invalid => "invalid",
            Self::Chain => "chain",
            Self::Diff => "diff",
            Self::VerifyMismatch => "verify",
            Self::Write => "write",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    /// Source-relative, '/'-separated
    pub path: String,
    pub kind: FailureKind,
    pub message: String,
}

impl FileFailure {
    pub fn new(path: impl Into<String>, kind: FailureKind, error: &anyhow::Error) -> Self {
        Self {
            path: path.into(),
            kind,
            message: format!("{error:#}"),
        }
    }
}

impl fmt::Display for FileFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{}]: {}", self.path, self.kind, self.message)
    }
}

/// Outcome of a completed (finalized) run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub kind: RunKind,
    pub generation: u32,
    pub revision: u32,
    pub snapshots: usize,
    pub diffs: usize,
    pub unchanged: usize,
    /// Not read because the mtime matched the latest artifact
    pub skipped: usize,
    pub removals: usize,
    /// Stored bytes written this run
    pub bytes_written: u64,
    pub failures: Vec<FileFailure>,
}

impl RunReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Artifacts written, removal markers included
    pub fn artifacts(&self) -> usize {
        self.snapshots + self.diffs + self.removals
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RestoreReport {
    pub generation: u32,
    pub revision: u32,
    pub restored: usize,
    pub bytes: u64,
    pub failures: Vec<FileFailure>,
    /// The requested generation has no committed journal
    pub missing_generation: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationInfo {
    pub generation: u32,
    /// Committed revision; `None` for a directory left by an interrupted full run
    pub revision: Option<u32>,
    pub tracked: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusReport {
    pub generations: Vec<GenerationInfo>,
    pub total_bytes: u64,
    pub phase: RunPhase,
    /// Another process holds the backup root lock
    pub busy: bool,
}

impl StatusReport {
    /// Latest committed generation
    pub fn current(&self) -> Option<&GenerationInfo> {
        self.generations.iter().rev().find(|g| g.revision.is_some())
    }
}

//! Backup engine: full and incremental runs, restore, status
//!
//! Every public run or restore holds the in-process mutex and an exclusive
//! flock on the backup root for its whole duration. Committed state lives in
//! the journal of the highest committed generation; a run that aborts before
//! writing that journal leaves artifacts that the next run purges.

use crate::chain::{ChainTree, FileChain};
use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::ignore::IgnoreRules;
use crate::read::{read_stable, StableRead};
use crate::report::{
    FailureKind, FileFailure, GenerationInfo, RestoreReport, RunKind, RunPhase, RunReport, StatusReport,
};
use crate::scan::scan_source;
use anyhow::Context;
use chainback_core::{ArtifactName, BlockDiffCodec, HandlerRegistry, RegionCodec, TypeHandler};
use chainback_journal::{atomic_write, is_reserved, BackupLayout, JournalRecord, RootLock};
use dashmap::DashSet;
use filetime::FileTime;
use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use std::collections::{BTreeSet, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Incremental backup engine bound to one source tree and one backup root
pub struct BackupEngine {
    source: PathBuf,
    layout: BackupLayout,
    config: EngineConfig,
    handlers: HandlerRegistry,
    /// Last committed state; the mutex also serializes runs in-process
    committed: Mutex<Option<JournalRecord>>,
    phase: RwLock<RunPhase>,
}

enum FileOutcome {
    Snapshot(u64),
    Diff(u64),
    Unchanged,
    Skipped,
}

type FileResult<T> = std::result::Result<T, FileFailure>;

/// Shared accumulators for per-file work
#[derive(Default)]
struct Tally {
    snapshots: AtomicUsize,
    diffs: AtomicUsize,
    unchanged: AtomicUsize,
    skipped: AtomicUsize,
    bytes_written: AtomicU64,
    tracked: DashSet<String>,
    failures: Mutex<Vec<FileFailure>>,
}

impl Tally {
    fn record(&self, path: &str, result: FileResult<FileOutcome>) {
        match result {
            Ok(outcome) => {
                match outcome {
                    FileOutcome::Snapshot(bytes) => {
                        self.snapshots.fetch_add(1, Ordering::Relaxed);
                        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
                    }
                    FileOutcome::Diff(bytes) => {
                        self.diffs.fetch_add(1, Ordering::Relaxed);
                        self.bytes_written.fetch_add(bytes, Ordering::Relaxed);
                    }
                    FileOutcome::Unchanged => {
                        self.unchanged.fetch_add(1, Ordering::Relaxed);
                    }
                    FileOutcome::Skipped => {
                        self.skipped.fetch_add(1, Ordering::Relaxed);
                    }
                }
                self.tracked.insert(path.to_string());
            }
            Err(failure) => self.fail(failure),
        }
    }

    fn fail(&self, failure: FileFailure) {
        warn!(path = %failure.path, kind = %failure.kind, error = %failure.message, "file skipped");
        self.failures.lock().push(failure);
    }
}

/// Attach a path and failure stage to a per-file error
trait FailAs<T> {
    fn fail_as(self, path: &str, kind: FailureKind) -> FileResult<T>;
}

impl<T, E: Into<anyhow::Error>> FailAs<T> for std::result::Result<T, E> {
    fn fail_as(self, path: &str, kind: FailureKind) -> FileResult<T> {
        self.map_err(|e| FileFailure::new(path, kind, &e.into()))
    }
}

impl BackupEngine {
    /// Bind an engine to `source` and `backup_root`
    ///
    /// Reads the committed journal but writes nothing; crash cleanup and
    /// journal recovery happen at the start of the next run.
    pub fn open(source: impl Into<PathBuf>, backup_root: impl Into<PathBuf>, config: EngineConfig) -> Result<Self> {
        config.validate()?;
        let layout = BackupLayout::new(backup_root);
        let handlers = build_registry(&config);
        let committed = load_committed(&layout)?;

        debug!(?handlers, "engine opened");
        Ok(Self {
            source: source.into(),
            layout,
            config,
            handlers,
            committed: Mutex::new(committed),
            phase: RwLock::new(RunPhase::Idle),
        })
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    pub fn backup_root(&self) -> &Path {
        self.layout.root()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn phase(&self) -> RunPhase {
        *self.phase.read()
    }

    /// Last committed state seen by this engine; waits for a running run
    pub fn committed(&self) -> Option<JournalRecord> {
        self.committed.lock().clone()
    }

    /// Route additional extensions to a custom handler
    pub fn register_handler<S: AsRef<str>>(&mut self, handler: Arc<dyn TypeHandler>, extensions: &[S]) {
        self.handlers.register(handler, extensions);
    }

    /// Snapshot every file into a fresh generation
    pub fn full_backup(&self) -> Result<RunReport> {
        let mut committed = self.committed.lock();
        let _root = RootLock::acquire(self.layout.root())?;
        *committed = self.refresh()?;

        let result = self.run_full(&mut committed);
        self.set_phase(RunPhase::Idle);
        result
    }

    /// Store what changed since the last committed revision
    ///
    /// Runs as a full backup when nothing has been committed yet.
    pub fn incremental_backup(&self) -> Result<RunReport> {
        let mut committed = self.committed.lock();
        let _root = RootLock::acquire(self.layout.root())?;
        *committed = self.refresh()?;

        let result = match committed.clone() {
            Some(base) => self.run_incremental(&mut committed, base),
            None => {
                info!("no committed backup yet, running a full backup");
                self.run_full(&mut committed)
            }
        };
        self.set_phase(RunPhase::Idle);
        result
    }

    /// Rebuild the source tree as of (`generation`, `revision`) into `target`
    ///
    /// Defaults to the latest committed generation and its latest revision; a
    /// revision past the generation's committed one is capped.
    pub fn restore(&self, target: &Path, generation: Option<u32>, revision: Option<u32>) -> Result<RestoreReport> {
        let mut committed = self.committed.lock();
        let _root = RootLock::acquire(self.layout.root())?;
        *committed = self.refresh()?;

        let Some(generation) = generation.or_else(|| committed.as_ref().map(|record| record.generation)) else {
            warn!("nothing to restore: no committed generation");
            return Ok(RestoreReport {
                missing_generation: true,
                ..RestoreReport::default()
            });
        };
        let Some(journal) = JournalRecord::load(&self.layout.journal_path(generation))? else {
            warn!(generation, "generation has no committed journal");
            return Ok(RestoreReport {
                generation,
                missing_generation: true,
                ..RestoreReport::default()
            });
        };

        let revision = match revision {
            Some(requested) if requested > journal.revision => {
                warn!(requested, committed = journal.revision, "revision capped at committed revision");
                journal.revision
            }
            Some(requested) => requested,
            None => journal.revision,
        };

        info!(generation, revision, target = %target.display(), "restore started");
        let chains = ChainTree::resolve(&self.layout.generation_dir(generation), revision)?;
        std::fs::create_dir_all(target).map_err(|e| EngineError::io(target, e))?;

        let restored = AtomicUsize::new(0);
        let bytes = AtomicU64::new(0);
        let failures = Mutex::new(Vec::new());
        let entries: Vec<(&String, &FileChain)> = chains.iter().collect();

        self.for_each(&entries, |(path, chain)| match self.restore_file(target, path, chain) {
            Ok(len) => {
                restored.fetch_add(1, Ordering::Relaxed);
                bytes.fetch_add(len, Ordering::Relaxed);
            }
            Err(failure) => {
                warn!(path = %failure.path, error = %failure.message, "restore of file failed");
                failures.lock().push(failure);
            }
        });

        let mut failures = failures.into_inner();
        failures.sort_by(|a, b| a.path.cmp(&b.path));
        let report = RestoreReport {
            generation,
            revision,
            restored: restored.into_inner(),
            bytes: bytes.into_inner(),
            failures,
            missing_generation: false,
        };
        info!(
            generation,
            revision,
            restored = report.restored,
            failed = report.failures.len(),
            "restore finished"
        );
        Ok(report)
    }

    /// Generations, their committed revisions and the size of the backup root
    ///
    /// Never waits on the root lock; `busy` reports whether another holder,
    /// in this process or another, has it.
    pub fn status(&self) -> Result<StatusReport> {
        let busy = self.layout.root().is_dir() && RootLock::try_acquire(self.layout.root())?.is_none();
        let mut generations = Vec::new();
        for generation in self.layout.generations()? {
            let journal = JournalRecord::load(&self.layout.journal_path(generation))?;
            generations.push(GenerationInfo {
                generation,
                revision: journal.as_ref().map(|record| record.revision),
                tracked: journal.map_or(0, |record| record.tracked.len()),
            });
        }

        let total_bytes = WalkDir::new(self.layout.root())
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .filter_map(|entry| entry.metadata().ok())
            .map(|metadata| metadata.len())
            .sum();

        Ok(StatusReport {
            generations,
            total_bytes,
            phase: self.phase(),
            busy,
        })
    }

    /// Reload committed state, rebuilding a missing journal from artifacts
    pub fn recover(&self) -> Result<Option<JournalRecord>> {
        let mut committed = self.committed.lock();
        let _root = RootLock::acquire(self.layout.root())?;
        *committed = self.refresh()?;
        Ok(committed.clone())
    }

    fn set_phase(&self, phase: RunPhase) {
        let mut current = self.phase.write();
        if *current != phase {
            let from = *current;
            debug!(%from, to = %phase, "phase");
            *current = phase;
        }
    }

    fn refresh(&self) -> Result<Option<JournalRecord>> {
        match load_committed(&self.layout)? {
            Some(record) => Ok(Some(record)),
            None => self.bootstrap(),
        }
    }

    /// Rebuild the journal of the newest generation when none exists anywhere
    fn bootstrap(&self) -> Result<Option<JournalRecord>> {
        let Some(generation) = self.layout.latest_generation()? else {
            return Ok(None);
        };
        let tree = ChainTree::resolve(&self.layout.generation_dir(generation), u32::MAX)?;
        let revision = tree.latest_revision().unwrap_or(0);
        let tracked = tree.iter().map(|(path, _)| path.clone()).collect();
        let record = JournalRecord::new(generation, revision, tracked);
        record.save(&self.layout.journal_path(generation))?;

        warn!(
            generation,
            revision,
            tracked = record.tracked.len(),
            "journal missing, recovered state from artifacts"
        );
        Ok(Some(record))
    }

    fn ignore_rules(&self) -> Result<IgnoreRules> {
        let rules = IgnoreRules::load(&self.source, self.layout.root(), &self.config).map_err(EngineError::Ignore)?;
        debug!(sources = rules.active_sources(), "ignore rules loaded");
        Ok(rules)
    }

    fn run_full(&self, committed: &mut Option<JournalRecord>) -> Result<RunReport> {
        let generation = match committed.as_ref() {
            Some(record) => record
                .generation
                .checked_add(1)
                .ok_or(EngineError::RevisionOverflow(record.generation))?,
            None => 0,
        };
        let generation_dir = self.layout.generation_dir(generation);
        if generation_dir.exists() {
            warn!(generation, "clearing generation left by an interrupted full backup");
            std::fs::remove_dir_all(&generation_dir).map_err(|e| EngineError::io(&generation_dir, e))?;
        }
        std::fs::create_dir_all(&generation_dir).map_err(|e| EngineError::io(&generation_dir, e))?;
        info!(generation, source = %self.source.display(), "full backup started");

        self.set_phase(RunPhase::Enumerating);
        let scan = scan_source(&self.source, &self.ignore_rules()?)?;

        self.set_phase(RunPhase::Snapshotting);
        let tally = Tally::default();
        self.for_each(&scan.files, |path| tally.record(path, self.snapshot_file(path, generation)));

        self.set_phase(RunPhase::Finalizing);
        let tracked: BTreeSet<String> = tally.tracked.iter().map(|path| path.key().clone()).collect();
        let record = JournalRecord::new(generation, 0, tracked);
        record.save(&self.layout.journal_path(generation))?;

        let mut failures = scan.failures;
        failures.extend(tally.failures.into_inner());
        let report = RunReport {
            kind: RunKind::Full,
            generation,
            revision: 0,
            snapshots: tally.snapshots.into_inner(),
            diffs: 0,
            unchanged: 0,
            skipped: 0,
            removals: 0,
            bytes_written: tally.bytes_written.into_inner(),
            failures,
        };
        *committed = Some(record);
        log_report(&report);
        Ok(report)
    }

    fn run_incremental(&self, committed: &mut Option<JournalRecord>, base: JournalRecord) -> Result<RunReport> {
        let generation = base.generation;
        let revision = base
            .revision
            .checked_add(1)
            .ok_or(EngineError::RevisionOverflow(generation))?;
        let generation_dir = self.layout.generation_dir(generation);
        purge_uncommitted(&generation_dir, base.revision)?;
        info!(generation, revision, source = %self.source.display(), "incremental backup started");

        let chains = ChainTree::resolve(&generation_dir, base.revision)?;

        self.set_phase(RunPhase::Enumerating);
        let scan = scan_source(&self.source, &self.ignore_rules()?)?;

        self.set_phase(RunPhase::Diffing);
        let tally = Tally::default();
        self.for_each(&scan.files, |path| {
            tally.record(path, self.backup_file(path, chains.get(path), generation, revision))
        });

        self.set_phase(RunPhase::Finalizing);
        let present: HashSet<&str> = scan.files.iter().map(String::as_str).collect();
        let mut removals = 0;
        let mut tracked: BTreeSet<String> = tally.tracked.iter().map(|path| path.key().clone()).collect();

        for path in &base.tracked {
            if present.contains(path.as_str()) {
                continue;
            }
            if scan.is_unreadable(path) {
                // Unknown this run, not gone
                tracked.insert(path.clone());
                continue;
            }
            if !chains.contains(path) {
                continue;
            }
            let marker = ArtifactName::removal(revision, file_name(path));
            match self.write_artifact(generation, path, &marker, &[], None) {
                Ok(_) => {
                    debug!(path = %path, revision, "removal marker written");
                    removals += 1;
                }
                Err(err) => {
                    tracked.insert(path.clone());
                    tally.fail(FileFailure::new(path.as_str(), FailureKind::Write, &err));
                }
            }
        }

        let mut failures = scan.failures;
        failures.extend(tally.failures.into_inner());
        for failure in &failures {
            if base.tracked.contains(&failure.path) {
                tracked.insert(failure.path.clone());
            }
        }

        let record = JournalRecord::new(generation, revision, tracked);
        record.save(&self.layout.journal_path(generation))?;

        let report = RunReport {
            kind: RunKind::Incremental,
            generation,
            revision,
            snapshots: tally.snapshots.into_inner(),
            diffs: tally.diffs.into_inner(),
            unchanged: tally.unchanged.into_inner(),
            skipped: tally.skipped.into_inner(),
            removals,
            bytes_written: tally.bytes_written.into_inner(),
            failures,
        };
        *committed = Some(record);
        log_report(&report);
        Ok(report)
    }

    fn for_each<T, F>(&self, items: &[T], op: F)
    where
        T: Sync,
        F: Fn(&T) + Sync + Send,
    {
        if self.config.parallel {
            items.par_iter().for_each(op);
        } else {
            items.iter().for_each(op);
        }
    }

    fn snapshot_file(&self, path: &str, generation: u32) -> FileResult<FileOutcome> {
        let handler = self.handlers.handler_for(Path::new(path));
        let read = read_stable(&self.source.join(path), self.config.read_retries).fail_as(path, FailureKind::Read)?;
        self.store_snapshot(path, handler.as_ref(), &read, generation, 0)
    }

    fn backup_file(
        &self,
        path: &str,
        chain: Option<&FileChain>,
        generation: u32,
        revision: u32,
    ) -> FileResult<FileOutcome> {
        if let Some(chain) = chain {
            if self.config.skip_unmodified && self.is_unmodified(path, chain) {
                return Ok(FileOutcome::Skipped);
            }
        }

        let handler = self.handlers.handler_for(Path::new(path));
        let read = read_stable(&self.source.join(path), self.config.read_retries).fail_as(path, FailureKind::Read)?;
        let data = read.data.as_slice();

        let Some(chain) = chain else {
            return self.store_snapshot(path, handler.as_ref(), &read, generation, revision);
        };

        let stored = chain
            .load()
            .context("Failed to load artifact chain")
            .fail_as(path, FailureKind::Chain)?;
        let base = handler.reconstruct(&stored).fail_as(path, FailureKind::Chain)?;
        if base == data {
            self.mark_unchanged(path, chain, &read);
            return Ok(FileOutcome::Unchanged);
        }

        let Some(diff) = handler.diff(&base, data).fail_as(path, FailureKind::Diff)? else {
            debug!(path, handler = handler.name(), "content differs only in ways the format ignores");
            self.mark_unchanged(path, chain, &read);
            return Ok(FileOutcome::Unchanged);
        };
        if !handler.verify(&base, &diff.payload, data) {
            return Err(FileFailure {
                path: path.to_string(),
                kind: FailureKind::VerifyMismatch,
                message: format!("{} diff does not reproduce the new content", handler.name()),
            });
        }

        let packed = diff.scheme.compress(&diff.payload).fail_as(path, FailureKind::Diff)?;
        let name = ArtifactName::stored(revision, file_name(path), diff.scheme);
        let written = self
            .write_artifact(generation, path, &name, &packed, Some(artifact_stamp(&read)))
            .fail_as(path, FailureKind::Write)?;
        debug!(path, revision, payload = diff.payload.len(), stored = written, scheme = %diff.scheme, "diff stored");
        Ok(FileOutcome::Diff(written))
    }

    fn store_snapshot(
        &self,
        path: &str,
        handler: &dyn TypeHandler,
        read: &StableRead,
        generation: u32,
        revision: u32,
    ) -> FileResult<FileOutcome> {
        let data = read.data.as_slice();
        if !handler.is_valid(data) {
            return Err(FileFailure {
                path: path.to_string(),
                kind: FailureKind::Invalid,
                message: format!("not a valid {} file ({} bytes)", handler.name(), data.len()),
            });
        }
        let scheme = handler.init_compression(data);
        let packed = scheme.compress(data).fail_as(path, FailureKind::Write)?;
        let name = ArtifactName::stored(revision, file_name(path), scheme);
        let written = self
            .write_artifact(generation, path, &name, &packed, Some(artifact_stamp(read)))
            .fail_as(path, FailureKind::Write)?;
        debug!(path, revision, size = data.len(), stored = written, %scheme, "snapshot stored");
        Ok(FileOutcome::Snapshot(written))
    }

    /// Write an artifact, optionally stamping it with the source mtime
    fn write_artifact(
        &self,
        generation: u32,
        path: &str,
        name: &ArtifactName,
        bytes: &[u8],
        stamp: Option<FileTime>,
    ) -> anyhow::Result<u64> {
        let parent = Path::new(path).parent().unwrap_or(Path::new(""));
        let dir = self.layout.artifact_dir(generation, parent);
        std::fs::create_dir_all(&dir).with_context(|| format!("Failed to create {}", dir.display()))?;
        let artifact = dir.join(name.to_file_name());
        atomic_write(&artifact, bytes)?;
        if let Some(mtime) = stamp {
            stamp_mtime(&artifact, mtime);
        }
        Ok(bytes.len() as u64)
    }

    /// Source mtime still equals the mtime stamped on the newest artifact
    fn is_unmodified(&self, path: &str, chain: &FileChain) -> bool {
        let Some(latest) = chain.latest_path() else {
            return false;
        };
        let (Ok(source), Ok(stored)) = (std::fs::metadata(self.source.join(path)), std::fs::metadata(&latest)) else {
            return false;
        };
        let unmodified = FileTime::from_last_modification_time(&source) == FileTime::from_last_modification_time(&stored);
        if unmodified {
            debug!(path, "mtime matches latest artifact, not read");
        }
        unmodified
    }

    /// Re-stamp the newest artifact after a content compare found no change
    fn mark_unchanged(&self, path: &str, chain: &FileChain, read: &StableRead) {
        if !self.config.skip_unmodified {
            return;
        }
        if let (Some(mtime), Some(latest)) = (read.settled_mtime(), chain.latest_path()) {
            debug!(path, "content unchanged, stamping latest artifact");
            stamp_mtime(&latest, mtime);
        }
    }

    fn restore_file(&self, target: &Path, path: &str, chain: &FileChain) -> FileResult<u64> {
        let handler = self.handlers.handler_for(Path::new(path));
        let stored = chain
            .load()
            .context("Failed to load artifact chain")
            .fail_as(path, FailureKind::Chain)?;
        let data = handler.reconstruct(&stored).fail_as(path, FailureKind::Chain)?;

        let destination = target.join(path);
        if let Some(parent) = destination.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))
                .fail_as(path, FailureKind::Write)?;
        }
        atomic_write(&destination, &data).fail_as(path, FailureKind::Write)?;
        Ok(data.len() as u64)
    }
}

fn build_registry(config: &EngineConfig) -> HandlerRegistry {
    let mut registry = HandlerRegistry::new(Arc::new(BlockDiffCodec::new(
        config.block_size,
        config.compression_threshold,
    )));
    registry.register(
        Arc::new(RegionCodec::new(config.region_block_size, config.compression_threshold)),
        &config.region_extensions,
    );
    registry
}

/// Journal of the highest generation that has one
fn load_committed(layout: &BackupLayout) -> Result<Option<JournalRecord>> {
    for generation in layout.generations()?.into_iter().rev() {
        let Some(mut record) = JournalRecord::load(&layout.journal_path(generation))? else {
            continue;
        };
        if record.generation != generation {
            warn!(directory = generation, journal = record.generation, "journal generation disagrees with its directory");
            record.generation = generation;
        }
        return Ok(Some(record));
    }
    Ok(None)
}

/// Delete artifacts newer than `committed_revision` and stray temp files
fn purge_uncommitted(generation_dir: &Path, committed_revision: u32) -> Result<usize> {
    if !generation_dir.is_dir() {
        return Ok(0);
    }

    let mut stale = Vec::new();
    for entry in WalkDir::new(generation_dir).min_depth(1) {
        let entry = entry.map_err(|e| {
            let path = e.path().unwrap_or(generation_dir).to_path_buf();
            EngineError::io(path, e.into())
        })?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if entry.depth() == 1 && is_reserved(&name) {
            continue;
        }
        let uncommitted = match ArtifactName::parse(&name) {
            Ok(artifact) => artifact.revision > committed_revision,
            Err(_) => name.starts_with(".tmp"),
        };
        if uncommitted {
            stale.push(entry.path().to_path_buf());
        }
    }

    for path in &stale {
        std::fs::remove_file(path).map_err(|e| EngineError::io(path, e))?;
        debug!(path = %path.display(), "purged uncommitted artifact");
    }
    if !stale.is_empty() {
        warn!(removed = stale.len(), committed_revision, "purged leftovers of an interrupted run");
    }
    Ok(stale.len())
}

/// Stamp for a new artifact: the source mtime when settled, else the epoch
///
/// A recent source mtime could repeat after a same-tick rewrite, so it is
/// never recorded; the epoch cannot match a recent mtime.
fn artifact_stamp(read: &StableRead) -> FileTime {
    read.settled_mtime().unwrap_or_else(FileTime::zero)
}

fn stamp_mtime(artifact: &Path, mtime: FileTime) {
    if let Err(err) = filetime::set_file_mtime(artifact, mtime) {
        warn!(path = %artifact.display(), error = %err, "failed to stamp artifact mtime");
    }
}

fn file_name(path: &str) -> &str {
    path.rsplit_once('/').map_or(path, |(_, name)| name)
}

fn log_report(report: &RunReport) {
    info!(
        kind = %report.kind,
        generation = report.generation,
        revision = report.revision,
        snapshots = report.snapshots,
        diffs = report.diffs,
        unchanged = report.unchanged,
        skipped = report.skipped,
        removals = report.removals,
        bytes = report.bytes_written,
        failed = report.failures.len(),
        "backup finished"
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("a/b/c.txt"), "c.txt");
        assert_eq!(file_name("top.dat"), "top.dat");
    }

    #[test]
    fn test_purge_uncommitted() {
        let temp_dir = TempDir::new().unwrap();
        let generation = temp_dir.path();
        fs::create_dir_all(generation.join("sub")).unwrap();
        for name in ["journal", "0.-.a", "1.-.a", "2.-.a", "sub/3.r.b", "sub/1.z-.b", ".tmpAbC12", "notes"] {
            fs::write(generation.join(name), b"").unwrap();
        }

        assert_eq!(purge_uncommitted(generation, 1).unwrap(), 3);
        let mut left: Vec<_> = WalkDir::new(generation)
            .min_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .map(|e| e.path().strip_prefix(generation).unwrap().to_string_lossy().into_owned())
            .collect();
        left.sort();
        assert_eq!(left, vec!["0.-.a", "1.-.a", "journal", "notes", "sub/1.z-.b"]);
    }

    #[test]
    fn test_load_committed_skips_uncommitted_generation() {
        let temp_dir = TempDir::new().unwrap();
        let layout = BackupLayout::new(temp_dir.path());
        fs::create_dir_all(layout.generation_dir(0)).unwrap();
        fs::create_dir_all(layout.generation_dir(1)).unwrap();
        JournalRecord::new(0, 4, BTreeSet::new())
            .save(&layout.journal_path(0))
            .unwrap();

        let record = load_committed(&layout).unwrap().unwrap();
        assert_eq!((record.generation, record.revision), (0, 4));
    }

    #[test]
    fn test_status_reports_held_lock() {
        let temp_dir = TempDir::new().unwrap();
        let source = temp_dir.path().join("source");
        let root = temp_dir.path().join("backups");
        fs::create_dir_all(&source).unwrap();
        let engine = BackupEngine::open(&source, &root, EngineConfig::default()).unwrap();

        // A missing root is neither busy nor created
        assert!(!engine.status().unwrap().busy);
        assert!(!root.exists());

        let held = RootLock::acquire(&root).unwrap();
        let status = engine.status().unwrap();
        assert!(status.busy);
        assert_eq!(status.phase, RunPhase::Idle);
        drop(held);
        assert!(!engine.status().unwrap().busy);
    }

    #[test]
    fn test_registry_routes_region_extensions() {
        let registry = build_registry(&EngineConfig::default());
        assert_eq!(registry.handler_for(Path::new("world/r.0.0.mca")).name(), "region");
        assert_eq!(registry.handler_for(Path::new("level.dat")).name(), "block");
    }
}

//! Artifact-chain resolution over a generation directory
//!
//! Artifacts are discovered purely from file names; nothing is read until a
//! chain is loaded for reconstruction.

use crate::error::{EngineError, Result};
use crate::scan::relative_key;
use chainback_core::{ArtifactName, StoredArtifact};
use chainback_journal::{is_reserved, source_dir_key};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Ordered artifacts of one original file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChain {
    /// Directory holding the artifacts
    pub dir: PathBuf,
    /// Snapshot first, then diffs, in replay order
    pub links: Vec<ArtifactName>,
}

impl FileChain {
    /// Read every link's stored bytes
    pub fn load(&self) -> std::io::Result<Vec<StoredArtifact>> {
        self.links
            .iter()
            .map(|name| {
                let data = std::fs::read(self.dir.join(name.to_file_name()))?;
                Ok(StoredArtifact {
                    name: name.clone(),
                    data,
                })
            })
            .collect()
    }

    /// Path of the newest link's artifact
    pub fn latest_path(&self) -> Option<PathBuf> {
        self.links.last().map(|name| self.dir.join(name.to_file_name()))
    }
}

/// Resolve one file's chain from its artifacts
///
/// Keeps artifacts with revision ≤ `max_revision`, sorts them into chain
/// order and drops everything up to and including the last removal. An
/// empty result means the file does not exist at that revision.
pub fn resolve_chain(mut names: Vec<ArtifactName>, max_revision: u32) -> Vec<ArtifactName> {
    names.retain(|name| name.revision <= max_revision);
    names.sort_by(ArtifactName::chain_cmp);
    match names.iter().rposition(|name| name.removed) {
        Some(last_removal) => names.split_off(last_removal + 1),
        None => names,
    }
}

/// Resolved chains for a whole generation, keyed by source-relative path
#[derive(Debug, Default)]
pub struct ChainTree {
    chains: BTreeMap<String, FileChain>,
    latest_revision: Option<u32>,
}

impl ChainTree {
    /// Resolve every file in `generation_dir` at `max_revision`
    ///
    /// Files whose chain is empty at that revision are omitted. A missing
    /// directory yields an empty tree.
    pub fn resolve(generation_dir: &Path, max_revision: u32) -> Result<Self> {
        let mut grouped: BTreeMap<String, (PathBuf, Vec<ArtifactName>)> = BTreeMap::new();
        let mut latest_revision = None;
        if !generation_dir.is_dir() {
            return Ok(Self::default());
        }

        for entry in WalkDir::new(generation_dir).min_depth(1).follow_links(false) {
            let entry = entry.map_err(|e| {
                let path = e.path().unwrap_or(generation_dir).to_path_buf();
                EngineError::io(path, e.into())
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy();
            if entry.depth() == 1 && is_reserved(&file_name) {
                continue;
            }
            let Some(dir) = entry.path().parent() else {
                continue;
            };
            let Some(name) = parse_artifact(&file_name, dir) else {
                continue;
            };
            let Some(mirrored) = dir.strip_prefix(generation_dir).ok().and_then(relative_key) else {
                tracing::warn!(dir = %dir.display(), "skipping directory with non UTF-8 name");
                continue;
            };
            let rel_dir = source_dir_key(&mirrored);
            latest_revision = latest_revision.max(Some(name.revision));
            let key = if rel_dir.is_empty() {
                name.name.clone()
            } else {
                format!("{rel_dir}/{}", name.name)
            };
            grouped
                .entry(key)
                .or_insert_with(|| (dir.to_path_buf(), Vec::new()))
                .1
                .push(name);
        }

        let chains = grouped
            .into_iter()
            .filter_map(|(key, (dir, names))| {
                let links = resolve_chain(names, max_revision);
                (!links.is_empty()).then_some((key, FileChain { dir, links }))
            })
            .collect();
        Ok(Self {
            chains,
            latest_revision,
        })
    }

    pub fn get(&self, path: &str) -> Option<&FileChain> {
        self.chains.get(path)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.chains.contains_key(path)
    }

    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FileChain)> {
        self.chains.iter()
    }

    /// Highest revision of any artifact found, removals and later revisions included
    pub fn latest_revision(&self) -> Option<u32> {
        self.latest_revision
    }
}

fn parse_artifact(file_name: &str, dir: &Path) -> Option<ArtifactName> {
    match ArtifactName::parse(file_name) {
        Ok(name) => Some(name),
        Err(err) => {
            tracing::warn!(dir = %dir.display(), file = file_name, error = %err, "skipping unrecognized artifact");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chainback_core::CompressionScheme;
    use std::fs;
    use tempfile::TempDir;

    fn stored(revision: u32, name: &str) -> ArtifactName {
        ArtifactName::stored(revision, name, CompressionScheme::Identity)
    }

    #[test]
    fn test_resolve_chain_orders_and_filters() {
        let names = vec![stored(3, "f"), stored(0, "f"), stored(5, "f"), stored(1, "f")];
        let chain = resolve_chain(names, 3);
        let revisions: Vec<_> = chain.iter().map(|n| n.revision).collect();
        assert_eq!(revisions, vec![0, 1, 3]);
    }

    #[test]
    fn test_removal_truncates_prefix() {
        let names = vec![
            stored(0, "f"),
            stored(1, "f"),
            ArtifactName::removal(2, "f"),
            stored(4, "f"),
            stored(5, "f"),
        ];
        assert!(resolve_chain(names.clone(), 2).is_empty());
        assert!(resolve_chain(names.clone(), 3).is_empty());
        let revisions: Vec<_> = resolve_chain(names.clone(), 5).iter().map(|n| n.revision).collect();
        assert_eq!(revisions, vec![4, 5]);
        assert_eq!(resolve_chain(names, 1).len(), 2);
    }

    #[test]
    fn test_removal_then_recreate_same_revision() {
        let names = vec![stored(0, "f"), stored(2, "f"), ArtifactName::removal(2, "f")];
        let chain = resolve_chain(names, 2);
        assert_eq!(chain, vec![stored(2, "f")]);
    }

    #[test]
    fn test_resolve_tree() {
        let temp_dir = TempDir::new().unwrap();
        let generation = temp_dir.path();
        fs::create_dir_all(generation.join("world/region")).unwrap();
        fs::write(generation.join("journal"), b"0\n1\n").unwrap();
        fs::write(generation.join("0.-.level.dat"), b"").unwrap();
        fs::write(generation.join("1.z-.level.dat"), b"").unwrap();
        fs::write(generation.join("0.-.gone.txt"), b"").unwrap();
        fs::write(generation.join("1.r.gone.txt"), b"").unwrap();
        fs::write(generation.join("0.z-.r.0.0.mca"), b"").unwrap();
        fs::write(generation.join("world/region/0.z-.r.0.0.mca"), b"").unwrap();
        fs::write(generation.join("garbage"), b"").unwrap();

        let tree = ChainTree::resolve(generation, 1).unwrap();
        let keys: Vec<_> = tree.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["level.dat", "r.0.0.mca", "world/region/r.0.0.mca"]);
        assert_eq!(tree.get("level.dat").unwrap().links.len(), 2);
        assert_eq!(tree.get("world/region/r.0.0.mca").unwrap().dir, generation.join("world/region"));
        assert_eq!(tree.latest_revision(), Some(1));
        assert_eq!(ChainTree::resolve(generation, 0).unwrap().latest_revision(), Some(1));

        // At revision 0 the removed file still exists
        let earlier = ChainTree::resolve(generation, 0).unwrap();
        assert!(earlier.contains("gone.txt"));
        assert_eq!(earlier.get("level.dat").unwrap().links.len(), 1);
    }

    #[test]
    fn test_escaped_directories_map_back() {
        let temp_dir = TempDir::new().unwrap();
        let generation = temp_dir.path();
        fs::create_dir_all(generation.join("~journal/~~notes")).unwrap();
        fs::write(generation.join("journal"), b"0\n0\n").unwrap();
        fs::write(generation.join("~journal/0.-.day1.txt"), b"").unwrap();
        fs::write(generation.join("~journal/~~notes/0.-.todo"), b"").unwrap();
        fs::write(generation.join("0.-.journal"), b"").unwrap();

        let tree = ChainTree::resolve(generation, 0).unwrap();
        let keys: Vec<_> = tree.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["journal", "journal/day1.txt", "journal/~notes/todo"]);
        assert_eq!(tree.get("journal/day1.txt").unwrap().dir, generation.join("~journal"));
    }

    #[test]
    fn test_load_reads_bytes() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("0.-.a"), b"base").unwrap();
        let chain = FileChain {
            dir: temp_dir.path().to_path_buf(),
            links: vec![stored(0, "a")],
        };
        let loaded = chain.load().unwrap();
        assert_eq!(loaded[0].data, b"base");
    }

    #[test]
    fn test_missing_generation_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        assert!(ChainTree::resolve(&temp_dir.path().join("9"), 0).unwrap().is_empty());
    }
}

//! Per-generation journal: sequence counters plus the tracked-file set
//!
//! Text format, one item per line:
//! ```text
//! <generation>
//! <revision>
//! <tracked path>*      '/'-separated, relative to the source root, sorted
//! ```

use crate::error::{JournalError, Result};
use crate::store::atomic_write;
use std::collections::BTreeSet;
use std::path::Path;

/// Committed state of a backup root
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JournalRecord {
    pub generation: u32,
    /// Last committed revision within `generation`
    pub revision: u32,
    /// Source-relative paths seen by the last completed run
    pub tracked: BTreeSet<String>,
}

impl JournalRecord {
    pub fn new(generation: u32, revision: u32, tracked: BTreeSet<String>) -> Self {
        Self {
            generation,
            revision,
            tracked,
        }
    }

    /// Serialize to the on-disk text form
    pub fn render(&self) -> String {
        let mut out = format!("{}\n{}\n", self.generation, self.revision);
        for path in &self.tracked {
            out.push_str(path);
            out.push('\n');
        }
        out
    }

    /// Parse the on-disk text form; `origin` is only used in errors
    pub fn parse(text: &str, origin: &Path) -> Result<Self> {
        let mut lines = text.lines();
        let generation = parse_counter(lines.next(), origin, 1, "generation")?;
        let revision = parse_counter(lines.next(), origin, 2, "revision")?;
        let tracked = lines
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            generation,
            revision,
            tracked,
        })
    }

    /// Load a journal, `None` if the file does not exist
    pub fn load(path: &Path) -> Result<Option<Self>> {
        match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text, path).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(JournalError::io(path, e)),
        }
    }

    /// Persist via temp file and atomic rename
    pub fn save(&self, path: &Path) -> Result<()> {
        atomic_write(path, self.render().as_bytes())?;
        tracing::debug!(
            path = %path.display(),
            generation = self.generation,
            revision = self.revision,
            tracked = self.tracked.len(),
            "journal saved"
        );
        Ok(())
    }
}

fn parse_counter(line: Option<&str>, origin: &Path, number: usize, what: &str) -> Result<u32> {
    let line = line.ok_or_else(|| JournalError::malformed(origin, number, format!("missing {what}")))?;
    line.trim()
        .parse()
        .map_err(|_| JournalError::malformed(origin, number, format!("{what} '{line}' is not a u32")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record() -> JournalRecord {
        let tracked = ["a.txt", "world/region/r.0.0.mca", "dir with space/x"]
            .into_iter()
            .map(String::from)
            .collect();
        JournalRecord::new(3, 17, tracked)
    }

    #[test]
    fn test_render_layout() {
        let text = record().render();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines[0], "3");
        assert_eq!(lines[1], "17");
        // Sorted
        assert_eq!(&lines[2..], ["a.txt", "dir with space/x", "world/region/r.0.0.mca"]);
    }

    #[test]
    fn test_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("journal");
        let original = record();
        original.save(&path).unwrap();
        assert_eq!(JournalRecord::load(&path).unwrap(), Some(original));
    }

    #[test]
    fn test_load_missing() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(JournalRecord::load(&temp_dir.path().join("journal")).unwrap(), None);
    }

    #[test]
    fn test_empty_tracked_set() {
        let parsed = JournalRecord::parse("0\n0\n", Path::new("j")).unwrap();
        assert_eq!(parsed, JournalRecord::default());
    }

    #[test]
    fn test_malformed() {
        let origin = Path::new("j");
        assert!(matches!(
            JournalRecord::parse("", origin),
            Err(JournalError::Malformed { line: 1, .. })
        ));
        assert!(matches!(
            JournalRecord::parse("1\n", origin),
            Err(JournalError::Malformed { line: 2, .. })
        ));
        assert!(matches!(
            JournalRecord::parse("1\nx\n", origin),
            Err(JournalError::Malformed { line: 2, .. })
        ));
        assert!(JournalRecord::parse("-1\n0\n", origin).is_err());
    }
}

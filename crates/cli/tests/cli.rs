//! End-to-end runs of the chainback binary

use std::fs;
use std::path::Path;
use std::process::{Command, Output};
use tempfile::TempDir;

struct Workspace {
    dir: TempDir,
}

impl Workspace {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("src/nested")).unwrap();
        Self { dir }
    }

    fn path(&self, rel: &str) -> std::path::PathBuf {
        self.dir.path().join(rel)
    }

    fn write(&self, rel: &str, data: &[u8]) {
        let path = self.path(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, data).unwrap();
    }

    fn run(&self, args: &[&str]) -> Output {
        Command::new(env!("CARGO_BIN_EXE_chainback"))
            .args(["--source", "src", "--backup-root", "backup"])
            .args(args)
            .current_dir(self.dir.path())
            .env_remove("RUST_LOG")
            .output()
            .unwrap()
    }

    fn run_ok(&self, args: &[&str]) -> String {
        let output = self.run(args);
        assert!(
            output.status.success(),
            "chainback {:?} failed:\n{}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        strip_ansi(&String::from_utf8_lossy(&output.stdout))
    }
}

fn strip_ansi(text: &str) -> String {
    let mut plain = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\u{1b}' {
            for c in chars.by_ref() {
                if c == 'm' {
                    break;
                }
            }
        } else {
            plain.push(c);
        }
    }
    plain
}

fn read(path: &Path) -> Vec<u8> {
    fs::read(path).unwrap()
}

#[test]
fn test_backup_and_restore_revisions() {
    let ws = Workspace::new();
    ws.write("src/a.txt", b"first version");
    ws.write("src/nested/b.bin", &[7u8; 3000]);

    let out = ws.run_ok(&["full"]);
    assert!(out.contains("Backup committed"));

    ws.write("src/a.txt", b"second version, a little longer");
    fs::remove_file(ws.path("src/nested/b.bin")).unwrap();
    let out = ws.run_ok(&["incremental"]);
    assert!(out.contains("revision 1"));

    ws.run_ok(&["restore", "old", "--revision", "0"]);
    assert_eq!(read(&ws.path("old/a.txt")), b"first version");
    assert_eq!(read(&ws.path("old/nested/b.bin")), vec![7u8; 3000]);

    ws.run_ok(&["restore", "new"]);
    assert_eq!(read(&ws.path("new/a.txt")), b"second version, a little longer");
    assert!(!ws.path("new/nested/b.bin").exists());
}

#[test]
fn test_status_lists_generations() {
    let ws = Workspace::new();
    ws.write("src/a.txt", b"x");

    let out = ws.run_ok(&["status"]);
    assert!(out.contains("no committed backup"));

    ws.run_ok(&["full"]);
    ws.run_ok(&["full"]);
    let out = ws.run_ok(&["status"]);
    assert!(out.contains("generation 1 at revision 0"));
}

#[test]
fn test_restore_missing_generation_fails() {
    let ws = Workspace::new();
    ws.write("src/a.txt", b"x");
    ws.run_ok(&["full"]);

    let output = ws.run(&["restore", "out", "--generation", "5"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("generation 5"));
}

#[test]
fn test_config_file_supplies_paths() {
    let ws = Workspace::new();
    ws.write("src/keep.txt", b"kept");
    ws.write("src/skip.log", b"skipped");
    ws.write(
        "chainback.toml",
        b"[paths]\nsource = \"src\"\nbackup_root = \"backup\"\n\n[engine]\nignore_patterns = [\"*.log\"]\n",
    );

    let output = Command::new(env!("CARGO_BIN_EXE_chainback"))
        .args(["--config", "chainback.toml", "full"])
        .current_dir(ws.dir.path())
        .output()
        .unwrap();
    assert!(output.status.success());

    ws.run_ok(&["restore", "out"]);
    assert_eq!(read(&ws.path("out/keep.txt")), b"kept");
    assert!(!ws.path("out/skip.log").exists());
}

#[test]
fn test_missing_source_flag_is_an_error() {
    let ws = Workspace::new();
    let output = Command::new(env!("CARGO_BIN_EXE_chainback"))
        .arg("status")
        .current_dir(ws.dir.path())
        .output()
        .unwrap();
    assert!(!output.status.success());
}

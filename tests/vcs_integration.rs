//! Integration tests against a real `git` checkout, exercising the
//! subprocess-backed [`GitCli`] implementation instead of the in-memory
//! `FakeVcs` test double used by the unit tests.
//!
//! These tests shell out to the system `git` binary; they're skipped
//! (not failed) if it isn't on `PATH`, mirroring how [`Vcs::is_available`]
//! lets callers degrade gracefully.

use std::fs;
use std::path::Path;
use std::process::Command;

use anchorthread::core::{detect_and_move_all, GitCli, Vcs};

fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn run_git(root: &Path, args: &[&str]) {
    let status = Command::new("git")
        .arg("-C")
        .arg(root)
        .args(args)
        .status()
        .expect("git must be runnable");
    assert!(status.success(), "git {args:?} failed");
}

fn init_repo(root: &Path) {
    run_git(root, &["init", "-q"]);
    run_git(root, &["config", "user.email", "test@example.com"]);
    run_git(root, &["config", "user.name", "Test"]);
}

#[test]
fn detect_rename_follows_a_rename_chain() {
    if !git_available() {
        eprintln!("skipping: git not on PATH");
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    init_repo(root);

    fs::write(root.join("a.md"), "hello\n").unwrap();
    run_git(root, &["add", "a.md"]);
    run_git(root, &["commit", "-q", "-m", "add a.md"]);

    run_git(root, &["mv", "a.md", "b.md"]);
    run_git(root, &["commit", "-q", "-m", "rename a->b"]);

    run_git(root, &["mv", "b.md", "c.md"]);
    run_git(root, &["commit", "-q", "-m", "rename b->c"]);

    let vcs = GitCli;
    assert!(vcs.is_available());
    assert!(vcs.is_repository(root));

    let result = vcs.detect_rename(root, "a.md").unwrap();
    assert_eq!(result, Some("c.md".to_string()));
}

#[test]
fn detect_rename_returns_none_for_untracked_path() {
    if !git_available() {
        eprintln!("skipping: git not on PATH");
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    init_repo(root);
    fs::write(root.join("never_tracked.md"), "x\n").unwrap();

    let vcs = GitCli;
    let result = vcs.detect_rename(root, "never_tracked.md").unwrap();
    assert_eq!(result, None);
}

#[test]
fn is_deleted_distinguishes_gone_from_never_tracked() {
    if !git_available() {
        eprintln!("skipping: git not on PATH");
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    init_repo(root);

    fs::write(root.join("gone.md"), "bye\n").unwrap();
    run_git(root, &["add", "gone.md"]);
    run_git(root, &["commit", "-q", "-m", "add gone.md"]);
    run_git(root, &["rm", "-q", "gone.md"]);
    run_git(root, &["commit", "-q", "-m", "remove gone.md"]);

    let vcs = GitCli;
    assert!(vcs.is_deleted(root, "gone.md").unwrap());
    assert!(!vcs.is_deleted(root, "never_existed.md").unwrap());
}

#[test]
fn detect_and_move_all_relocates_sidecar_across_a_real_rename() {
    if !git_available() {
        eprintln!("skipping: git not on PATH");
        return;
    }
    let tmp = tempfile::tempdir().unwrap();
    let root = tmp.path();
    init_repo(root);

    fs::write(root.join("old_name.rs"), "fn main() {}\n").unwrap();
    run_git(root, &["add", "old_name.rs"]);
    run_git(root, &["commit", "-q", "-m", "add old_name.rs"]);
    run_git(root, &["mv", "old_name.rs", "new_name.rs"]);
    run_git(root, &["commit", "-q", "-m", "rename"]);

    let comments_dir = root.join(".comments");
    fs::create_dir_all(&comments_dir).unwrap();
    let old_sidecar_path = comments_dir.join("old_name.rs.json");
    let hash = anchorthread::core::hash_bytes(b"fn main() {}\n");
    let sidecar = anchorthread::core::SidecarFile::new("old_name.rs", hash);
    anchorthread::core::write_sidecar(
        &old_sidecar_path,
        &sidecar,
        None,
        true,
        std::time::Duration::from_secs(5),
    )
    .unwrap();

    let moved = detect_and_move_all(root, &comments_dir, &GitCli).unwrap();
    assert_eq!(moved, vec![("old_name.rs".to_string(), "new_name.rs".to_string())]);
    assert!(!old_sidecar_path.exists());

    let new_sidecar = anchorthread::core::read_sidecar(&comments_dir.join("new_name.rs.json")).unwrap();
    assert_eq!(new_sidecar.source_file, "new_name.rs");
}

//! End-to-end pipeline tests: project-root discovery, sidecar path
//! mapping, atomic persistence, and reconciliation working together the
//! way a caller (an editor plugin, a pre-commit hook) would actually
//! drive them.

use std::fs;

use anchorthread::core::{
    find_project_root, hash_bytes, reconcile_sidecar, sidecar_path, write_sidecar, Anchor,
    AnchorHealth, AuthorType, Comment, ReconcileConfig, SidecarFile, Thread,
};

fn init_project() -> tempfile::TempDir {
    let tmp = tempfile::tempdir().unwrap();
    fs::create_dir_all(tmp.path().join(".git")).unwrap();
    tmp
}

#[test]
fn full_pipeline_create_write_reconcile() {
    let tmp = init_project();
    let root = find_project_root(tmp.path()).unwrap();
    assert_eq!(root, tmp.path().canonicalize().unwrap());

    let source_relative = "src/lib.rs";
    let source_path = root.join(source_relative);
    fs::create_dir_all(source_path.parent().unwrap()).unwrap();
    fs::write(&source_path, "fn one() {}\nfn two() {}\nfn three() {}\n").unwrap();

    let lines: Vec<String> = fs::read_to_string(&source_path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    let anchor = Anchor::new(&lines, 2, 2, 3).unwrap();
    let thread = Thread::new(anchor, Comment::new("alice", AuthorType::Human, "why i64 here?"));

    let source_hash = hash_bytes(&fs::read(&source_path).unwrap());
    let mut sidecar = SidecarFile::new(source_relative, source_hash);
    sidecar.threads.push(thread);
    sidecar.validate().unwrap();

    let path = sidecar_path(&root, source_relative);
    assert_eq!(path, root.join(".comments/src/lib.rs.json"));
    write_sidecar(&path, &sidecar, Some(&source_path), true, std::time::Duration::from_secs(5)).unwrap();

    // Source is edited: two lines inserted above the anchor.
    fs::write(
        &source_path,
        "// license header\n// more header\nfn one() {}\nfn two() {}\nfn three() {}\n",
    )
    .unwrap();

    let report = reconcile_sidecar(&path, &source_path, &ReconcileConfig::default()).unwrap();
    assert_eq!(report.total_threads, 1);
    assert_eq!(report.anchored_count, 1);
    assert_eq!(report.max_drift_distance, 2);
    assert_ne!(report.source_hash_before, report.source_hash_after);

    let reread = anchorthread::core::read_sidecar(&path).unwrap();
    assert_eq!(reread.threads[0].anchor.line_start, 4);
    assert_eq!(reread.threads[0].anchor.health, AnchorHealth::Anchored);
    assert_eq!(reread.source_hash, report.source_hash_after);
}

#[test]
fn reconciliation_is_idempotent_on_unchanged_source() {
    let tmp = init_project();
    let root = find_project_root(tmp.path()).unwrap();
    let source_relative = "notes.md";
    let source_path = root.join(source_relative);
    fs::write(&source_path, "# Title\n\nSome notes here.\n").unwrap();

    let lines: Vec<String> = fs::read_to_string(&source_path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect();
    let anchor = Anchor::new(&lines, 3, 3, 3).unwrap();
    let thread = Thread::new(anchor, Comment::new("bob", AuthorType::Human, "clarify this"));
    let hash = hash_bytes(&fs::read(&source_path).unwrap());
    let mut sidecar = SidecarFile::new(source_relative, hash);
    sidecar.threads.push(thread);

    let path = sidecar_path(&root, source_relative);
    write_sidecar(&path, &sidecar, Some(&source_path), true, std::time::Duration::from_secs(5)).unwrap();
    let bytes_before = fs::read(&path).unwrap();

    let report = reconcile_sidecar(&path, &source_path, &ReconcileConfig::default()).unwrap();
    assert_eq!(report.source_hash_before, report.source_hash_after);
    assert_eq!(report.anchored_count, 1);
    // No rewrite should have happened: bytes on disk are unchanged.
    assert_eq!(fs::read(&path).unwrap(), bytes_before);
}

#[test]
fn path_traversal_outside_project_root_is_rejected() {
    let tmp = init_project();
    let root = find_project_root(tmp.path()).unwrap();
    let result = anchorthread::core::normalize_path(&root, std::path::Path::new("../../etc/passwd"));
    assert!(result.is_err());
}

#[test]
fn binary_source_file_cannot_be_anchored() {
    let tmp = init_project();
    let root = find_project_root(tmp.path()).unwrap();
    let source_path = root.join("image.bin");
    fs::write(&source_path, [0u8, 1, 2, 3, 0, 0]).unwrap();

    let result = anchorthread::core::compute_source_hash(&source_path);
    assert!(result.is_err());
}

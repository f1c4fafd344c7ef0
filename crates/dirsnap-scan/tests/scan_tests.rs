use std::fs;
use std::path::PathBuf;

use dirsnap_core::path_key;
use dirsnap_scan::{
    BuiltinIndexer, DirectoryHandle, IndexPhase, IndexerSet, ListOptions, SnapshotBuilder,
    SnapshotConfig, WarningKind, snapshot_dir, update_file_index,
};
use serde_json::json;
use tempfile::TempDir;

/// Lay out a small project tree.
fn project() -> TempDir {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("src/nested")).unwrap();
    fs::create_dir_all(root.join("build/out")).unwrap();
    fs::create_dir_all(root.join(".git/objects")).unwrap();
    fs::write(root.join("src/lib.rs"), "pub fn f() {}").unwrap();
    fs::write(root.join("src/nested/mod.rs"), "mod a;").unwrap();
    fs::write(root.join("build/out/bin"), [0u8; 64]).unwrap();
    fs::write(root.join(".git/HEAD"), "ref: refs/heads/main").unwrap();
    fs::write(root.join("notes.log"), "log line").unwrap();
    fs::write(root.join("README"), "readme").unwrap();
    temp
}

#[test]
fn test_snapshot_dir_applies_all_exclusions() {
    let temp = project();
    fs::write(temp.path().join(".snapignore"), "*.log\n\n").unwrap();

    let config = SnapshotConfig::builder()
        .root(temp.path())
        .exclude_patterns(vec!["build/".to_string()])
        .exclude_file(PathBuf::from(".snapignore"))
        .file_indexers(vec!["size".to_string()])
        .build()
        .unwrap();
    let outcome = snapshot_dir(&config).unwrap();
    let snapshot = outcome.snapshot;

    let files: Vec<&str> = snapshot.files.keys().map(String::as_str).collect();
    assert_eq!(files, [".snapignore", "README", "src/lib.rs", "src/nested/mod.rs"]);
    let dirs: Vec<&str> = snapshot.subdirs.keys().map(String::as_str).collect();
    assert_eq!(dirs, ["src", "src/nested"]);

    assert_eq!(snapshot.files["README"].get("size"), Some(&json!(6)));
    let root = temp.path().canonicalize().unwrap();
    assert_eq!(snapshot.root_path(), Some(root.to_string_lossy().as_ref()));
    assert!(outcome.warnings.is_empty());
}

#[test]
fn test_unknown_indexer_is_a_config_error() {
    let temp = project();
    let config = SnapshotConfig::builder()
        .root(temp.path())
        .file_indexers(vec!["md4".to_string()])
        .build()
        .unwrap();
    assert!(snapshot_dir(&config).is_err());
}

#[test]
fn test_snapshot_of_file_is_rejected() {
    let temp = project();
    let config = SnapshotConfig::new(temp.path().join("README"));
    assert!(snapshot_dir(&config).is_err());
}

#[cfg(unix)]
#[test]
fn test_symlinks_never_appear() {
    let temp = project();
    let root = temp.path();
    std::os::unix::fs::symlink(root.join("README"), root.join("readme-link")).unwrap();
    std::os::unix::fs::symlink(root.join("src"), root.join("src-link")).unwrap();

    let outcome = snapshot_dir(&SnapshotConfig::new(root)).unwrap();
    assert!(!outcome.snapshot.files.contains_key("readme-link"));
    assert!(!outcome.snapshot.subdirs.contains_key("src-link"));
    assert!(outcome.snapshot.files.keys().all(|k| !k.starts_with("src-link")));
}

#[test]
fn test_listing_matches_snapshot() {
    let temp = project();
    let mut handle = DirectoryHandle::with_excludes(temp.path(), ["build/"], None).unwrap();

    let listed = handle.files(&ListOptions::new()).unwrap();
    let snapshot = SnapshotBuilder::new(IndexerSet::new(), IndexerSet::new())
        .build(&mut handle)
        .unwrap()
        .snapshot;

    let keys: Vec<String> = listed.iter().map(|p| path_key(p)).collect();
    let snapshot_keys: Vec<String> = snapshot.files.keys().cloned().collect();
    assert_eq!(keys, snapshot_keys);
    assert!(snapshot.files.values().all(|r| r.is_empty()));
}

#[test]
fn test_update_adds_indexer_values() {
    let temp = project();
    let mut handle = DirectoryHandle::open(temp.path()).unwrap();
    let mut snapshot = SnapshotBuilder::new(
        IndexerSet::new().with_builtin(BuiltinIndexer::Size),
        IndexerSet::new(),
    )
    .build(&mut handle)
    .unwrap()
    .snapshot;
    let before = snapshot.files.len();

    fs::write(temp.path().join("late.txt"), "added later").unwrap();

    let sha = IndexerSet::new().with_builtin(BuiltinIndexer::Sha256);
    let warnings = update_file_index(&mut handle, &mut snapshot.files, &sha, None).unwrap();

    assert_eq!(snapshot.files.len(), before + 1);
    assert!(snapshot.files.values().all(|r| r.contains_key("sha256")));
    assert!(snapshot.files["README"].contains_key("size"));
    assert!(!snapshot.files["late.txt"].contains_key("size"));
    assert_eq!(warnings.len(), 1);
    assert_eq!(warnings[0].kind, WarningKind::NotInIndex);
}

#[test]
fn test_progress_reaches_done() {
    let temp = project();
    let mut handle = DirectoryHandle::open(temp.path()).unwrap();
    let builder = SnapshotBuilder::new(
        IndexerSet::new().with_builtin(BuiltinIndexer::XxHash64),
        IndexerSet::new(),
    );
    let mut rx = builder.subscribe();
    builder.build(&mut handle).unwrap();

    let mut phases = Vec::new();
    while let Ok(update) = rx.try_recv() {
        phases.push(update.phase);
    }
    assert_eq!(phases.first(), Some(&IndexPhase::Root));
    assert_eq!(phases.last(), Some(&IndexPhase::Done));
}

#[cfg(target_os = "linux")]
#[test]
fn test_non_utf8_names_are_skipped_not_rewritten() {
    use std::ffi::OsStr;
    use std::os::unix::ffi::OsStrExt;

    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::write(root.join(OsStr::from_bytes(b"a\xff")), "12").unwrap();
    fs::write(root.join(OsStr::from_bytes(b"a\xfe")), "345").unwrap();
    fs::create_dir(root.join(OsStr::from_bytes(b"d\xff"))).unwrap();
    fs::write(root.join("ok.txt"), "67890").unwrap();

    let mut handle = DirectoryHandle::open(root).unwrap();
    assert_eq!(handle.files(&ListOptions::new()).unwrap().len(), 3);
    assert_eq!(handle.size().unwrap(), 2 + 3 + 5);

    let outcome = SnapshotBuilder::new(
        IndexerSet::new().with_builtin(BuiltinIndexer::Size),
        IndexerSet::new().with_builtin(BuiltinIndexer::Mtime),
    )
    .build(&mut handle)
    .unwrap();

    let files: Vec<&str> = outcome.snapshot.files.keys().map(String::as_str).collect();
    assert_eq!(files, ["ok.txt"]);
    assert!(outcome.snapshot.subdirs.is_empty());
    assert_eq!(outcome.warnings.len(), 3);
    assert!(outcome.warnings.iter().all(|w| w.kind == WarningKind::InvalidName));

    let mut index = outcome.snapshot.files;
    let sha = IndexerSet::new().with_builtin(BuiltinIndexer::Sha256);
    let warnings = update_file_index(&mut handle, &mut index, &sha, None).unwrap();
    assert_eq!(index.len(), 1);
    assert!(index["ok.txt"].contains_key("sha256"));
    assert_eq!(warnings.len(), 2);
    assert!(warnings.iter().all(|w| w.kind == WarningKind::InvalidName));
}

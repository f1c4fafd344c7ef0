use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use dirsnap_analyze::{SnapshotDiff, SnapshotDiffer, compare_snapshots};
use dirsnap_core::Snapshot;
use dirsnap_scan::{BuiltinIndexer, DirectoryHandle, IndexerSet, SnapshotBuilder};
use tempfile::TempDir;

fn take_snapshot(root: &Path, file_indexers: IndexerSet) -> Snapshot {
    let mut handle = DirectoryHandle::open(root).unwrap();
    SnapshotBuilder::new(file_indexers, IndexerSet::new())
        .build(&mut handle)
        .unwrap()
        .snapshot
}

fn sha256() -> IndexerSet {
    IndexerSet::new().with_builtin(BuiltinIndexer::Sha256)
}

fn assert_partition(diff: &SnapshotDiff, new: &Snapshot, old: &Snapshot) {
    let universe: BTreeSet<&String> = new.files.keys().chain(old.files.keys()).collect();
    let mut seen = BTreeSet::new();
    for list in [&diff.created, &diff.deleted, &diff.modified, &diff.modified_unknown] {
        for path in list {
            assert!(seen.insert(path), "{path} reported twice");
            assert!(universe.contains(path));
        }
    }
}

#[test]
fn test_edit_delete_create_scenario() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::write(root.join("a.txt"), "first version").unwrap();
    fs::write(root.join("b.txt"), "to be deleted").unwrap();

    let before = take_snapshot(root, sha256());

    fs::write(root.join("a.txt"), "second version").unwrap();
    fs::remove_file(root.join("b.txt")).unwrap();
    fs::write(root.join("c.txt"), "brand new").unwrap();

    let after = take_snapshot(root, sha256());
    let diff = compare_snapshots(&after, &before, None);

    assert_eq!(diff.created, vec!["c.txt"]);
    assert_eq!(diff.deleted, vec!["b.txt"]);
    assert_eq!(diff.modified, vec!["a.txt"]);
    assert!(diff.modified_unknown.is_empty());
    assert!(diff.deleted_dirs.is_empty());
    assert!(diff.created.iter().all(|p| !diff.deleted.contains(p)));
    assert_partition(&diff, &after, &before);
}

#[test]
fn test_no_common_indexer_is_unknown() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir(root.join("nested")).unwrap();
    fs::write(root.join("one.txt"), "1").unwrap();
    fs::write(root.join("nested/two.txt"), "2").unwrap();

    let by_mtime = take_snapshot(root, IndexerSet::new().with_builtin(BuiltinIndexer::Mtime));
    let by_hash = take_snapshot(root, sha256());

    let diff = SnapshotDiffer::new().diff(&by_hash, &by_mtime);
    assert_eq!(diff.modified_unknown, vec!["nested/two.txt", "one.txt"]);
    assert!(diff.modified.is_empty());
    assert!(diff.created.is_empty());
    assert!(diff.deleted.is_empty());
    assert_partition(&diff, &by_hash, &by_mtime);
}

#[test]
fn test_new_directory_is_not_reported() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::write(root.join("keep.txt"), "keep").unwrap();

    let before = take_snapshot(root, sha256());
    fs::create_dir(root.join("fresh")).unwrap();
    let after = take_snapshot(root, sha256());

    assert!(after.subdirs.contains_key("fresh"));
    let diff = compare_snapshots(&after, &before, None);
    assert!(diff.is_empty());
}

#[test]
fn test_removed_directory_is_reported() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir_all(root.join("old/inner")).unwrap();
    fs::write(root.join("old/inner/file.txt"), "x").unwrap();

    let before = take_snapshot(root, sha256());
    fs::remove_dir_all(root.join("old")).unwrap();
    let after = take_snapshot(root, sha256());

    let diff = compare_snapshots(&after, &before, None);
    assert_eq!(diff.deleted_dirs, vec!["old", "old/inner"]);
    assert_eq!(diff.deleted, vec!["old/inner/file.txt"]);
}

#[test]
fn test_excluded_changes_are_invisible() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir(root.join(".git")).unwrap();
    fs::write(root.join(".git/index"), "v1").unwrap();
    fs::write(root.join("src.rs"), "fn f() {}").unwrap();

    let before = take_snapshot(root, sha256());
    fs::write(root.join(".git/index"), "v2").unwrap();
    fs::write(root.join(".git/ORIG_HEAD"), "abc").unwrap();
    let after = take_snapshot(root, sha256());

    assert!(after.files.keys().all(|k| !k.starts_with(".git")));
    assert!(compare_snapshots(&after, &before, None).is_empty());
}

#[test]
fn test_diff_after_round_trip() {
    let temp = TempDir::new().unwrap();
    let root = temp.path().join("data");
    fs::create_dir(&root).unwrap();
    fs::write(root.join("a.txt"), "alpha").unwrap();

    let before = take_snapshot(&root, sha256());
    let stored = temp.path().join("before.json");
    before.save(&stored).unwrap();

    fs::write(root.join("a.txt"), "alpha, revised").unwrap();
    let after = take_snapshot(&root, sha256());

    let loaded = Snapshot::load(&stored).unwrap();
    assert_eq!(loaded, before);

    let diff = SnapshotDiffer::new()
        .with_compare_key("sha256")
        .diff(&after, &loaded);
    assert_eq!(diff.modified, vec!["a.txt"]);
}

use std::fs;
use std::path::Path;
use std::process::{Command, Output};

use tempfile::TempDir;

fn dirsnap(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_dirsnap"))
        .args(args)
        .env_remove("RUST_LOG")
        .output()
        .unwrap()
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

fn path_arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[test]
fn test_snapshot_then_status() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("a.txt"), "one").unwrap();
    fs::write(data.join("b.txt"), "two").unwrap();
    let stored = temp.path().join("snap.json");

    stdout(&dirsnap(&[
        "snapshot",
        path_arg(&data),
        "-f",
        "sha256",
        "-o",
        path_arg(&stored),
    ]));
    assert!(stored.exists());

    fs::write(data.join("a.txt"), "one, edited").unwrap();
    fs::remove_file(data.join("b.txt")).unwrap();

    let text = stdout(&dirsnap(&[
        "status",
        path_arg(&data),
        "--against",
        path_arg(&stored),
    ]));
    assert!(text.contains("M a.txt"));
    assert!(text.contains("- b.txt"));

    let json = stdout(&dirsnap(&[
        "status",
        path_arg(&data),
        "--against",
        path_arg(&stored),
        "--format",
        "json",
    ]));
    let diff: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(diff["modified"], serde_json::json!(["a.txt"]));
    assert_eq!(diff["deleted"], serde_json::json!(["b.txt"]));
}

#[test]
fn test_diff_identical_snapshots() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("data");
    fs::create_dir(&data).unwrap();
    fs::write(data.join("file"), "x").unwrap();
    let first = temp.path().join("first.json");
    let second = temp.path().join("second.json");

    stdout(&dirsnap(&["snapshot", path_arg(&data), "-o", path_arg(&first)]));
    stdout(&dirsnap(&["snapshot", path_arg(&data), "-o", path_arg(&second)]));

    let text = stdout(&dirsnap(&["diff", path_arg(&second), path_arg(&first)]));
    assert!(text.contains("No changes."));
}

#[test]
fn test_ls_and_size() {
    let temp = TempDir::new().unwrap();
    let root = temp.path();
    fs::create_dir(root.join("sub")).unwrap();
    fs::write(root.join("sub/inner.md"), "12345").unwrap();
    fs::write(root.join("top.rs"), "123").unwrap();
    fs::write(root.join("skip.tmp"), "1234567").unwrap();

    let listed = stdout(&dirsnap(&["ls", path_arg(root), "-x", "*.tmp"]));
    let lines: Vec<&str> = listed.lines().collect();
    assert_eq!(lines, ["sub/inner.md", "top.rs"]);

    let dirs = stdout(&dirsnap(&["ls", path_arg(root), "--dirs"]));
    assert_eq!(dirs.trim(), "sub");

    let size = stdout(&dirsnap(&["size", path_arg(root), "-x", "*.tmp", "--bytes"]));
    assert_eq!(size.trim(), "8");
}

#[test]
fn test_diff_rejects_malformed_snapshot() {
    let temp = TempDir::new().unwrap();
    let bad = temp.path().join("bad.json");
    fs::write(&bad, r#"{"files": {}}"#).unwrap();

    let output = dirsnap(&["diff", path_arg(&bad), path_arg(&bad)]);
    assert!(!output.status.success());
}

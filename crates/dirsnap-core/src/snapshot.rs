//! Snapshot model and its JSON form.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::SnapshotError;
use crate::record::EntryRecord;

/// Relative path key to record mapping for files or subdirectories.
pub type SnapshotIndex = BTreeMap<String, EntryRecord>;

const SECTIONS: [&str; 3] = ["root", "subdirs", "files"];

/// Indexed state of a directory tree at one point in time.
///
/// Serialized as an object of objects:
///
/// ```json
/// {
///   "root":    { "/abs/root": { "<indexer>": <value> } },
///   "subdirs": { "rel/dir":   { "<indexer>": <value> } },
///   "files":   { "rel/file":  { "<indexer>": <value> } }
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Exactly one entry: the absolute root path and its directory record.
    pub root: SnapshotIndex,
    /// Records of every retained subdirectory, keyed by relative path.
    pub subdirs: SnapshotIndex,
    /// Records of every retained file, keyed by relative path.
    pub files: SnapshotIndex,
}

impl Snapshot {
    /// Create a snapshot from its three sections.
    pub fn new(
        root_path: impl Into<String>,
        root_record: EntryRecord,
        subdirs: SnapshotIndex,
        files: SnapshotIndex,
    ) -> Self {
        let mut root = SnapshotIndex::new();
        root.insert(root_path.into(), root_record);
        Self {
            root,
            subdirs,
            files,
        }
    }

    /// Absolute path of the snapshotted root.
    pub fn root_path(&self) -> Option<&str> {
        self.root.keys().next().map(String::as_str)
    }

    /// Directory record of the root itself.
    pub fn root_record(&self) -> Option<&EntryRecord> {
        self.root.values().next()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn dir_count(&self) -> usize {
        self.subdirs.len()
    }

    /// Serialize to compact JSON. Keys come out in sorted order.
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Serialize to indented JSON.
    pub fn to_json_pretty(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse a snapshot, checking that all three sections are present and
    /// that `root` holds exactly one entry.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let value: serde_json::Value = serde_json::from_str(json)?;
        let object = value
            .as_object()
            .ok_or_else(|| SnapshotError::malformed("top level is not an object"))?;

        for section in SECTIONS {
            match object.get(section) {
                Some(serde_json::Value::Object(_)) => {}
                Some(_) => {
                    return Err(SnapshotError::malformed(format!(
                        "`{section}` is not an object"
                    )));
                }
                None => {
                    return Err(SnapshotError::malformed(format!(
                        "missing `{section}` section"
                    )));
                }
            }
        }

        let snapshot: Snapshot = serde_json::from_value(value)?;
        if snapshot.root.len() != 1 {
            return Err(SnapshotError::malformed(format!(
                "`root` must hold exactly one entry, found {}",
                snapshot.root.len()
            )));
        }
        Ok(snapshot)
    }

    /// Load a snapshot from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, SnapshotError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Write the snapshot to a JSON file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), SnapshotError> {
        let path = path.as_ref();
        let json = self.to_json_pretty()?;
        std::fs::write(path, json).map_err(|source| SnapshotError::Io {
            path: path.to_path_buf(),
            source,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> Snapshot {
        let mut files = SnapshotIndex::new();
        files.insert(
            "a.txt".to_string(),
            [("xxhash", json!("ef46db3751d8e999")), ("getmtime", json!(1700000000.123456))]
                .into_iter()
                .collect(),
        );
        files.insert("sub/b.txt".to_string(), EntryRecord::new());

        let mut subdirs = SnapshotIndex::new();
        subdirs.insert(
            "sub".to_string(),
            [("getmtime", json!(1699999999.5))].into_iter().collect(),
        );

        Snapshot::new("/data/root", EntryRecord::new(), subdirs, files)
    }

    #[test]
    fn test_root_accessors() {
        let snapshot = sample();
        assert_eq!(snapshot.root_path(), Some("/data/root"));
        assert!(snapshot.root_record().unwrap().is_empty());
        assert_eq!(snapshot.file_count(), 2);
        assert_eq!(snapshot.dir_count(), 1);
    }

    #[test]
    fn test_json_round_trip() {
        let snapshot = sample();
        let json = snapshot.to_json().unwrap();
        let parsed = Snapshot::from_json(&json).unwrap();

        assert_eq!(parsed, snapshot);
        assert_eq!(parsed.to_json().unwrap(), json);
    }

    #[test]
    fn test_serialized_shape() {
        let json = sample().to_json().unwrap();
        assert!(json.starts_with(r#"{"root":{"/data/root":{}},"subdirs":{"#));
        assert!(json.contains(r#""sub/b.txt":{}"#));
    }

    #[test]
    fn test_missing_section_is_malformed() {
        let err = Snapshot::from_json(r#"{"root": {"/r": {}}, "files": {}}"#).unwrap_err();
        assert!(matches!(err, SnapshotError::Malformed { .. }));
        assert!(err.to_string().contains("subdirs"));
    }

    #[test]
    fn test_root_must_have_one_entry() {
        let err = Snapshot::from_json(r#"{"root": {}, "subdirs": {}, "files": {}}"#).unwrap_err();
        assert!(matches!(err, SnapshotError::Malformed { .. }));
    }

    #[test]
    fn test_not_an_object() {
        let err = Snapshot::from_json("[1, 2]").unwrap_err();
        assert!(matches!(err, SnapshotError::Malformed { .. }));

        let err = Snapshot::from_json("{not json").unwrap_err();
        assert!(matches!(err, SnapshotError::Json(_)));
    }

    #[test]
    fn test_save_and_load() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("snap.json");

        let snapshot = sample();
        snapshot.save(&path).unwrap();
        assert_eq!(Snapshot::load(&path).unwrap(), snapshot);

        let missing = Snapshot::load(temp.path().join("missing.json")).unwrap_err();
        assert!(matches!(missing, SnapshotError::Io { .. }));
    }
}

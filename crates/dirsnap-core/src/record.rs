//! Per-entry index records.

use std::collections::BTreeMap;
use std::path::{Component, Path};

use serde::{Deserialize, Serialize};

/// Value produced by an indexer: a digest string, a timestamp, a size...
///
/// Any JSON value is accepted so records survive a round trip through the
/// snapshot format unchanged.
pub type IndexValue = serde_json::Value;

/// Indexer key to value mapping for one file or directory.
///
/// Keys are kept ordered so serialized records are canonical.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryRecord(BTreeMap<String, IndexValue>);

impl EntryRecord {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Value stored under `key`, if that indexer succeeded.
    pub fn get(&self, key: &str) -> Option<&IndexValue> {
        self.0.get(key)
    }

    /// Store a value, replacing any previous value for `key`.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<IndexValue>) {
        self.0.insert(key.into(), value.into());
    }

    /// Whether `key` is present.
    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Merge `other` into this record. Keys from `other` win; keys only
    /// present here are kept.
    pub fn merge(&mut self, other: EntryRecord) {
        self.0.extend(other.0);
    }

    /// Keys present in both records, in order.
    pub fn shared_keys<'a>(&'a self, other: &'a EntryRecord) -> impl Iterator<Item = &'a str> {
        self.0
            .keys()
            .filter(move |k| other.0.contains_key(*k))
            .map(String::as_str)
    }

    /// Iterate over the indexer keys.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Iterate over key/value pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &IndexValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<IndexValue>> FromIterator<(K, V)> for EntryRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Display key for a path relative to the snapshot root.
///
/// Components are joined with `/` on every platform and `.` components are
/// dropped, so `./a/b.txt` and `a\b.txt` (on Windows) both give `a/b.txt`.
/// Names that are not valid UTF-8 are rendered lossily; use
/// [`snapshot_key`] where the key must identify the entry.
pub fn path_key(relative: &Path) -> String {
    join_components(relative, |name| Some(name.to_string_lossy().into_owned()))
        .unwrap_or_else(|| ".".to_string())
}

/// Snapshot key for a path relative to the snapshot root, or `None` if a
/// component is not valid UTF-8 and so has no lossless key.
pub fn snapshot_key(relative: &Path) -> Option<String> {
    join_components(relative, |name| name.to_str().map(str::to_string))
}

fn join_components(
    path: &Path,
    mut name: impl FnMut(&std::ffi::OsStr) -> Option<String>,
) -> Option<String> {
    let mut key = String::new();
    for component in path.components() {
        match component {
            Component::CurDir => continue,
            Component::RootDir => key.push('/'),
            other => {
                if !key.is_empty() && !key.ends_with('/') {
                    key.push('/');
                }
                key.push_str(&name(other.as_os_str())?);
            }
        }
    }
    if key.is_empty() {
        key.push('.');
    }
    Some(key)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overwrites_and_preserves() {
        let mut record: EntryRecord = [("xxhash", json!("aa")), ("getmtime", json!(1.5))]
            .into_iter()
            .collect();
        let update: EntryRecord = [("xxhash", json!("bb")), ("sha256", json!("cc"))]
            .into_iter()
            .collect();

        record.merge(update);

        assert_eq!(record.get("xxhash"), Some(&json!("bb")));
        assert_eq!(record.get("getmtime"), Some(&json!(1.5)));
        assert_eq!(record.get("sha256"), Some(&json!("cc")));
        assert_eq!(record.len(), 3);
    }

    #[test]
    fn test_shared_keys() {
        let a: EntryRecord = [("xxhash", json!("aa")), ("getmtime", json!(1.0))]
            .into_iter()
            .collect();
        let b: EntryRecord = [("sha256", json!("bb")), ("getmtime", json!(2.0))]
            .into_iter()
            .collect();

        let shared: Vec<&str> = a.shared_keys(&b).collect();
        assert_eq!(shared, vec!["getmtime"]);
    }

    #[test]
    fn test_record_serializes_as_plain_object() {
        let record: EntryRecord = [("b", json!(2)), ("a", json!("x"))].into_iter().collect();
        let text = serde_json::to_string(&record).unwrap();
        assert_eq!(text, r#"{"a":"x","b":2}"#);
    }

    #[test]
    fn test_path_key() {
        assert_eq!(path_key(Path::new("a/b.txt")), "a/b.txt");
        assert_eq!(path_key(Path::new("./a/b.txt")), "a/b.txt");
        assert_eq!(path_key(Path::new("top")), "top");
        assert_eq!(path_key(Path::new(".")), ".");
    }

    #[cfg(unix)]
    #[test]
    fn test_absolute_path_key() {
        assert_eq!(path_key(Path::new("/tmp/a/b.txt")), "/tmp/a/b.txt");
        assert_eq!(path_key(Path::new("/")), "/");
    }

    #[cfg(unix)]
    #[test]
    fn test_snapshot_key_rejects_non_utf8() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let name = Path::new("dir").join(OsStr::from_bytes(b"a\xff"));
        assert_eq!(snapshot_key(&name), None);
        assert_eq!(path_key(&name), "dir/a\u{fffd}");
        assert_eq!(snapshot_key(Path::new("./dir/a.txt")), Some("dir/a.txt".to_string()));
        assert_eq!(snapshot_key(Path::new("")), Some(".".to_string()));
    }
}

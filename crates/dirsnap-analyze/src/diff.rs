//! Snapshot comparison.
//!
//! Files are classified by set membership first (created / deleted), then
//! every path present in both snapshots is compared record against record:
//!
//! - with a compare key, only that indexer's values are looked at
//! - without one, every indexer the two records have in common is used;
//!   no common indexer means the change status is unknown
//!
//! Directories are only ever reported as deleted.

use serde::{Deserialize, Serialize};
use tracing::debug;

use dirsnap_core::{EntryRecord, Snapshot, SnapshotError};

/// Change status of one entry between two snapshots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeStatus {
    /// A compared value differs.
    Modified,
    /// All compared values are equal.
    Unchanged,
    /// There is no basis for deciding.
    Unknown,
}

impl ChangeStatus {
    /// Numeric form: 1 modified, 0 unchanged, -1 unknown.
    pub fn code(self) -> i8 {
        match self {
            Self::Modified => 1,
            Self::Unchanged => 0,
            Self::Unknown => -1,
        }
    }
}

/// Compare the records of one entry.
///
/// With `compare_key`, a differing value is [`Modified`](ChangeStatus::Modified)
/// and an equal value is [`Unknown`](ChangeStatus::Unknown); a key missing
/// from either record falls back to [`Unchanged`](ChangeStatus::Unchanged).
///
/// Without a key, the records are compared on their shared keys: none shared
/// is `Unknown`, any difference is `Modified`, otherwise `Unchanged`. An empty
/// key is treated as no key.
pub fn compare_entry(
    new: &EntryRecord,
    old: &EntryRecord,
    compare_key: Option<&str>,
) -> ChangeStatus {
    match compare_key.filter(|key| !key.is_empty()) {
        Some(key) => match (new.get(key), old.get(key)) {
            (Some(a), Some(b)) if a != b => ChangeStatus::Modified,
            (Some(_), Some(_)) => ChangeStatus::Unknown,
            _ => ChangeStatus::Unchanged,
        },
        None => {
            let mut shared = new.shared_keys(old).peekable();
            if shared.peek().is_none() {
                return ChangeStatus::Unknown;
            }
            if shared.any(|key| new.get(key) != old.get(key)) {
                ChangeStatus::Modified
            } else {
                ChangeStatus::Unchanged
            }
        }
    }
}

/// Differences between a newer and an older snapshot.
///
/// The four file lists are disjoint; a file in neither is unchanged.
/// Every list is sorted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotDiff {
    /// Files only in the older snapshot.
    pub deleted: Vec<String>,
    /// Files only in the newer snapshot.
    pub created: Vec<String>,
    /// Files in both whose records differ.
    pub modified: Vec<String>,
    /// Files in both whose change status could not be decided.
    pub modified_unknown: Vec<String>,
    /// Subdirectories only in the older snapshot.
    pub deleted_dirs: Vec<String>,
}

impl SnapshotDiff {
    /// Whether nothing changed.
    pub fn is_empty(&self) -> bool {
        self.deleted.is_empty()
            && self.created.is_empty()
            && self.modified.is_empty()
            && self.modified_unknown.is_empty()
            && self.deleted_dirs.is_empty()
    }

    /// Number of reported file paths.
    pub fn changed_files(&self) -> usize {
        self.deleted.len() + self.created.len() + self.modified.len() + self.modified_unknown.len()
    }

    /// Serialize as JSON.
    pub fn to_json_pretty(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Compares snapshots, optionally on a single indexer key.
#[derive(Debug, Clone, Default)]
pub struct SnapshotDiffer {
    compare_key: Option<String>,
}

impl SnapshotDiffer {
    /// Compare on every shared indexer key.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare on `key` only. An empty key keeps shared-key comparison.
    pub fn with_compare_key(mut self, key: impl Into<String>) -> Self {
        let key = key.into();
        self.compare_key = (!key.is_empty()).then_some(key);
        self
    }

    pub fn compare_key(&self) -> Option<&str> {
        self.compare_key.as_deref()
    }

    /// Diff `new` against `old`.
    pub fn diff(&self, new: &Snapshot, old: &Snapshot) -> SnapshotDiff {
        compare_snapshots(new, old, self.compare_key())
    }

    /// Parse two serialized snapshots and diff them. Fails if either lacks
    /// the root/subdirs/files structure.
    pub fn diff_json(&self, new: &str, old: &str) -> Result<SnapshotDiff, SnapshotError> {
        let new = Snapshot::from_json(new)?;
        let old = Snapshot::from_json(old)?;
        Ok(self.diff(&new, &old))
    }
}

/// Diff `new` against `old`, see [`compare_entry`] for the per-file rules.
pub fn compare_snapshots(new: &Snapshot, old: &Snapshot, compare_key: Option<&str>) -> SnapshotDiff {
    let mut diff = SnapshotDiff {
        deleted: old
            .files
            .keys()
            .filter(|path| !new.files.contains_key(*path))
            .cloned()
            .collect(),
        created: new
            .files
            .keys()
            .filter(|path| !old.files.contains_key(*path))
            .cloned()
            .collect(),
        deleted_dirs: old
            .subdirs
            .keys()
            .filter(|path| !new.subdirs.contains_key(*path))
            .cloned()
            .collect(),
        ..SnapshotDiff::default()
    };

    for (path, new_record) in &new.files {
        let Some(old_record) = old.files.get(path) else {
            continue;
        };
        match compare_entry(new_record, old_record, compare_key) {
            ChangeStatus::Modified => diff.modified.push(path.clone()),
            ChangeStatus::Unknown => diff.modified_unknown.push(path.clone()),
            ChangeStatus::Unchanged => {}
        }
    }

    debug!(
        created = diff.created.len(),
        deleted = diff.deleted.len(),
        modified = diff.modified.len(),
        unknown = diff.modified_unknown.len(),
        deleted_dirs = diff.deleted_dirs.len(),
        "snapshots compared"
    );

    diff
}

//! Snapshot comparison for dirsnap.
//!
//! Compares a newer snapshot against an older one and classifies every file
//! path as created, deleted, modified, of unknown status, or unchanged.
//! Deleted subdirectories are reported too; new or changed directories are
//! not tracked.
//!
//! ```rust,no_run
//! use dirsnap_analyze::SnapshotDiffer;
//! use dirsnap_core::Snapshot;
//!
//! let old = Snapshot::load("before.json").unwrap();
//! let new = Snapshot::load("after.json").unwrap();
//!
//! let diff = SnapshotDiffer::new().diff(&new, &old);
//! for path in &diff.modified {
//!     println!("M {path}");
//! }
//! ```

mod diff;

pub use diff::{ChangeStatus, SnapshotDiff, SnapshotDiffer, compare_entry, compare_snapshots};

// Re-export core types
pub use dirsnap_core::{EntryRecord, Snapshot, SnapshotError};

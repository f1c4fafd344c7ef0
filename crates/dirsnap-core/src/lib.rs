//! Core types for dirsnap.
//!
//! This crate provides the data model shared by the rest of the workspace:
//! the snapshot of a directory tree, the per-entry index records it is made
//! of, configuration and the error/warning types.

mod config;
mod error;
mod record;
mod snapshot;

pub use config::{DEFAULT_EXCLUDES, SnapshotConfig, SnapshotConfigBuilder};
pub use error::{ScanError, ScanWarning, SnapshotError, WarningKind};
pub use record::{EntryRecord, IndexValue, path_key, snapshot_key};
pub use snapshot::{Snapshot, SnapshotIndex};

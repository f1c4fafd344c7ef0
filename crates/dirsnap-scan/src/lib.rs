//! Directory traversal and indexing engine for dirsnap.
//!
//! This crate turns a directory tree into a [`Snapshot`]:
//!
//! - **Exclusion rules** via gitignore-style patterns ([`PathFilter`])
//! - **Pruned traversal** via jwalk; excluded subtrees are never read and
//!   symlinks are never followed ([`Traverser`])
//! - **Cached listings** of a scan root ([`DirectoryHandle`])
//! - **Pluggable indexers** such as content hashes and mtimes ([`IndexerSet`])
//! - **Parallel snapshot building** via rayon ([`SnapshotBuilder`])
//!
//! # Example
//!
//! ```rust,no_run
//! use dirsnap_scan::{BuiltinIndexer, DirectoryHandle, IndexerSet, SnapshotBuilder};
//!
//! let mut handle = DirectoryHandle::open("/path/to/scan").unwrap();
//! let builder = SnapshotBuilder::new(
//!     IndexerSet::new().with_builtin(BuiltinIndexer::Sha256),
//!     IndexerSet::new(),
//! );
//! let outcome = builder.build(&mut handle).unwrap();
//!
//! println!("Indexed {} files", outcome.snapshot.file_count());
//! ```
//!
//! # Progress Monitoring
//!
//! ```rust,no_run
//! use dirsnap_scan::{IndexerSet, SnapshotBuilder};
//!
//! let builder = SnapshotBuilder::new(IndexerSet::new(), IndexerSet::new());
//! let mut progress_rx = builder.subscribe();
//!
//! std::thread::spawn(move || {
//!     while let Ok(progress) = progress_rx.blocking_recv() {
//!         println!("{} / {}", progress.entries_indexed, progress.total_entries);
//!     }
//! });
//! ```

mod builder;
mod filter;
mod handle;
mod indexer;
mod progress;
mod walker;

pub use builder::{
    SnapshotBuilder, SnapshotOutcome, compute_record, snapshot_dir, update_file_index,
    update_subdir_index,
};
pub use filter::PathFilter;
pub use handle::{DirectoryHandle, ListOptions, TraversalCache};
pub use indexer::{
    BuiltinIndexer, DEFAULT_CHUNK_SIZE, FnIndexer, HashAlgorithm, HashIndexer, IndexError,
    Indexer, IndexerSet, MtimeIndexer, SizeIndexer,
};
pub use progress::{IndexPhase, IndexProgress};
pub use walker::{Traverser, Walk, WalkLevel};

// Re-export core types for convenience
pub use dirsnap_core::{
    EntryRecord, IndexValue, ScanError, ScanWarning, Snapshot, SnapshotConfig, SnapshotIndex,
    WarningKind,
};

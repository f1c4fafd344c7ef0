//! Snapshot construction and incremental index updates.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use dirsnap_core::{
    EntryRecord, ScanError, ScanWarning, Snapshot, SnapshotConfig, SnapshotIndex, snapshot_key,
};

use crate::handle::{DirectoryHandle, ListOptions};
use crate::indexer::IndexerSet;
use crate::progress::{IndexPhase, IndexProgress};

/// Entries between two progress messages.
const PROGRESS_INTERVAL: u64 = 256;

/// A built snapshot together with the problems met while building it.
#[derive(Debug, Clone)]
pub struct SnapshotOutcome {
    pub snapshot: Snapshot,
    pub warnings: Vec<ScanWarning>,
}

/// Builds snapshots by applying indexer sets to a [`DirectoryHandle`].
///
/// Records are computed in parallel. An indexer that fails on an entry only
/// leaves its key out of that entry's record; the entry is still included
/// and the failure is reported as a warning.
pub struct SnapshotBuilder {
    file_indexers: IndexerSet,
    dir_indexers: IndexerSet,
    threads: usize,
    progress_tx: broadcast::Sender<IndexProgress>,
}

impl SnapshotBuilder {
    /// Create a builder applying `file_indexers` to files and
    /// `dir_indexers` to the root and subdirectories.
    pub fn new(file_indexers: IndexerSet, dir_indexers: IndexerSet) -> Self {
        let (progress_tx, _) = broadcast::channel(100);
        Self {
            file_indexers,
            dir_indexers,
            threads: 0,
            progress_tx,
        }
    }

    /// Resolve the indexer keys named in `config`.
    pub fn from_config(config: &SnapshotConfig) -> Result<Self, ScanError> {
        let files = IndexerSet::from_keys(&config.file_indexers, config.chunk_size)?;
        let dirs = IndexerSet::from_keys(&config.dir_indexers, config.chunk_size)?;
        Ok(Self::new(files, dirs).with_threads(config.threads))
    }

    /// Number of indexing threads (0 = rayon default pool).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Subscribe to indexing progress updates.
    pub fn subscribe(&self) -> broadcast::Receiver<IndexProgress> {
        self.progress_tx.subscribe()
    }

    pub fn file_indexers(&self) -> &IndexerSet {
        &self.file_indexers
    }

    pub fn dir_indexers(&self) -> &IndexerSet {
        &self.dir_indexers
    }

    /// Walk the handle afresh and index the root, every file and every
    /// subdirectory. The handle's cache is released before returning.
    pub fn build(&self, handle: &mut DirectoryHandle) -> Result<SnapshotOutcome, ScanError> {
        let start = Instant::now();
        handle.populate(true)?;

        let mut warnings: Vec<ScanWarning> = handle.warnings().to_vec();

        let root = handle.path().to_path_buf();
        let (root_record, root_warnings) =
            compute_record(&root, Path::new("."), &self.dir_indexers);
        warnings.extend(root_warnings);
        self.send(IndexPhase::Root, 1, 1, warnings.len() as u64, &root, start);

        let files = handle.cache().files().to_vec();
        let subdirs = handle.cache().subdirs().to_vec();
        handle.depopulate();

        let (file_index, file_warnings) =
            self.index_entries(&root, &files, &self.file_indexers, IndexPhase::Files, start)?;
        warnings.extend(file_warnings);

        let (subdir_index, subdir_warnings) =
            self.index_entries(&root, &subdirs, &self.dir_indexers, IndexPhase::Subdirs, start)?;
        warnings.extend(subdir_warnings);

        let snapshot = Snapshot::new(
            root.to_string_lossy(),
            root_record,
            subdir_index,
            file_index,
        );
        self.send(
            IndexPhase::Done,
            (files.len() + subdirs.len()) as u64,
            (files.len() + subdirs.len()) as u64,
            warnings.len() as u64,
            &root,
            start,
        );
        info!(
            root = %root.display(),
            files = snapshot.file_count(),
            subdirs = snapshot.dir_count(),
            warnings = warnings.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "snapshot built"
        );

        Ok(SnapshotOutcome { snapshot, warnings })
    }

    /// Index `entries` (relative to `root`) in parallel.
    ///
    /// Entries without a UTF-8 snapshot key are skipped with a warning.
    fn index_entries(
        &self,
        root: &Path,
        entries: &[PathBuf],
        indexers: &IndexerSet,
        phase: IndexPhase,
        start: Instant,
    ) -> Result<(SnapshotIndex, Vec<ScanWarning>), ScanError> {
        let (entries, skipped) = keyed_entries(entries);
        let total = entries.len() as u64;
        let done = AtomicU64::new(0);
        let failures = AtomicU64::new(0);
        let warnings = Mutex::new(Vec::new());

        let work = || -> SnapshotIndex {
            entries
                .par_iter()
                .map(|(key, relative)| {
                    let (record, entry_warnings) = compute_record(root, relative, indexers);
                    if !entry_warnings.is_empty() {
                        failures.fetch_add(entry_warnings.len() as u64, Ordering::Relaxed);
                        if let Ok(mut all) = warnings.lock() {
                            all.extend(entry_warnings);
                        }
                    }
                    let count = done.fetch_add(1, Ordering::Relaxed) + 1;
                    if count % PROGRESS_INTERVAL == 0 {
                        self.send(
                            phase,
                            count,
                            total,
                            failures.load(Ordering::Relaxed),
                            relative,
                            start,
                        );
                    }
                    (key.clone(), record)
                })
                .collect()
        };

        let index = self.run(work)?;
        self.send(phase, total, total, failures.load(Ordering::Relaxed), root, start);

        let mut warnings = warnings.into_inner().unwrap_or_default();
        warnings.extend(skipped);
        warnings.sort_by(|a, b| a.path.cmp(&b.path));
        Ok((index, warnings))
    }

    /// Run `work` on the configured pool.
    fn run<T: Send>(&self, work: impl FnOnce() -> T + Send) -> Result<T, ScanError> {
        if self.threads == 0 {
            return Ok(work());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| ScanError::Other {
                message: format!("failed to start indexing pool: {e}"),
            })?;
        Ok(pool.install(work))
    }

    fn send(
        &self,
        phase: IndexPhase,
        entries_indexed: u64,
        total_entries: u64,
        failures: u64,
        current_path: &Path,
        start: Instant,
    ) {
        let _ = self.progress_tx.send(IndexProgress {
            phase,
            entries_indexed,
            total_entries,
            failures,
            current_path: current_path.to_path_buf(),
            elapsed: start.elapsed(),
        });
    }
}

/// Pair each relative path with its snapshot key.
///
/// Paths whose names are not valid UTF-8 have no key; they are dropped and
/// reported instead of being indexed under a rewritten name.
fn keyed_entries(entries: &[PathBuf]) -> (Vec<(String, &Path)>, Vec<ScanWarning>) {
    let mut keyed = Vec::with_capacity(entries.len());
    let mut skipped = Vec::new();
    for relative in entries {
        match snapshot_key(relative) {
            Some(key) => keyed.push((key, relative.as_path())),
            None => {
                warn!(path = %relative.display(), "skipping entry with non UTF-8 name");
                skipped.push(ScanWarning::invalid_name(relative));
            }
        }
    }
    (keyed, skipped)
}

/// Apply every indexer in `indexers` to `root/relative`.
///
/// Failing indexers contribute no key; each failure is returned as a
/// warning instead.
pub fn compute_record(
    root: &Path,
    relative: &Path,
    indexers: &IndexerSet,
) -> (EntryRecord, Vec<ScanWarning>) {
    let absolute = root.join(relative);
    let mut record = EntryRecord::new();
    let mut warnings = Vec::new();

    for indexer in indexers.iter() {
        match indexer.index(&absolute) {
            Ok(value) => record.insert(indexer.key(), value),
            Err(err) => {
                warn!(path = %relative.display(), indexer = indexer.key(), error = %err, "indexer failed");
                warnings.push(ScanWarning::index_failed(relative, indexer.key(), &err));
            }
        }
    }

    (record, warnings)
}

/// Take a snapshot of the directory described by `config`.
pub fn snapshot_dir(config: &SnapshotConfig) -> Result<SnapshotOutcome, ScanError> {
    let mut handle = DirectoryHandle::from_config(config)?;
    SnapshotBuilder::from_config(config)?.build(&mut handle)
}

/// Merge fresh values from `indexers` into an existing file index.
///
/// With `paths` set only those relative paths are indexed; otherwise the
/// handle is re-walked and every current file is. Paths missing from the
/// index are added (with a warning). Entries for files no longer on disk
/// are left in place.
pub fn update_file_index(
    handle: &mut DirectoryHandle,
    index: &mut SnapshotIndex,
    indexers: &IndexerSet,
    paths: Option<&[String]>,
) -> Result<Vec<ScanWarning>, ScanError> {
    let (targets, mut warnings) = match paths {
        Some(paths) => (paths.to_vec(), Vec::new()),
        None => {
            let files = handle.files(&ListOptions::new().force_refresh(true))?;
            handle.depopulate();
            listed_keys(&files)
        }
    };
    warnings.extend(update_index(handle.path(), index, indexers, &targets));
    Ok(warnings)
}

/// Merge fresh values from `indexers` into an existing subdirectory index.
///
/// Same rules as [`update_file_index`].
pub fn update_subdir_index(
    handle: &mut DirectoryHandle,
    index: &mut SnapshotIndex,
    indexers: &IndexerSet,
    paths: Option<&[String]>,
) -> Result<Vec<ScanWarning>, ScanError> {
    let (targets, mut warnings) = match paths {
        Some(paths) => (paths.to_vec(), Vec::new()),
        None => {
            let subdirs = handle.subdirs(&ListOptions::new().force_refresh(true))?;
            handle.depopulate();
            listed_keys(&subdirs)
        }
    };
    warnings.extend(update_index(handle.path(), index, indexers, &targets));
    Ok(warnings)
}

fn listed_keys(listed: &[PathBuf]) -> (Vec<String>, Vec<ScanWarning>) {
    let (keyed, skipped) = keyed_entries(listed);
    (keyed.into_iter().map(|(key, _)| key).collect(), skipped)
}

fn update_index(
    root: &Path,
    index: &mut SnapshotIndex,
    indexers: &IndexerSet,
    targets: &[String],
) -> Vec<ScanWarning> {
    let mut warnings = Vec::new();

    for key in targets {
        let record = index.entry(key.clone()).or_insert_with(|| {
            warn!(path = %key, "path was not in index");
            warnings.push(ScanWarning::not_in_index(key));
            EntryRecord::new()
        });
        let (fresh, entry_warnings) = compute_record(root, Path::new(key), indexers);
        record.merge(fresh);
        warnings.extend(entry_warnings);
    }

    debug!(updated = targets.len(), warnings = warnings.len(), "index updated");
    warnings
}

//! Indexing progress reporting.

use std::path::PathBuf;
use std::time::Duration;

/// Which part of the snapshot is being indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexPhase {
    Root,
    Files,
    Subdirs,
    Done,
}

/// Progress information while building a snapshot.
#[derive(Debug, Clone)]
pub struct IndexProgress {
    /// Current phase.
    pub phase: IndexPhase,
    /// Entries indexed so far in this phase.
    pub entries_indexed: u64,
    /// Entries to index in this phase.
    pub total_entries: u64,
    /// Indexer failures so far.
    pub failures: u64,
    /// Last entry that finished indexing.
    pub current_path: PathBuf,
    /// Time elapsed since the build started.
    pub elapsed: Duration,
}

impl IndexProgress {
    /// Create initial progress state.
    pub fn new(phase: IndexPhase, total_entries: u64) -> Self {
        Self {
            phase,
            entries_indexed: 0,
            total_entries,
            failures: 0,
            current_path: PathBuf::new(),
            elapsed: Duration::ZERO,
        }
    }

    /// Completed fraction of the current phase, in `0.0..=1.0`.
    pub fn fraction(&self) -> f64 {
        if self.total_entries == 0 {
            1.0
        } else {
            self.entries_indexed as f64 / self.total_entries as f64
        }
    }

    /// Entries indexed per second.
    pub fn entries_per_second(&self) -> f64 {
        if self.elapsed.as_secs_f64() > 0.0 {
            self.entries_indexed as f64 / self.elapsed.as_secs_f64()
        } else {
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fraction() {
        let mut progress = IndexProgress::new(IndexPhase::Files, 4);
        assert_eq!(progress.fraction(), 0.0);
        progress.entries_indexed = 1;
        assert_eq!(progress.fraction(), 0.25);

        let empty = IndexProgress::new(IndexPhase::Subdirs, 0);
        assert_eq!(empty.fraction(), 1.0);
    }

    #[test]
    fn test_rate() {
        let mut progress = IndexProgress::new(IndexPhase::Files, 100);
        assert_eq!(progress.entries_per_second(), 0.0);
        progress.entries_indexed = 50;
        progress.elapsed = Duration::from_secs(2);
        assert_eq!(progress.entries_per_second(), 25.0);
    }
}

//! Snapshot configuration types.

use std::path::PathBuf;

use derive_builder::Builder;
use serde::{Deserialize, Serialize};

/// Exclusion patterns that are always applied, ahead of any user patterns.
pub const DEFAULT_EXCLUDES: [&str; 3] = [".git/", ".hg/", ".svn/"];

/// Configuration for taking a snapshot of a directory.
#[derive(Debug, Clone, Builder, Serialize, Deserialize)]
#[builder(setter(into), build_fn(validate = "Self::validate"))]
pub struct SnapshotConfig {
    /// Root directory to snapshot.
    pub root: PathBuf,

    /// Additional exclusion patterns (gitignore syntax).
    #[builder(default)]
    #[serde(default)]
    pub exclude_patterns: Vec<String>,

    /// Pattern file, relative to the root, whose lines are appended to the
    /// exclusion patterns. Ignored when missing.
    #[builder(default)]
    #[serde(default)]
    pub exclude_file: Option<PathBuf>,

    /// Indexer keys applied to every file.
    #[builder(default = "default_file_indexers()")]
    #[serde(default = "default_file_indexers")]
    pub file_indexers: Vec<String>,

    /// Indexer keys applied to the root and every subdirectory.
    #[builder(default)]
    #[serde(default)]
    pub dir_indexers: Vec<String>,

    /// Number of indexing threads (0 = rayon default pool).
    #[builder(default = "0")]
    #[serde(default)]
    pub threads: usize,

    /// Read block size used by streaming hash indexers.
    #[builder(default = "4096")]
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_file_indexers() -> Vec<String> {
    vec!["xxhash".to_string()]
}

fn default_chunk_size() -> usize {
    4096
}

impl SnapshotConfigBuilder {
    fn validate(&self) -> Result<(), String> {
        match self.root {
            Some(ref root) if root.as_os_str().is_empty() => {
                return Err("Root path cannot be empty".to_string());
            }
            None => return Err("Root path is required".to_string()),
            _ => {}
        }
        if self.chunk_size == Some(0) {
            return Err("Chunk size must be greater than zero".to_string());
        }
        Ok(())
    }
}

impl SnapshotConfig {
    /// Create a new snapshot config builder.
    pub fn builder() -> SnapshotConfigBuilder {
        SnapshotConfigBuilder::default()
    }

    /// Create a config for snapshotting a path with the default indexers.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            exclude_patterns: Vec::new(),
            exclude_file: None,
            file_indexers: default_file_indexers(),
            dir_indexers: Vec::new(),
            threads: 0,
            chunk_size: default_chunk_size(),
        }
    }

    /// Full ordered exclusion list: the fixed defaults followed by the
    /// configured patterns.
    pub fn all_exclude_patterns(&self) -> Vec<String> {
        DEFAULT_EXCLUDES
            .iter()
            .map(|p| p.to_string())
            .chain(self.exclude_patterns.iter().cloned())
            .collect()
    }
}

impl Default for SnapshotConfig {
    fn default() -> Self {
        Self::new(".")
    }
}

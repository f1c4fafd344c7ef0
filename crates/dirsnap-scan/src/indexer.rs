//! Indexing functions applied to every file or directory.

use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use indexmap::IndexMap;
use sha2::{Digest, Sha256};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};
use thiserror::Error;
use xxhash_rust::xxh64::Xxh64;

use dirsnap_core::{IndexValue, ScanError};

/// Default read block size for streaming hashes.
pub const DEFAULT_CHUNK_SIZE: usize = 4096;

/// Failure of one indexer on one path.
#[derive(Debug, Error)]
pub enum IndexError {
    /// Reading the entry failed.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The indexer cannot handle this kind of entry.
    #[error("{message}")]
    Unsupported { message: String },
}

impl IndexError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// A named function computing one value for a filesystem entry.
pub trait Indexer: Send + Sync {
    /// Key the value is stored under in entry records.
    fn key(&self) -> &str;

    /// Compute the value for the entry at `path` (absolute).
    fn index(&self, path: &Path) -> Result<IndexValue, IndexError>;
}

/// Indexers that ship with dirsnap, addressable by key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, EnumIter)]
pub enum BuiltinIndexer {
    /// Streaming SHA-256 hex digest.
    #[strum(serialize = "sha256")]
    Sha256,
    /// Streaming XXH64 hex digest.
    #[strum(serialize = "xxhash")]
    XxHash64,
    /// Streaming BLAKE3 hex digest.
    #[strum(serialize = "blake3")]
    Blake3,
    /// Modification time, seconds since the Unix epoch.
    #[strum(serialize = "getmtime")]
    Mtime,
    /// Size in bytes.
    #[strum(serialize = "size")]
    Size,
}

impl BuiltinIndexer {
    /// Instantiate with the given hash block size.
    pub fn create(self, chunk_size: usize) -> Arc<dyn Indexer> {
        match self {
            Self::Sha256 => Arc::new(HashIndexer::new(HashAlgorithm::Sha256, chunk_size)),
            Self::XxHash64 => Arc::new(HashIndexer::new(HashAlgorithm::XxHash64, chunk_size)),
            Self::Blake3 => Arc::new(HashIndexer::new(HashAlgorithm::Blake3, chunk_size)),
            Self::Mtime => Arc::new(MtimeIndexer),
            Self::Size => Arc::new(SizeIndexer),
        }
    }

    /// Every built-in key.
    pub fn keys() -> Vec<String> {
        Self::iter().map(|b| b.to_string()).collect()
    }
}

/// Content hash algorithms supported by [`HashIndexer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha256,
    XxHash64,
    Blake3,
}

impl HashAlgorithm {
    fn key(self) -> &'static str {
        match self {
            Self::Sha256 => "sha256",
            Self::XxHash64 => "xxhash",
            Self::Blake3 => "blake3",
        }
    }
}

enum StreamingHasher {
    Sha256(Sha256),
    XxHash64(Xxh64),
    Blake3(Box<blake3::Hasher>),
}

impl StreamingHasher {
    fn new(algorithm: HashAlgorithm) -> Self {
        match algorithm {
            HashAlgorithm::Sha256 => Self::Sha256(Sha256::new()),
            HashAlgorithm::XxHash64 => Self::XxHash64(Xxh64::new(0)),
            HashAlgorithm::Blake3 => Self::Blake3(Box::new(blake3::Hasher::new())),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Self::Sha256(h) => h.update(data),
            Self::XxHash64(h) => h.update(data),
            Self::Blake3(h) => {
                h.update(data);
            }
        }
    }

    fn finish_hex(self) -> String {
        match self {
            Self::Sha256(h) => to_hex(&h.finalize()),
            Self::XxHash64(h) => format!("{:016x}", h.digest()),
            Self::Blake3(h) => h.finalize().to_hex().to_string(),
        }
    }
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Hashes file contents in fixed-size blocks and yields a hex digest.
#[derive(Debug, Clone)]
pub struct HashIndexer {
    algorithm: HashAlgorithm,
    chunk_size: usize,
}

impl HashIndexer {
    pub fn new(algorithm: HashAlgorithm, chunk_size: usize) -> Self {
        Self {
            algorithm,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Hex digest of the file at `path`.
    pub fn hash_file(&self, path: &Path) -> Result<String, IndexError> {
        let mut file = File::open(path).map_err(|e| IndexError::io(path, e))?;
        let mut hasher = StreamingHasher::new(self.algorithm);
        let mut buffer = vec![0u8; self.chunk_size];

        loop {
            let bytes_read = match file.read(&mut buffer) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(IndexError::io(path, e)),
            };
            hasher.update(&buffer[..bytes_read]);
        }

        Ok(hasher.finish_hex())
    }
}

impl Indexer for HashIndexer {
    fn key(&self) -> &str {
        self.algorithm.key()
    }

    fn index(&self, path: &Path) -> Result<IndexValue, IndexError> {
        self.hash_file(path).map(IndexValue::from)
    }
}

/// Last modification time as floating point seconds since the Unix epoch.
#[derive(Debug, Clone, Copy, Default)]
pub struct MtimeIndexer;

impl Indexer for MtimeIndexer {
    fn key(&self) -> &str {
        "getmtime"
    }

    fn index(&self, path: &Path) -> Result<IndexValue, IndexError> {
        let modified = std::fs::metadata(path)
            .and_then(|m| m.modified())
            .map_err(|e| IndexError::io(path, e))?;
        let seconds = match modified.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs_f64(),
            Err(e) => -e.duration().as_secs_f64(),
        };
        serde_json::Number::from_f64(seconds)
            .map(IndexValue::Number)
            .ok_or_else(|| IndexError::Unsupported {
                message: format!("modification time of {} is not finite", path.display()),
            })
    }
}

/// Size in bytes from metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct SizeIndexer;

impl Indexer for SizeIndexer {
    fn key(&self) -> &str {
        "size"
    }

    fn index(&self, path: &Path) -> Result<IndexValue, IndexError> {
        let metadata = std::fs::metadata(path).map_err(|e| IndexError::io(path, e))?;
        Ok(IndexValue::from(metadata.len()))
    }
}

type IndexFn = dyn Fn(&Path) -> Result<IndexValue, IndexError> + Send + Sync;

/// Indexer backed by a closure.
pub struct FnIndexer {
    key: String,
    func: Box<IndexFn>,
}

impl FnIndexer {
    pub fn new<F>(key: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Path) -> Result<IndexValue, IndexError> + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            func: Box::new(func),
        }
    }
}

impl fmt::Debug for FnIndexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnIndexer").field("key", &self.key).finish()
    }
}

impl Indexer for FnIndexer {
    fn key(&self) -> &str {
        &self.key
    }

    fn index(&self, path: &Path) -> Result<IndexValue, IndexError> {
        (self.func)(path)
    }
}

/// A keyed collection of indexers applied uniformly to a set of entries.
///
/// Keys are unique; adding an indexer under an existing key replaces it.
/// Iteration follows insertion order.
#[derive(Clone, Default)]
pub struct IndexerSet {
    indexers: IndexMap<String, Arc<dyn Indexer>>,
}

impl IndexerSet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve built-in indexers by key.
    pub fn from_keys<I, S>(keys: I, chunk_size: usize) -> Result<Self, ScanError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut set = Self::new();
        for key in keys {
            let key = key.as_ref();
            let builtin = BuiltinIndexer::from_str(key).map_err(|_| ScanError::InvalidConfig {
                message: format!(
                    "unknown indexer {key:?} (available: {})",
                    BuiltinIndexer::keys().join(", ")
                ),
            })?;
            set.insert_arc(builtin.create(chunk_size));
        }
        Ok(set)
    }

    /// Add an indexer, replacing any with the same key.
    pub fn insert(&mut self, indexer: impl Indexer + 'static) {
        self.insert_arc(Arc::new(indexer));
    }

    /// Add a shared indexer, replacing any with the same key.
    pub fn insert_arc(&mut self, indexer: Arc<dyn Indexer>) {
        self.indexers.insert(indexer.key().to_string(), indexer);
    }

    /// Builder-style [`insert`](Self::insert).
    pub fn with(mut self, indexer: impl Indexer + 'static) -> Self {
        self.insert(indexer);
        self
    }

    /// Builder-style insertion of a built-in with the default block size.
    pub fn with_builtin(mut self, builtin: BuiltinIndexer) -> Self {
        self.insert_arc(builtin.create(DEFAULT_CHUNK_SIZE));
        self
    }

    pub fn get(&self, key: &str) -> Option<&Arc<dyn Indexer>> {
        self.indexers.get(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.indexers.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn Indexer>> {
        self.indexers.values()
    }

    pub fn len(&self) -> usize {
        self.indexers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indexers.is_empty()
    }
}

impl fmt::Debug for IndexerSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.indexers.keys()).finish()
    }
}

//! Scan root handle with a cached listing of its retained contents.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use globset::{GlobBuilder, GlobMatcher};

use dirsnap_core::{ScanError, ScanWarning, SnapshotConfig, path_key};

use crate::filter::PathFilter;
use crate::walker::{Traverser, Walk};

/// Result of the last completed walk, paths relative to the handle root.
///
/// `files` and `subdirs` are always filled and cleared together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraversalCache {
    files: Vec<PathBuf>,
    subdirs: Vec<PathBuf>,
    populated: bool,
}

impl TraversalCache {
    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn subdirs(&self) -> &[PathBuf] {
        &self.subdirs
    }

    pub fn is_populated(&self) -> bool {
        self.populated
    }

    fn clear(&mut self) {
        self.files.clear();
        self.subdirs.clear();
        self.populated = false;
    }
}

/// Options for listing cached files or subdirectories.
#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only list paths matching this glob. Patterns without a `/` also
    /// match against the entry name alone.
    pub pattern: Option<String>,
    /// Render paths as absolute instead of relative to the root.
    pub absolute: bool,
    /// Re-walk the tree even if the cache is populated.
    pub force_refresh: bool,
    /// Sort descending.
    pub reverse: bool,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pattern(mut self, pattern: impl Into<String>) -> Self {
        self.pattern = Some(pattern.into());
        self
    }

    pub fn absolute(mut self, absolute: bool) -> Self {
        self.absolute = absolute;
        self
    }

    pub fn force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    pub fn reverse(mut self, reverse: bool) -> Self {
        self.reverse = reverse;
        self
    }
}

/// Compiled ad-hoc listing pattern.
#[derive(Debug, Clone)]
struct ListPattern {
    matcher: GlobMatcher,
    basename: bool,
}

impl ListPattern {
    fn compile(pattern: &str) -> Result<Self, ScanError> {
        let glob = GlobBuilder::new(pattern)
            .literal_separator(false)
            .build()
            .map_err(|e| ScanError::invalid_pattern(pattern, e))?;
        Ok(Self {
            matcher: glob.compile_matcher(),
            basename: !pattern.contains('/'),
        })
    }

    fn matches(&self, relative: &Path) -> bool {
        self.matcher.is_match(relative)
            || (self.basename
                && relative
                    .file_name()
                    .is_some_and(|name| self.matcher.is_match(name)))
    }
}

/// A directory being snapshotted.
///
/// Holds the exclusion rules for the root and a cache of the last walk.
/// Listing methods populate the cache on first use and read from it after
/// that; pass `force_refresh` to re-walk.
#[derive(Debug)]
pub struct DirectoryHandle {
    name: String,
    path: PathBuf,
    parent: PathBuf,
    filter: Arc<PathFilter>,
    threads: usize,
    cache: TraversalCache,
    warnings: Vec<ScanWarning>,
}

impl DirectoryHandle {
    /// Open `path` with the default VCS exclusions only.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, ScanError> {
        Self::with_excludes(path, Vec::<String>::new(), None)
    }

    /// Open `path` with the default exclusions, `extra` patterns and,
    /// optionally, patterns read from `exclude_file` (relative to `path`).
    pub fn with_excludes<I, S>(
        path: impl AsRef<Path>,
        extra: I,
        exclude_file: Option<&Path>,
    ) -> Result<Self, ScanError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = path.as_ref();
        if !path.is_dir() {
            return Err(ScanError::NotADirectory {
                path: path.to_path_buf(),
            });
        }
        let path = path.canonicalize().map_err(|e| ScanError::io(path, e))?;

        let mut patterns: Vec<String> = extra.into_iter().map(Into::into).collect();
        if let Some(file) = exclude_file {
            patterns.extend(PathFilter::read_pattern_file(&path, file)?);
        }
        let filter = PathFilter::with_defaults(&path, patterns)?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| path.to_string_lossy().to_string());
        let parent = path.parent().map(Path::to_path_buf).unwrap_or_default();

        Ok(Self {
            name,
            path,
            parent,
            filter: Arc::new(filter),
            threads: 0,
            cache: TraversalCache::default(),
            warnings: Vec::new(),
        })
    }

    /// Open the root described by `config`.
    pub fn from_config(config: &SnapshotConfig) -> Result<Self, ScanError> {
        let handle = Self::with_excludes(
            &config.root,
            config.exclude_patterns.iter().cloned(),
            config.exclude_file.as_deref(),
        )?;
        Ok(handle.with_threads(config.threads))
    }

    /// Number of threads used to read directories (0 = rayon default pool).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    /// Base name of the root.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Absolute path of the root.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Parent of the root.
    pub fn parent(&self) -> &Path {
        &self.parent
    }

    pub fn filter(&self) -> &PathFilter {
        &self.filter
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Whether `path` (absolute, or relative to the root) is excluded.
    pub fn is_excluded(&self, path: &Path) -> bool {
        self.filter.is_excluded(path)
    }

    /// Walk the tree without touching the cache.
    pub fn walk(&self) -> Result<Walk, ScanError> {
        Traverser::new(Arc::clone(&self.filter))
            .with_threads(self.threads)
            .walk()
    }

    /// Walk the tree and cache every retained file and subdirectory.
    ///
    /// Does nothing if the cache is already populated and `force_refresh`
    /// is false. If the walk fails the cache is left empty and unpopulated.
    pub fn populate(&mut self, force_refresh: bool) -> Result<(), ScanError> {
        if self.cache.populated && !force_refresh {
            return Ok(());
        }

        self.cache.clear();
        self.warnings.clear();

        let mut walk = self.walk()?;
        let mut files = Vec::new();
        let mut subdirs = Vec::new();

        for level in walk.by_ref() {
            let relative_dir = level
                .dir
                .strip_prefix(&self.path)
                .map(Path::to_path_buf)
                .unwrap_or_default();
            files.extend(level.files.iter().map(|f| relative_dir.join(f)));
            subdirs.extend(level.subdirs.iter().map(|d| relative_dir.join(d)));
        }

        self.warnings = walk.take_warnings();
        self.cache.files = files;
        self.cache.subdirs = subdirs;
        self.cache.populated = true;
        Ok(())
    }

    /// Clear the cache.
    pub fn depopulate(&mut self) {
        self.cache.clear();
    }

    pub fn is_populated(&self) -> bool {
        self.cache.populated
    }

    /// Read-only view of the cache.
    pub fn cache(&self) -> &TraversalCache {
        &self.cache
    }

    /// Warnings from the last populate.
    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    /// Cached files matching `pattern`, in walk order.
    pub fn iter_files(
        &mut self,
        pattern: Option<&str>,
        absolute: bool,
        force_refresh: bool,
    ) -> Result<impl Iterator<Item = PathBuf> + '_, ScanError> {
        let pattern = pattern.map(ListPattern::compile).transpose()?;
        self.populate(force_refresh)?;
        Ok(self.list_cached(&self.cache.files, pattern, absolute))
    }

    /// Cached subdirectories matching `pattern`, in walk order.
    pub fn iter_subdirs(
        &mut self,
        pattern: Option<&str>,
        absolute: bool,
        force_refresh: bool,
    ) -> Result<impl Iterator<Item = PathBuf> + '_, ScanError> {
        let pattern = pattern.map(ListPattern::compile).transpose()?;
        self.populate(force_refresh)?;
        Ok(self.list_cached(&self.cache.subdirs, pattern, absolute))
    }

    /// Sorted list of files, in the same order as snapshot keys.
    pub fn files(&mut self, options: &ListOptions) -> Result<Vec<PathBuf>, ScanError> {
        self.files_by_key(options, |p| path_key(p))
    }

    /// Files sorted by a caller supplied key.
    pub fn files_by_key<K, F>(&mut self, options: &ListOptions, key: F) -> Result<Vec<PathBuf>, ScanError>
    where
        K: Ord,
        F: FnMut(&PathBuf) -> K,
    {
        let paths: Vec<PathBuf> = self
            .iter_files(options.pattern.as_deref(), options.absolute, options.force_refresh)?
            .collect();
        Ok(sorted(paths, key, options.reverse))
    }

    /// Sorted list of subdirectories, in the same order as snapshot keys.
    pub fn subdirs(&mut self, options: &ListOptions) -> Result<Vec<PathBuf>, ScanError> {
        self.subdirs_by_key(options, |p| path_key(p))
    }

    /// Subdirectories sorted by a caller supplied key.
    pub fn subdirs_by_key<K, F>(&mut self, options: &ListOptions, key: F) -> Result<Vec<PathBuf>, ScanError>
    where
        K: Ord,
        F: FnMut(&PathBuf) -> K,
    {
        let paths: Vec<PathBuf> = self
            .iter_subdirs(options.pattern.as_deref(), options.absolute, options.force_refresh)?
            .collect();
        Ok(sorted(paths, key, options.reverse))
    }

    /// Path of `path` relative to the root.
    pub fn relpath(&self, path: &Path) -> PathBuf {
        path.strip_prefix(&self.path)
            .map(Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }

    /// Absolute path of `relative` under the root.
    pub fn abspath(&self, relative: &Path) -> PathBuf {
        self.path.join(relative)
    }

    /// Total size in bytes of the cached files, populating first if needed.
    ///
    /// Reflects the cached listing; sizes are read from disk on every call.
    pub fn size(&mut self) -> Result<u64, ScanError> {
        let mut total = 0;
        for path in self.iter_files(None, true, false)? {
            let metadata = std::fs::metadata(&path).map_err(|e| ScanError::io(&path, e))?;
            total += metadata.len();
        }
        Ok(total)
    }

    fn list_cached<'a>(
        &'a self,
        entries: &'a [PathBuf],
        pattern: Option<ListPattern>,
        absolute: bool,
    ) -> impl Iterator<Item = PathBuf> + 'a {
        entries
            .iter()
            .filter(move |p| pattern.as_ref().is_none_or(|m| m.matches(p)))
            .map(move |p| if absolute { self.path.join(p) } else { p.clone() })
    }
}

fn sorted<K, F>(mut paths: Vec<PathBuf>, key: F, reverse: bool) -> Vec<PathBuf>
where
    K: Ord,
    F: FnMut(&PathBuf) -> K,
{
    paths.sort_by_key(key);
    if reverse {
        paths.reverse();
    }
    paths
}

//! Top-down directory walk with exclusion pruning.

use std::collections::HashMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use jwalk::{Parallelism, WalkDir};
use tracing::warn;

use dirsnap_core::{ScanError, ScanWarning};

use crate::filter::PathFilter;

/// One visited directory and what was retained directly inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkLevel {
    /// Absolute path of the visited directory.
    pub dir: PathBuf,
    /// Names of retained subdirectories.
    pub subdirs: Vec<OsString>,
    /// Retained files, relative to `dir`.
    pub files: Vec<PathBuf>,
}

/// Walks a directory tree, pruning excluded subtrees and dropping symlinks.
///
/// Excluded directories are removed while their parent is read, so nothing
/// beneath them is ever visited. Symbolic links are dropped whether or not a
/// pattern matches them and are never followed.
#[derive(Debug, Clone)]
pub struct Traverser {
    filter: Arc<PathFilter>,
    threads: usize,
}

impl Traverser {
    /// Create a traverser rooted at the filter's root.
    pub fn new(filter: Arc<PathFilter>) -> Self {
        Self { filter, threads: 0 }
    }

    /// Number of threads used to read directories (0 = rayon default pool).
    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads;
        self
    }

    pub fn root(&self) -> &Path {
        self.filter.root()
    }

    /// Walk the tree.
    ///
    /// Directory reads happen up front; the returned [`Walk`] then yields
    /// one [`WalkLevel`] per visited directory, parents before children,
    /// in a stable (name sorted) order. Unreadable directories below the
    /// root are reported as warnings; an unreadable root is an error.
    pub fn walk(&self) -> Result<Walk, ScanError> {
        let root = self.filter.root().to_path_buf();
        let metadata = std::fs::metadata(&root).map_err(|e| ScanError::io(&root, e))?;
        if !metadata.is_dir() {
            return Err(ScanError::NotADirectory { path: root });
        }
        std::fs::read_dir(&root).map_err(|e| ScanError::io(&root, e))?;

        let parallelism = match self.threads {
            0 => Parallelism::RayonDefaultPool {
                busy_timeout: Duration::from_millis(100),
            },
            n => Parallelism::RayonNewPool(n),
        };

        let filter = Arc::clone(&self.filter);
        let walker = WalkDir::new(&root)
            .parallelism(parallelism)
            .skip_hidden(false)
            .follow_links(false)
            .sort(true)
            .min_depth(0)
            .process_read_dir(move |_depth, _dir, _state, children| {
                children.retain(|child| match child {
                    Ok(entry) => {
                        let file_type = entry.file_type();
                        !file_type.is_symlink()
                            && !filter.is_excluded_as(&entry.path(), file_type.is_dir())
                    }
                    // Keep errors so they surface as warnings.
                    Err(_) => true,
                });
            });

        let mut order: Vec<PathBuf> = Vec::new();
        let mut levels: HashMap<PathBuf, WalkLevel> = HashMap::new();
        let mut warnings = Vec::new();

        for entry_result in walker {
            let entry = match entry_result {
                Ok(e) => e,
                Err(err) => {
                    let path = err.path().map(Path::to_path_buf).unwrap_or_default();
                    warn!(path = %path.display(), error = %err, "failed to read entry");
                    let kind = err.io_error().map(std::io::Error::kind);
                    warnings.push(ScanWarning::walk_error(path, kind, &err));
                    continue;
                }
            };

            let path = entry.path();
            let is_dir = entry.file_type().is_dir();

            if entry.depth() == 0 {
                order.push(path.clone());
                levels.insert(path.clone(), WalkLevel::empty(path));
                continue;
            }

            let name = entry.file_name().to_os_string();
            if let Some(level) = levels.get_mut(entry.parent_path.as_ref()) {
                if is_dir {
                    level.subdirs.push(name);
                } else {
                    level.files.push(PathBuf::from(name));
                }
            }

            if is_dir {
                order.push(path.clone());
                levels.insert(path.clone(), WalkLevel::empty(path));
            }
        }

        Ok(Walk {
            order: order.into_iter(),
            levels,
            warnings,
        })
    }
}

impl WalkLevel {
    fn empty(dir: PathBuf) -> Self {
        Self {
            dir,
            subdirs: Vec::new(),
            files: Vec::new(),
        }
    }
}

/// Iterator over the levels of one completed walk.
#[derive(Debug)]
pub struct Walk {
    order: std::vec::IntoIter<PathBuf>,
    levels: HashMap<PathBuf, WalkLevel>,
    warnings: Vec<ScanWarning>,
}

impl Walk {
    /// Warnings collected while reading the tree.
    pub fn warnings(&self) -> &[ScanWarning] {
        &self.warnings
    }

    /// Take the collected warnings, leaving none behind.
    pub fn take_warnings(&mut self) -> Vec<ScanWarning> {
        std::mem::take(&mut self.warnings)
    }
}

impl Iterator for Walk {
    type Item = WalkLevel;

    fn next(&mut self) -> Option<Self::Item> {
        let dir = self.order.next()?;
        self.levels.remove(&dir)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.order.size_hint()
    }
}

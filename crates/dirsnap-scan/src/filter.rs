//! Gitignore-style exclusion rules.

use std::path::{Path, PathBuf};

use ignore::Match;
use ignore::gitignore::{Gitignore, GitignoreBuilder};
use tracing::debug;

use dirsnap_core::{DEFAULT_EXCLUDES, ScanError};

/// Decides whether a path under a scan root is excluded.
///
/// Patterns use gitignore syntax and precedence: later patterns override
/// earlier ones and `!pattern` re-includes. Paths are matched relative to the
/// root, so `build/` only matches directories named `build` and `/build`
/// only the one directly under the root.
#[derive(Debug, Clone)]
pub struct PathFilter {
    root: PathBuf,
    patterns: Vec<String>,
    matcher: Gitignore,
}

impl PathFilter {
    /// Build a filter from exactly the given patterns.
    pub fn new<I, S>(root: impl Into<PathBuf>, patterns: I) -> Result<Self, ScanError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let root = root.into();
        let patterns: Vec<String> = patterns.into_iter().map(Into::into).collect();

        let mut builder = GitignoreBuilder::new(&root);
        for pattern in &patterns {
            builder
                .add_line(None, pattern)
                .map_err(|e| ScanError::invalid_pattern(pattern.as_str(), e))?;
        }
        let matcher = builder
            .build()
            .map_err(|e| ScanError::invalid_pattern(patterns.join(", "), e))?;

        Ok(Self {
            root,
            patterns,
            matcher,
        })
    }

    /// Build a filter from the default VCS exclusions followed by `extra`.
    pub fn with_defaults<I, S>(root: impl Into<PathBuf>, extra: I) -> Result<Self, ScanError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let patterns = DEFAULT_EXCLUDES
            .iter()
            .map(|p| p.to_string())
            .chain(extra.into_iter().map(Into::into));
        Self::new(root, patterns)
    }

    /// Read extra patterns from `file`, resolved against `root`.
    ///
    /// A missing file yields no patterns. Blank lines are dropped.
    pub fn read_pattern_file(root: &Path, file: &Path) -> Result<Vec<String>, ScanError> {
        let path = root.join(file);
        if !path.is_file() {
            debug!(path = %path.display(), "exclude file not found, ignoring");
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&path).map_err(|e| ScanError::io(&path, e))?;
        Ok(contents
            .lines()
            .map(|line| line.trim_end_matches('\r'))
            .filter(|line| !line.trim().is_empty())
            .map(str::to_string)
            .collect())
    }

    /// Root the patterns are anchored to.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Patterns in the order they were added.
    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether `path` is excluded. The path may be absolute (under the root)
    /// or relative to the root; its type is read from the filesystem without
    /// following symlinks.
    pub fn is_excluded(&self, path: &Path) -> bool {
        let absolute = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        };
        let is_dir = std::fs::symlink_metadata(&absolute)
            .map(|m| m.is_dir())
            .unwrap_or(false);
        self.is_excluded_as(path, is_dir)
    }

    /// Whether `path` is excluded, given whether it is a directory.
    pub fn is_excluded_as(&self, path: &Path, is_dir: bool) -> bool {
        let relative = path.strip_prefix(&self.root).unwrap_or(path);
        if relative.as_os_str().is_empty() || relative == Path::new(".") {
            return false;
        }

        match self.matcher.matched(relative, is_dir) {
            Match::Ignore(glob) => {
                debug!(
                    path = %path.display(),
                    pattern = glob.original(),
                    "matched for exclusion"
                );
                true
            }
            Match::Whitelist(_) | Match::None => false,
        }
    }
}

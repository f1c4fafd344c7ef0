//! 7-Zip command line wrapper.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use thiserror::Error;
use tracing::debug;

/// Executable names tried by [`SevenZip::locate`], in order.
const CANDIDATES: [&str; 3] = ["7z", "7za", "7zz"];

/// Errors from invoking the archive tool.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// No 7-Zip executable on `PATH`.
    #[error("7-Zip executable not found (tried {tried})")]
    NotFound { tried: String },

    /// The process could not be started.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The tool exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: PathBuf,
        status: String,
        stderr: String,
    },
}

/// Handle on a 7-Zip executable.
///
/// The executable path is part of the value; nothing is stored globally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SevenZip {
    executable: PathBuf,
}

impl SevenZip {
    /// Use the executable at `executable`.
    pub fn new(executable: impl Into<PathBuf>) -> Self {
        Self {
            executable: executable.into(),
        }
    }

    /// Find a 7-Zip executable on `PATH`.
    pub fn locate() -> Result<Self, ArchiveError> {
        CANDIDATES
            .iter()
            .find_map(|name| which::which(name).ok())
            .map(Self::new)
            .ok_or_else(|| ArchiveError::NotFound {
                tried: CANDIDATES.join(", "),
            })
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    /// Add the contents of `dir` to `archive` (`7z a`).
    pub fn create_archive(&self, archive: &Path, dir: &Path) -> Result<(), ArchiveError> {
        self.run(self.create_command(archive, dir)).map(drop)
    }

    /// Extract `archive` with full paths into `output_dir` (`7z x`).
    pub fn extract_archive(&self, archive: &Path, output_dir: &Path) -> Result<(), ArchiveError> {
        self.run(self.extract_command(archive, output_dir)).map(drop)
    }

    /// Listing of `archive` as printed by `7z l`, one line per element.
    pub fn list_contents(&self, archive: &Path, recurse: bool) -> Result<Vec<String>, ArchiveError> {
        let output = self.run(self.list_command(archive, recurse))?;
        Ok(stdout_lines(&output))
    }

    /// Checksum report for `file` from `7z h`, e.g. with `method` `CRC32`.
    pub fn calculate_hash(&self, file: &Path, method: &str) -> Result<Vec<String>, ArchiveError> {
        let output = self.run(self.hash_command(file, method))?;
        Ok(stdout_lines(&output))
    }

    pub fn create_command(&self, archive: &Path, dir: &Path) -> Command {
        self.command(["a".into(), archive.into(), dir.into()])
    }

    pub fn extract_command(&self, archive: &Path, output_dir: &Path) -> Command {
        let mut out = OsString::from("-o");
        out.push(output_dir);
        self.command(["x".into(), archive.into(), out])
    }

    pub fn list_command(&self, archive: &Path, recurse: bool) -> Command {
        let mut cmd = self.command(["l".into(), archive.into()]);
        if recurse {
            cmd.arg("-r");
        }
        cmd
    }

    pub fn hash_command(&self, file: &Path, method: &str) -> Command {
        self.command(["h".into(), format!("-scrc{method}").into(), file.into()])
    }

    fn command<const N: usize>(&self, args: [OsString; N]) -> Command {
        let mut cmd = Command::new(&self.executable);
        cmd.args(args);
        cmd
    }

    fn run(&self, mut cmd: Command) -> Result<Output, ArchiveError> {
        debug!(command = ?cmd, "running archive tool");
        let output = cmd.output().map_err(|source| ArchiveError::Spawn {
            program: self.executable.clone(),
            source,
        })?;
        if !output.status.success() {
            return Err(ArchiveError::Failed {
                program: self.executable.clone(),
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(output)
    }
}

fn stdout_lines(output: &Output) -> Vec<String> {
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

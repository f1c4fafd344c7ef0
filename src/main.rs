//! dirsnap - content-addressed directory snapshots.
//!
//! Usage:
//!   dirsnap snapshot [PATH]            Snapshot a directory to JSON
//!   dirsnap diff NEW OLD               Compare two stored snapshots
//!   dirsnap status [PATH] --against F  Compare a directory with a stored snapshot
//!   dirsnap update SNAPSHOT [PATH]     Add indexer values to a stored snapshot
//!   dirsnap ls [PATH]                  List files or subdirectories
//!   dirsnap size [PATH]                Total size of the retained files
//!   dirsnap archive ...                7-Zip archive operations

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::thread;

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{Context, Result, eyre};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

use dirsnap_analyze::{SnapshotDiff, SnapshotDiffer};
use dirsnap_core::{Snapshot, SnapshotConfig};
use dirsnap_ops::SevenZip;
use dirsnap_scan::{
    BuiltinIndexer, DEFAULT_CHUNK_SIZE, DirectoryHandle, IndexPhase, IndexerSet, ListOptions, ScanWarning,
    SnapshotBuilder, SnapshotOutcome, compute_record, update_file_index, update_subdir_index,
};

#[derive(Parser)]
#[command(
    name = "dirsnap",
    version,
    about = "Content-addressed directory snapshots and snapshot diffs"
)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

/// Options controlling which entries a walk retains.
#[derive(Args, Clone, Default)]
struct WalkArgs {
    /// Extra exclusion pattern (gitignore syntax), may be repeated
    #[arg(short = 'x', long = "exclude")]
    exclude: Vec<String>,

    /// File of exclusion patterns, relative to the root
    #[arg(long)]
    exclude_file: Option<PathBuf>,

    /// Worker threads (0 = one per core)
    #[arg(short = 'j', long, default_value = "0")]
    threads: usize,
}

#[derive(Subcommand)]
enum Command {
    /// Snapshot a directory
    Snapshot {
        /// Directory to snapshot
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Output file (defaults to stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Indexer applied to files, may be repeated (default: xxhash)
        #[arg(short = 'f', long = "file-indexer")]
        file_indexers: Vec<String>,

        /// Indexer applied to the root and subdirectories, may be repeated
        #[arg(short = 'd', long = "dir-indexer")]
        dir_indexers: Vec<String>,

        /// Read block size for hashing indexers
        #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
        chunk_size: usize,

        /// Report indexing progress on stderr
        #[arg(long)]
        progress: bool,

        #[command(flatten)]
        walk: WalkArgs,
    },

    /// Compare two stored snapshots
    Diff {
        /// Newer snapshot file
        new: PathBuf,

        /// Older snapshot file
        old: PathBuf,

        /// Compare on this indexer only
        #[arg(short, long)]
        key: Option<String>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,
    },

    /// Snapshot a directory and compare it with a stored snapshot
    Status {
        /// Directory to check
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Stored snapshot to compare against
        #[arg(short, long)]
        against: PathBuf,

        /// Compare on this indexer only
        #[arg(short, long)]
        key: Option<String>,

        /// Output format
        #[arg(long, default_value = "text")]
        format: OutputFormat,

        #[command(flatten)]
        walk: WalkArgs,
    },

    /// Merge values from more indexers into a stored snapshot
    Update {
        /// Snapshot file to update
        snapshot: PathBuf,

        /// Directory the snapshot was taken of (defaults to its recorded root)
        path: Option<PathBuf>,

        /// Indexer applied to files, may be repeated
        #[arg(short = 'f', long = "file-indexer")]
        file_indexers: Vec<String>,

        /// Indexer applied to the root and subdirectories, may be repeated
        #[arg(short = 'd', long = "dir-indexer")]
        dir_indexers: Vec<String>,

        /// Write the result here instead of overwriting the input
        #[arg(short, long)]
        output: Option<PathBuf>,

        #[command(flatten)]
        walk: WalkArgs,
    },

    /// List retained files or subdirectories
    Ls {
        /// Directory to list
        #[arg(default_value = ".")]
        path: PathBuf,

        /// List subdirectories instead of files
        #[arg(long)]
        dirs: bool,

        /// Only entries whose path or name matches this glob
        #[arg(short, long)]
        pattern: Option<String>,

        /// Print absolute paths
        #[arg(short, long)]
        absolute: bool,

        /// Reverse the sort order
        #[arg(short, long)]
        reverse: bool,

        #[command(flatten)]
        walk: WalkArgs,
    },

    /// Total size of the retained files
    Size {
        /// Directory to measure
        #[arg(default_value = ".")]
        path: PathBuf,

        /// Print the size in bytes
        #[arg(short, long)]
        bytes: bool,

        #[command(flatten)]
        walk: WalkArgs,
    },

    /// 7-Zip archive operations
    Archive {
        /// 7-Zip executable (defaults to 7z, 7za or 7zz on PATH)
        #[arg(long, global = true)]
        seven_zip: Option<PathBuf>,

        #[command(subcommand)]
        command: ArchiveCommand,
    },
}

#[derive(Subcommand)]
enum ArchiveCommand {
    /// Add a directory to an archive
    Create { archive: PathBuf, dir: PathBuf },

    /// Extract an archive with full paths
    Extract {
        archive: PathBuf,

        /// Destination directory
        #[arg(default_value = ".")]
        output: PathBuf,
    },

    /// List archive contents
    List {
        archive: PathBuf,

        /// Recurse into subdirectories
        #[arg(short, long)]
        recurse: bool,
    },

    /// Print checksums of a file
    Hash {
        file: PathBuf,

        /// Checksum method (CRC32, CRC64, SHA1, SHA256, ...)
        #[arg(short, long, default_value = "CRC32")]
        method: String,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum, Default)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Command::Snapshot {
            path,
            output,
            file_indexers,
            dir_indexers,
            chunk_size,
            progress,
            walk,
        } => {
            let mut builder = SnapshotConfig::builder();
            builder
                .root(path)
                .exclude_patterns(walk.exclude)
                .exclude_file(walk.exclude_file)
                .dir_indexers(dir_indexers)
                .threads(walk.threads)
                .chunk_size(chunk_size);
            if !file_indexers.is_empty() {
                builder.file_indexers(file_indexers);
            }
            let config = builder.build().context("Invalid snapshot options")?;
            run_snapshot(&config, output.as_deref(), progress)?;
        }
        Command::Diff {
            new,
            old,
            key,
            format,
        } => {
            let new = load_snapshot(&new)?;
            let old = load_snapshot(&old)?;
            let diff = differ(key).diff(&new, &old);
            print_diff(&diff, format)?;
        }
        Command::Status {
            path,
            against,
            key,
            format,
            walk,
        } => {
            run_status(&path, &against, key, format, &walk)?;
        }
        Command::Update {
            snapshot,
            path,
            file_indexers,
            dir_indexers,
            output,
            walk,
        } => {
            let output = output.unwrap_or_else(|| snapshot.clone());
            run_update(&snapshot, path, &file_indexers, &dir_indexers, &output, &walk)?;
        }
        Command::Ls {
            path,
            dirs,
            pattern,
            absolute,
            reverse,
            walk,
        } => {
            let mut handle = open_handle(&path, &walk)?;
            let mut options = ListOptions::new().absolute(absolute).reverse(reverse);
            if let Some(pattern) = pattern {
                options = options.pattern(pattern);
            }
            let entries = if dirs {
                handle.subdirs(&options)?
            } else {
                handle.files(&options)?
            };
            for entry in entries {
                println!("{}", entry.display());
            }
            report_warnings(handle.warnings());
        }
        Command::Size { path, bytes, walk } => {
            let mut handle = open_handle(&path, &walk)?;
            let size = handle.size().context("Failed to measure directory")?;
            if bytes {
                println!("{size}");
            } else {
                println!("{}\t{}", format_size(size), handle.path().display());
            }
            report_warnings(handle.warnings());
        }
        Command::Archive { seven_zip, command } => {
            let tool = match seven_zip {
                Some(exe) => SevenZip::new(exe),
                None => SevenZip::locate()?,
            };
            run_archive(&tool, command)?;
        }
    }

    Ok(())
}

/// Install the stderr log subscriber. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn open_handle(path: &Path, walk: &WalkArgs) -> Result<DirectoryHandle> {
    let handle = DirectoryHandle::with_excludes(
        path,
        walk.exclude.iter().cloned(),
        walk.exclude_file.as_deref(),
    )
    .with_context(|| format!("Cannot open {}", path.display()))?;
    Ok(handle.with_threads(walk.threads))
}

fn load_snapshot(path: &Path) -> Result<Snapshot> {
    Snapshot::load(path).with_context(|| format!("Cannot read snapshot {}", path.display()))
}

fn differ(key: Option<String>) -> SnapshotDiffer {
    match key {
        Some(key) => SnapshotDiffer::new().with_compare_key(key),
        None => SnapshotDiffer::new(),
    }
}

/// Take a snapshot and write it out.
fn run_snapshot(config: &SnapshotConfig, output: Option<&Path>, progress: bool) -> Result<()> {
    let outcome = take_snapshot(config, progress)?;
    report_warnings(&outcome.warnings);

    match output {
        Some(path) => {
            outcome.snapshot.save(path)?;
            eprintln!(
                "Wrote {} files, {} directories to {}",
                outcome.snapshot.file_count(),
                outcome.snapshot.dir_count(),
                path.display()
            );
        }
        None => println!("{}", outcome.snapshot.to_json_pretty()?),
    }

    Ok(())
}

fn take_snapshot(config: &SnapshotConfig, progress: bool) -> Result<SnapshotOutcome> {
    debug!(?config, "taking snapshot");
    let mut handle = DirectoryHandle::from_config(config)
        .with_context(|| format!("Cannot open {}", config.root.display()))?;
    let builder = SnapshotBuilder::from_config(config)?;

    eprintln!("Indexing {}...", handle.path().display());

    let reporter = progress.then(|| {
        let mut rx = builder.subscribe();
        thread::spawn(move || {
            loop {
                match rx.blocking_recv() {
                    Ok(update) => {
                        eprint!(
                            "\r{:?}: {}/{} entries, {} failures",
                            update.phase,
                            update.entries_indexed,
                            update.total_entries,
                            update.failures
                        );
                        if update.phase == IndexPhase::Done {
                            eprintln!();
                            break;
                        }
                    }
                    Err(RecvError::Lagged(_)) => continue,
                    Err(RecvError::Closed) => break,
                }
            }
        })
    });

    let outcome = builder.build(&mut handle).context("Snapshot failed");
    drop(builder);
    if let Some(reporter) = reporter {
        let _ = reporter.join();
    }
    outcome
}

fn run_status(
    path: &Path,
    against: &Path,
    key: Option<String>,
    format: OutputFormat,
    walk: &WalkArgs,
) -> Result<()> {
    let old = load_snapshot(against)?;

    // Index with whatever the stored snapshot used so records are comparable.
    let file_keys = builtin_keys(
        old.files
            .values()
            .flat_map(|record| record.keys().map(str::to_string))
            .collect::<BTreeSet<_>>(),
    );
    let dir_keys = builtin_keys(
        old.root_record()
            .map(|record| record.keys().map(str::to_string).collect())
            .unwrap_or_default(),
    );

    let mut builder = SnapshotConfig::builder();
    builder
        .root(path)
        .exclude_patterns(walk.exclude.clone())
        .exclude_file(walk.exclude_file.clone())
        .dir_indexers(dir_keys)
        .threads(walk.threads);
    if !file_keys.is_empty() {
        builder.file_indexers(file_keys);
    }
    let config = builder.build().context("Invalid snapshot options")?;

    let outcome = take_snapshot(&config, false)?;
    report_warnings(&outcome.warnings);

    let diff = differ(key).diff(&outcome.snapshot, &old);
    print_diff(&diff, format)
}

/// Keep the keys a fresh snapshot can recompute; custom indexer keys stored
/// by library callers are skipped.
fn builtin_keys(keys: BTreeSet<String>) -> Vec<String> {
    let (builtin, custom): (Vec<String>, Vec<String>) = keys
        .into_iter()
        .partition(|key| key.parse::<BuiltinIndexer>().is_ok());
    if !custom.is_empty() {
        warn!(keys = ?custom, "skipping indexer keys that are not built in");
        eprintln!("Skipping non-builtin indexer keys: {}", custom.join(", "));
    }
    builtin
}

fn run_update(
    snapshot_path: &Path,
    root: Option<PathBuf>,
    file_keys: &[String],
    dir_keys: &[String],
    output: &Path,
    walk: &WalkArgs,
) -> Result<()> {
    if file_keys.is_empty() && dir_keys.is_empty() {
        return Err(eyre!("Nothing to update: pass --file-indexer or --dir-indexer"));
    }

    let mut snapshot = load_snapshot(snapshot_path)?;
    let root = match root {
        Some(root) => root,
        None => snapshot
            .root_path()
            .map(PathBuf::from)
            .ok_or_else(|| eyre!("Snapshot has no root entry"))?,
    };

    let mut handle = open_handle(&root, walk)?;
    let file_indexers = IndexerSet::from_keys(file_keys, DEFAULT_CHUNK_SIZE)?;
    let dir_indexers = IndexerSet::from_keys(dir_keys, DEFAULT_CHUNK_SIZE)?;

    let mut warnings = Vec::new();
    if !file_indexers.is_empty() {
        warnings.extend(update_file_index(
            &mut handle,
            &mut snapshot.files,
            &file_indexers,
            None,
        )?);
    }
    if !dir_indexers.is_empty() {
        warnings.extend(update_subdir_index(
            &mut handle,
            &mut snapshot.subdirs,
            &dir_indexers,
            None,
        )?);
        let (fresh, root_warnings) = compute_record(handle.path(), Path::new("."), &dir_indexers);
        if let Some(record) = snapshot.root.values_mut().next() {
            record.merge(fresh);
        }
        warnings.extend(root_warnings);
    }
    report_warnings(&warnings);

    snapshot.save(output)?;
    eprintln!("Updated {}", output.display());
    Ok(())
}

fn run_archive(tool: &SevenZip, command: ArchiveCommand) -> Result<()> {
    match command {
        ArchiveCommand::Create { archive, dir } => {
            tool.create_archive(&archive, &dir)?;
            eprintln!("Created {}", archive.display());
        }
        ArchiveCommand::Extract { archive, output } => {
            tool.extract_archive(&archive, &output)?;
            eprintln!("Extracted {} to {}", archive.display(), output.display());
        }
        ArchiveCommand::List { archive, recurse } => {
            for line in tool.list_contents(&archive, recurse)? {
                println!("{line}");
            }
        }
        ArchiveCommand::Hash { file, method } => {
            for line in tool.calculate_hash(&file, &method)? {
                println!("{line}");
            }
        }
    }
    Ok(())
}

fn print_diff(diff: &SnapshotDiff, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Text => {
            if diff.is_empty() {
                println!("No changes.");
                return Ok(());
            }
            for path in &diff.created {
                println!("+ {path}");
            }
            for path in &diff.deleted {
                println!("- {path}");
            }
            for path in &diff.modified {
                println!("M {path}");
            }
            for path in &diff.modified_unknown {
                println!("? {path}");
            }
            for path in &diff.deleted_dirs {
                println!("- {path}/");
            }
            println!();
            println!(
                "{} created, {} deleted, {} modified, {} unknown, {} directories removed",
                diff.created.len(),
                diff.deleted.len(),
                diff.modified.len(),
                diff.modified_unknown.len(),
                diff.deleted_dirs.len()
            );
        }
        OutputFormat::Json => {
            println!("{}", diff.to_json_pretty()?);
        }
    }
    Ok(())
}

fn report_warnings(warnings: &[ScanWarning]) {
    if warnings.is_empty() {
        return;
    }
    eprintln!("{} warning(s):", warnings.len());
    for warning in warnings {
        eprintln!("  {}: {}", warning.path.display(), warning.message);
    }
}

/// Format size in human-readable form.
fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}

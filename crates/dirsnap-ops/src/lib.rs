//! External archive tool integration for dirsnap.
//!
//! Wraps the 7-Zip command line for creating, extracting and listing
//! archives and for computing checksums.

mod archive;

pub use archive::{ArchiveError, SevenZip};

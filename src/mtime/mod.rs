//! Modification time reconciliation
//!
//! Sphinx decides between a full and an incremental build by comparing
//! mtimes of sources and templates against the previous build. Files that
//! were freshly checked out or installed carry "now" as their mtime even
//! though their content is old; the submodules rewrite those mtimes:
//!
//! - [`git`]: tracked sources get the timestamp of their last commit
//! - [`theme`]: theme templates get a release timestamp or [`sentinel`]
//! - [`registry`]: optional package index lookup for release timestamps

pub mod git;
pub mod registry;
pub mod theme;

pub use git::{create_history_tool, resolve_root, GitHistoryRestorer, HistoryTool};
pub use registry::{PyPiRegistry, ReleaseRegistry};
pub use theme::{NormalizeReport, ThemeNormalizer};

use chrono::{DateTime, Utc};
use filetime::FileTime;
use std::io;
use std::path::Path;

/// 1900-01-01T00:00:00Z as a unix timestamp
pub const SENTINEL_UNIX_SECS: i64 = -2_208_988_800;

/// Distant-past mtime that is older than any build output
///
/// Filesystems with 32-bit timestamps store it clamped to 1901-12-13.
pub fn sentinel() -> FileTime {
    FileTime::from_unix_time(SENTINEL_UNIX_SECS, 0)
}

/// Convert a UTC timestamp to a file time
pub fn from_datetime(dt: DateTime<Utc>) -> FileTime {
    FileTime::from_unix_time(dt.timestamp(), dt.timestamp_subsec_nanos())
}

/// Render a file time for log output
pub fn display(ft: FileTime) -> String {
    DateTime::<Utc>::from_timestamp(ft.unix_seconds(), ft.nanoseconds())
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| ft.unix_seconds().to_string())
}

/// Current mtime of a file, following symlinks
pub fn mtime_of(path: &Path) -> io::Result<FileTime> {
    let meta = std::fs::metadata(path)?;
    Ok(FileTime::from_last_modification_time(&meta))
}

/// Set the mtime of a file, following symlinks; atime becomes now
pub fn set_mtime(path: &Path, mtime: FileTime) -> io::Result<()> {
    filetime::set_file_times(path, FileTime::now(), mtime)
}

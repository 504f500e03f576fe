//! Tree-level filesystem operations used by the cache lifecycle
//!
//! `copy_tree` and `move_tree` report a missing source as `Ok(false)` so
//! callers can log and skip it; every other failure is an `io::Error`.

use filetime::FileTime;
use std::fs;
use std::io;
use std::path::Path;
use tracing::{debug, info};
use walkdir::WalkDir;

/// Remove a directory tree; a missing directory is not an error
pub fn clear_dir(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Recursively copy `src` to `dst`, preserving file mtimes and symlinks
///
/// Returns `Ok(false)` if `src` does not exist.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<bool> {
    copy_tree_excluding(src, dst, None)
}

/// Like [`copy_tree`], skipping the subtree rooted at `excluded`
pub fn copy_tree_excluding(src: &Path, dst: &Path, excluded: Option<&Path>) -> io::Result<bool> {
    if !exists(src)? {
        return Ok(false);
    }
    info!("Copying {} -> {}", src.display(), dst.display());

    let walker = WalkDir::new(src)
        .follow_links(false)
        .into_iter()
        .filter_entry(|entry| excluded.map_or(true, |skip| entry.path() != skip));

    for entry in walker {
        let entry = entry.map_err(io::Error::from)?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(io::Error::other)?;
        let target = dst.join(relative);
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir_all(&target)?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)?;
        } else {
            fs::copy(entry.path(), &target)?;
            let meta = entry.metadata().map_err(io::Error::from)?;
            filetime::set_file_times(
                &target,
                FileTime::from_last_access_time(&meta),
                FileTime::from_last_modification_time(&meta),
            )?;
        }
    }

    Ok(true)
}

/// Move `src` to `dst`, replacing nothing: `dst` must not exist
///
/// Uses a rename where possible and falls back to copy-then-remove when the
/// rename crosses filesystems. Returns `Ok(false)` if `src` does not exist.
pub fn move_tree(src: &Path, dst: &Path) -> io::Result<bool> {
    if !exists(src)? {
        return Ok(false);
    }
    info!("Moving {} -> {}", src.display(), dst.display());

    if let Some(parent) = dst.parent() {
        fs::create_dir_all(parent)?;
    }

    match fs::rename(src, dst) {
        Ok(()) => Ok(true),
        Err(e) if is_cross_device(&e) => {
            debug!("Rename crosses filesystems, copying instead: {}", e);
            copy_tree(src, dst)?;
            clear_dir(src)?;
            Ok(true)
        }
        Err(e) => Err(e),
    }
}

fn exists(path: &Path) -> io::Result<bool> {
    match fs::symlink_metadata(path) {
        Ok(_) => Ok(true),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

#[cfg(unix)]
fn is_cross_device(err: &io::Error) -> bool {
    // EXDEV
    err.raw_os_error() == Some(18)
}

#[cfg(not(unix))]
fn is_cross_device(err: &io::Error) -> bool {
    // ERROR_NOT_SAME_DEVICE
    err.raw_os_error() == Some(17)
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    let target = fs::read_link(src)?;
    std::os::unix::fs::symlink(target, dst)
}

#[cfg(not(unix))]
fn copy_symlink(src: &Path, dst: &Path) -> io::Result<()> {
    if src.is_dir() {
        copy_tree(&fs::canonicalize(src)?, dst).map(|_| ())
    } else {
        fs::copy(src, dst).map(|_| ())
    }
}

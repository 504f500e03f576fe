//! Content digest of a directory tree
//!
//! Covers relative paths, file contents, symlink targets and file mtimes
//! (seconds). Directory mtimes are ignored since every move or copy touches
//! them.

use filetime::FileTime;
use sha2::{Digest, Sha256};
use std::fs;
use std::io;
use std::path::Path;
use walkdir::WalkDir;

/// SHA-256 digest of a tree, hex encoded; a missing tree digests as empty
pub fn tree_digest(root: &Path) -> io::Result<String> {
    let mut hasher = Sha256::new();

    if root.exists() {
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .min_depth(1);

        for entry in walker {
            let entry = entry.map_err(io::Error::from)?;
            let relative = entry.path().strip_prefix(root).map_err(io::Error::other)?;
            let file_type = entry.file_type();

            hasher.update(relative.to_string_lossy().as_bytes());
            hasher.update([0]);

            if file_type.is_dir() {
                hasher.update(b"d");
            } else if file_type.is_symlink() {
                hasher.update(b"l");
                hasher.update(fs::read_link(entry.path())?.to_string_lossy().as_bytes());
            } else {
                let meta = entry.metadata().map_err(io::Error::from)?;
                let mtime = FileTime::from_last_modification_time(&meta);
                hasher.update(b"f");
                hasher.update(mtime.unix_seconds().to_le_bytes());
                hasher.update(fs::read(entry.path())?);
            }
            hasher.update([0]);
        }
    }

    Ok(hex::encode(hasher.finalize()))
}

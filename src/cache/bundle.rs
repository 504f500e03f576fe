//! Cache bundle lifecycle
//!
//! A bundle is a directory holding the `output` and `intermediate` trees of
//! the last successful build. It is moved out at the start of a run and
//! rebuilt from scratch after a successful build.

use crate::cache::digest::tree_digest;
use crate::cache::fsops::{clear_dir, copy_tree, copy_tree_excluding, move_tree};
use crate::error::{IncrError, IncrResult};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Name of the rendered output subtree inside a bundle
pub const OUTPUT_DIR: &str = "output";

/// Name of the build engine's intermediate subtree inside a bundle
pub const INTERMEDIATE_DIR: &str = "intermediate";

/// State of a cache bundle on disk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BundleState {
    /// No bundle directory (first run)
    Absent,
    /// Bundle directory exists but one or both subtrees are missing
    Partial,
    /// Both subtrees present
    Complete,
}

impl fmt::Display for BundleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "absent"),
            Self::Partial => write!(f, "partial"),
            Self::Complete => write!(f, "complete"),
        }
    }
}

/// How cached trees are brought back into the build locations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RestoreMode {
    /// Move the trees out; the bundle is consumed until the next save
    #[default]
    Move,
    /// Copy the trees; the bundle survives a failed build unchanged
    Copy,
}

impl RestoreMode {
    fn transfer(self, src: &Path, dst: &Path) -> io::Result<bool> {
        match self {
            Self::Move => move_tree(src, dst),
            Self::Copy => copy_tree(src, dst),
        }
    }
}

/// A cache bundle rooted at a directory that CI persists between runs
#[derive(Debug, Clone)]
pub struct CacheBundle {
    root: PathBuf,
}

impl CacheBundle {
    /// Create a handle for the bundle at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Bundle root directory
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the cached output tree
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    /// Path of the cached intermediate tree
    pub fn intermediate_dir(&self) -> PathBuf {
        self.root.join(INTERMEDIATE_DIR)
    }

    /// Inspect the bundle on disk
    pub fn state(&self) -> BundleState {
        if !self.root.is_dir() {
            return BundleState::Absent;
        }
        if self.output_dir().is_dir() && self.intermediate_dir().is_dir() {
            BundleState::Complete
        } else {
            BundleState::Partial
        }
    }

    /// Move the cached trees into the build locations
    pub fn restore(&self, output_dir: &Path, intermediate_dir: &Path) -> IncrResult<BundleState> {
        self.restore_with(output_dir, intermediate_dir, RestoreMode::Move)
    }

    /// Bring the cached trees into the build locations
    ///
    /// An absent bundle is the expected first-run condition and leaves both
    /// locations untouched. Otherwise both locations are cleared first and
    /// each available subtree is transferred; a missing subtree is skipped.
    pub fn restore_with(
        &self,
        output_dir: &Path,
        intermediate_dir: &Path,
        mode: RestoreMode,
    ) -> IncrResult<BundleState> {
        info!("Restoring cache from {}...", self.root.display());

        let state = self.state();
        match state {
            BundleState::Absent => {
                info!("Cache directory {} doesn't exist", self.root.display());
                return Ok(state);
            }
            BundleState::Partial => warn!("Cache at {} is incomplete", self.root.display()),
            BundleState::Complete => debug!("Cache at {} is complete", self.root.display()),
        }

        let restore_err = |source: io::Error| IncrError::CacheRestore {
            path: self.root.clone(),
            source,
        };

        clear_dir(output_dir).map_err(restore_err)?;
        clear_dir(intermediate_dir).map_err(restore_err)?;

        if !mode.transfer(&self.output_dir(), output_dir).map_err(restore_err)? {
            warn!("Cached {} tree missing, skipping", OUTPUT_DIR);
        }

        // The intermediate dir may live inside the output dir
        clear_dir(intermediate_dir).map_err(restore_err)?;
        if !mode
            .transfer(&self.intermediate_dir(), intermediate_dir)
            .map_err(restore_err)?
        {
            warn!("Cached {} tree missing, skipping", INTERMEDIATE_DIR);
        }

        Ok(state)
    }

    /// Replace the bundle with the trees of a successful build
    ///
    /// The output tree is copied since it remains the user-facing artifact;
    /// the intermediate tree is moved.
    pub fn save(&self, output_dir: &Path, intermediate_dir: &Path) -> IncrResult<()> {
        info!("Saving cache to {}...", self.root.display());

        let save_err = |source: io::Error| IncrError::CacheSave {
            path: self.root.clone(),
            source,
        };

        clear_dir(&self.root).map_err(save_err)?;
        std::fs::create_dir_all(&self.root).map_err(save_err)?;

        let nested = intermediate_dir
            .starts_with(output_dir)
            .then_some(intermediate_dir);
        if !copy_tree_excluding(output_dir, &self.output_dir(), nested).map_err(save_err)? {
            warn!("Output directory {} missing, not cached", output_dir.display());
        }

        if !move_tree(intermediate_dir, &self.intermediate_dir()).map_err(save_err)? {
            warn!(
                "Intermediate directory {} missing, not cached",
                intermediate_dir.display()
            );
        }

        match tree_digest(&self.root) {
            Ok(digest) => debug!("Cache bundle digest: {}", digest),
            Err(e) => debug!("Could not digest cache bundle: {}", e),
        }

        Ok(())
    }
}

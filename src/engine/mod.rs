//! Build engine abstraction
//!
//! incrbuild never renders documents itself. It talks to Sphinx through two
//! narrow interfaces so the pipeline can be exercised without a Python
//! installation:
//! - [`BuildEngine`]: runs a build with a verbatim argument list
//! - [`ProjectProbe`]: answers questions about the project and installed
//!   packages (theme name, package files)

pub mod sphinx;

pub use sphinx::{PythonProbe, SphinxBuild};

use crate::error::IncrResult;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Runs the document build
#[async_trait]
pub trait BuildEngine: Send + Sync {
    /// Human-readable engine name for log output
    fn name(&self) -> &str;

    /// Run one build and return its exit code
    async fn run(&self, args: &[String]) -> IncrResult<i32>;
}

/// Queries the documentation project and its installed packages
#[async_trait]
pub trait ProjectProbe: Send + Sync {
    /// Value of `html_theme` in the project configuration found in
    /// `conf_dir`; `None` when the project does not set one
    async fn html_theme(&self, conf_dir: &Path) -> IncrResult<Option<String>>;

    /// Metadata of an installed distribution; `PackageNotFound` if absent
    async fn distribution(&self, name: &str) -> IncrResult<Distribution>;
}

/// Metadata of an installed Python distribution
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Distribution {
    /// Distribution name as recorded in its metadata
    pub name: String,
    /// Installed version
    pub version: String,
    /// Requirement strings (PEP 508)
    #[serde(default)]
    pub requires: Vec<String>,
    /// Absolute paths of the installed files
    #[serde(default)]
    pub files: Vec<PathBuf>,
}

impl Distribution {
    /// Names of requirements that always apply (no environment marker)
    pub fn mandatory_requirements(&self) -> Vec<&str> {
        self.requires
            .iter()
            .filter_map(|req| requirement_name(req))
            .collect()
    }

    /// Installed files with one of the given extensions
    pub fn files_with_extension<'a>(
        &'a self,
        extensions: &'a [String],
    ) -> impl Iterator<Item = &'a PathBuf> + 'a {
        self.files.iter().filter(move |file| {
            file.extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| extensions.iter().any(|want| want == ext))
        })
    }
}

/// Project name of a PEP 508 requirement, or `None` when the requirement
/// carries an environment marker (extras, platform or version conditions)
pub fn requirement_name(requirement: &str) -> Option<&str> {
    if requirement.contains(';') {
        return None;
    }
    let requirement = requirement.trim();
    let end = requirement
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
        .unwrap_or(requirement.len());
    let name = &requirement[..end];
    (!name.is_empty()).then_some(name)
}

/// Normalized project name (PEP 503) for deduplication
pub fn normalize_name(name: &str) -> String {
    let mut normalized = String::with_capacity(name.len());
    let mut last_sep = false;
    for c in name.chars() {
        if matches!(c, '-' | '_' | '.') {
            if !last_sep {
                normalized.push('-');
            }
            last_sep = true;
        } else {
            normalized.push(c.to_ascii_lowercase());
            last_sep = false;
        }
    }
    normalized
}

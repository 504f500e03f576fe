//! Program identity threaded through the components

use std::path::PathBuf;

/// Name and version of the running program
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppInfo {
    /// Program name, used as log prefix and for the default cache path
    pub name: String,
    /// Program version shown by `--version`
    pub version: String,
}

impl AppInfo {
    /// Identity of this build of incrbuild
    pub fn current() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }

    /// Create an identity with an explicit name and version
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
        }
    }

    /// Default cache root: a fixed directory named after the program
    pub fn default_cache_dir(&self) -> PathBuf {
        std::env::temp_dir().join(&self.name)
    }
}

impl Default for AppInfo {
    fn default() -> Self {
        Self::current()
    }
}

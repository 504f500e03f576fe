//! Configuration schema for incrbuild
//!
//! Configuration is stored at `~/.config/incrbuild/config.toml`, optionally
//! overridden by a project-local `.incrbuild.toml`.

use crate::cache::RestoreMode;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Build engine settings
    pub build: BuildConfig,

    /// Cache settings
    pub cache: CacheConfig,

    /// Source mtime restoration settings
    pub history: HistoryConfig,

    /// Theme mtime normalization settings
    pub theme: ThemeConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log filter directive when INCRBUILD_LOG is unset
    pub log_level: String,

    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "text".to_string(),
        }
    }
}

/// Build engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    /// sphinx-build executable
    pub sphinx_build: String,

    /// Python interpreter that has Sphinx and the theme installed
    pub python: String,

    /// Builders that get cache restore/save wrapping
    pub cached_builders: Vec<String>,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            sphinx_build: "sphinx-build".to_string(),
            python: "python3".to_string(),
            cached_builders: vec!["html".to_string(), "dirhtml".to_string()],
        }
    }
}

impl BuildConfig {
    /// Whether the builder gets cache reconciliation
    pub fn is_cached_builder(&self, builder: &str) -> bool {
        self.cached_builders.iter().any(|b| b == builder)
    }
}

/// Cache configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Cache root used when --cache is not given
    pub dir: Option<PathBuf>,

    /// Whether restore moves or copies the cached trees
    pub restore_mode: RestoreMode,
}

/// How tracked file mtimes are restored
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HistoryBackend {
    /// Walk history with the git CLI
    #[default]
    Builtin,
    /// Run an external git-restore-mtime compatible program
    External,
}

/// Source mtime restoration configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HistoryConfig {
    /// Which backend restores mtimes
    pub backend: HistoryBackend,

    /// External program (backend = "external")
    pub program: String,

    /// Extra arguments for the external program
    pub args: Vec<String>,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            backend: HistoryBackend::Builtin,
            program: "git-restore-mtime".to_string(),
            args: vec![],
        }
    }
}

/// Theme normalization configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThemeConfig {
    /// Theme assumed when conf.py cannot be evaluated
    pub default: String,

    /// Template file extensions whose mtimes are normalized
    pub extensions: Vec<String>,

    /// Also normalize templates shipped with Sphinx itself
    pub include_sphinx: bool,

    /// Query the package index for real release timestamps
    pub release_lookup: bool,

    /// Base URL of the package index JSON API
    pub index_url: String,

    /// Timeout for index queries in seconds
    pub timeout_secs: u64,
}

impl Default for ThemeConfig {
    fn default() -> Self {
        Self {
            default: "alabaster".to_string(),
            extensions: vec!["html".to_string()],
            include_sphinx: true,
            release_lookup: false,
            index_url: "https://pypi.org/pypi".to_string(),
            timeout_secs: 10,
        }
    }
}

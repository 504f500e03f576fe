//! Error types for incrbuild
//!
//! All modules use `IncrResult<T>` as their return type. Conditions that only
//! degrade the incremental optimization (theme mtimes, partial caches) are
//! logged where they happen and never become an `IncrError`.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for incrbuild operations
pub type IncrResult<T> = Result<T, IncrError>;

/// All errors that can occur in incrbuild
#[derive(Error, Debug)]
pub enum IncrError {
    // Configuration errors
    #[error("Source directory not found: {path}: {source}")]
    SourceDirNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Cannot resolve directory {path}: {reason}")]
    DirUnresolvable { path: PathBuf, reason: String },

    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    // Version control errors
    #[error("Not inside a git working tree: {path}")]
    NotAVersionControlledTree { path: PathBuf },

    #[error("{tool} exited with exit code: {code}")]
    HistoryToolFailure { tool: String, code: i32 },

    #[error("{tool} terminated by signal")]
    HistoryToolSignaled { tool: String },

    // Project probe errors
    #[error("Package not found: {0}")]
    PackageNotFound(String),

    #[error("Project probe failed: {0}")]
    ProbeFailed(String),

    #[error("Registry lookup failed for {package}: {reason}")]
    Registry { package: String, reason: String },

    // Cache errors
    #[error("Failed to save cache to {path}: {source}")]
    CacheSave {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to restore cache from {path}: {source}")]
    CacheRestore {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl IncrError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Process exit code for this error
    ///
    /// A failing history tool hands its own exit code through so CI logs show
    /// the code the tool reported.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::HistoryToolFailure { code, .. } if *code != 0 => *code,
            _ => 1,
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::NotAVersionControlledTree { .. } => {
                Some("Run inside a git checkout, and fetch full history (fetch-depth: 0)")
            }
            Self::HistoryToolFailure { .. } | Self::HistoryToolSignaled { .. } => {
                Some("Set history.backend = \"builtin\" to use the bundled git walker")
            }
            Self::SourceDirNotFound { .. } => Some("Check the SOURCEDIR argument"),
            Self::CommandFailed { .. } => {
                Some("Check that the program is installed and on PATH")
            }
            _ => None,
        }
    }
}

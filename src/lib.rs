//! incrbuild - Incremental Sphinx builds in ephemeral CI environments
//!
//! Wraps `sphinx-build`: restores the previous build from a cache directory,
//! reconciles source and theme mtimes so Sphinx only rebuilds what changed,
//! and saves the result of a successful build for the next run.

pub mod app;
pub mod cache;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod mtime;
pub mod pipeline;

pub use app::AppInfo;
pub use error::{IncrError, IncrResult};
pub use pipeline::{BuildOutcome, CacheAction, Pipeline};

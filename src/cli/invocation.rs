//! Resolved view of one incrbuild invocation

use crate::app::AppInfo;
use crate::cli::args::ParsedArgs;
use crate::config::Config;
use crate::error::{IncrError, IncrResult};
use std::path::{Path, PathBuf};

/// Intermediate directory of sphinx-build in normal mode, under OUTPUTDIR
pub const DOCTREES_DIR: &str = ".doctrees";

/// Intermediate directory of sphinx-build in make mode, under BUILDDIR
pub const MAKE_DOCTREES_DIR: &str = "doctrees";

/// Everything the pipeline needs to know about one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    /// Canonical source directory
    pub source_dir: PathBuf,
    /// Directory holding conf.py
    pub conf_dir: PathBuf,
    /// Rendered output directory
    pub output_dir: PathBuf,
    /// Doctree/environment directory
    pub intermediate_dir: PathBuf,
    /// Builder sphinx-build will run
    pub builder: String,
    /// Whether sphinx-build runs in make mode
    pub make_mode: bool,
    /// Cache root
    pub cache_dir: PathBuf,
    /// Arguments forwarded verbatim to sphinx-build
    pub build_args: Vec<String>,
}

impl Invocation {
    /// Resolve directories the way sphinx-build will see them
    ///
    /// Relative paths are taken against the current directory. The source
    /// directory must exist; the others may not exist yet.
    pub fn resolve(parsed: &ParsedArgs, app: &AppInfo, config: &Config) -> IncrResult<Self> {
        let build = &parsed.build;

        let source_dir = std::fs::canonicalize(&build.sourcedir).map_err(|source| {
            IncrError::SourceDirNotFound {
                path: build.sourcedir.clone(),
                source,
            }
        })?;

        let conf_dir = match &build.conf_dir {
            Some(dir) => absolute(dir)?,
            None => source_dir.clone(),
        };

        let out = absolute(&build.outputdir)?;
        let builder = build.builder().to_string();
        let (output_dir, default_intermediate) = if build.is_make_mode() {
            (out.join(&builder), out.join(MAKE_DOCTREES_DIR))
        } else {
            (out.clone(), out.join(DOCTREES_DIR))
        };
        let intermediate_dir = match &build.doctree_dir {
            Some(dir) => absolute(dir)?,
            None => default_intermediate,
        };

        let cache_dir = match parsed.incr.cache.as_ref().or(config.cache.dir.as_ref()) {
            Some(dir) => absolute(dir)?,
            None => app.default_cache_dir(),
        };

        Ok(Self {
            source_dir,
            conf_dir,
            output_dir,
            intermediate_dir,
            builder,
            make_mode: build.is_make_mode(),
            cache_dir,
            build_args: parsed.passthrough.clone(),
        })
    }
}

fn absolute(path: &Path) -> IncrResult<PathBuf> {
    std::path::absolute(path).map_err(|e| IncrError::DirUnresolvable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

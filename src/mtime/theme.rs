//! Theme template mtime normalization
//!
//! Sphinx's HTML builder rebuilds every page when a theme template is newer
//! than the previous build. Theme packages are reinstalled on every CI run,
//! so their templates always look brand new. This module dates them back to
//! the release of the package version (when known) or to the 1900 sentinel.
//!
//! Everything here is best effort: a failure only costs a full rebuild.

use crate::config::schema::ThemeConfig;
use crate::engine::{normalize_name, Distribution, ProjectProbe};
use crate::error::IncrError;
use crate::mtime::registry::ReleaseRegistry;
use crate::mtime::{display, from_datetime, mtime_of, sentinel, set_mtime};
use filetime::FileTime;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Distribution that ships Sphinx's builtin themes
const SPHINX_DISTRIBUTION: &str = "sphinx";

/// Outcome of one normalization pass
#[derive(Debug, Clone, Default)]
pub struct NormalizeReport {
    /// Theme name the pass ran for
    pub theme: String,
    /// Distributions whose templates were considered
    pub packages: Vec<String>,
    /// Files whose mtime was rewritten
    pub updated: Vec<PathBuf>,
    /// Files that could not be rewritten, with the reason
    pub failed: Vec<(PathBuf, String)>,
}

/// A template file and the mtime it should carry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThemeAsset {
    /// Absolute path of the installed file
    pub path: PathBuf,
    /// Target mtime
    pub target: FileTime,
}

/// Rewrites mtimes of theme templates
pub struct ThemeNormalizer<'a> {
    config: &'a ThemeConfig,
    probe: &'a dyn ProjectProbe,
    registry: Option<&'a dyn ReleaseRegistry>,
}

impl<'a> ThemeNormalizer<'a> {
    /// Create a normalizer; without a registry every file gets the sentinel
    pub fn new(
        config: &'a ThemeConfig,
        probe: &'a dyn ProjectProbe,
        registry: Option<&'a dyn ReleaseRegistry>,
    ) -> Self {
        Self {
            config,
            probe,
            registry,
        }
    }

    /// Theme configured by the project in `conf_dir`, or the default theme
    pub async fn resolve_theme(&self, conf_dir: &Path) -> String {
        match self.probe.html_theme(conf_dir).await {
            Ok(Some(theme)) => theme,
            Ok(None) => {
                debug!("html_theme not set, using {}", self.config.default);
                self.config.default.clone()
            }
            Err(e) => {
                warn!(
                    "Failed to read theme from {}: {}; assuming {}",
                    conf_dir.display(),
                    e,
                    self.config.default
                );
                self.config.default.clone()
            }
        }
    }

    /// Installed distributions holding templates for `theme`: the theme
    /// itself, its mandatory requirements and optionally Sphinx
    pub async fn packages(&self, theme: &str) -> Vec<Distribution> {
        let mut seen = HashSet::new();
        let mut packages = Vec::new();

        match self.probe.distribution(theme).await {
            Ok(dist) => {
                seen.insert(normalize_name(theme));
                let requirements: Vec<String> = dist
                    .mandatory_requirements()
                    .into_iter()
                    .map(str::to_string)
                    .collect();
                seen.insert(normalize_name(&dist.name));
                packages.push(dist);

                for requirement in requirements {
                    if let Some(dep) = self.lookup(&requirement, &mut seen).await {
                        packages.push(dep);
                    }
                }
            }
            Err(IncrError::PackageNotFound(_)) => {
                // Builtin themes (classic, nature, ...) live inside Sphinx
                info!("Theme {} is not an installed package", theme);
            }
            Err(e) => warn!("Failed to inspect theme {}: {}", theme, e),
        }

        if self.config.include_sphinx {
            if let Some(sphinx) = self.lookup(SPHINX_DISTRIBUTION, &mut seen).await {
                packages.push(sphinx);
            }
        }

        packages
    }

    async fn lookup(&self, name: &str, seen: &mut HashSet<String>) -> Option<Distribution> {
        if !seen.insert(normalize_name(name)) {
            return None;
        }
        match self.probe.distribution(name).await {
            Ok(dist) => Some(dist),
            Err(IncrError::PackageNotFound(_)) => {
                debug!("Package {} not installed", name);
                None
            }
            Err(e) => {
                warn!("Failed to inspect package {}: {}", name, e);
                None
            }
        }
    }

    /// Target mtime for the templates of one distribution
    pub async fn target_mtime(&self, dist: &Distribution) -> FileTime {
        let Some(registry) = self.registry else {
            return sentinel();
        };
        match registry.release_time(&dist.name, &dist.version).await {
            Ok(released) => {
                debug!("{} {} released at {}", dist.name, dist.version, released);
                from_datetime(released)
            }
            Err(e) => {
                warn!("Using sentinel mtime for {}: {}", dist.name, e);
                sentinel()
            }
        }
    }

    /// Template files of `packages` with their target mtimes
    pub async fn assets(&self, packages: &[Distribution]) -> Vec<ThemeAsset> {
        let mut assets = Vec::new();
        for dist in packages {
            let target = self.target_mtime(dist).await;
            let before = assets.len();
            assets.extend(
                dist.files_with_extension(&self.config.extensions)
                    .map(|path| ThemeAsset {
                        path: path.clone(),
                        target,
                    }),
            );
            debug!(
                "{} {}: {} template files",
                dist.name,
                dist.version,
                assets.len() - before
            );
        }
        assets
    }

    /// Resolve the theme of the project in `conf_dir` and rewrite the mtimes
    /// of all its templates
    pub async fn normalize(&self, conf_dir: &Path) -> NormalizeReport {
        let theme = self.resolve_theme(conf_dir).await;
        info!("Current theme: {}", theme);

        let packages = self.packages(&theme).await;
        let assets = self.assets(&packages).await;

        let mut report = NormalizeReport {
            theme,
            packages: packages.iter().map(|d| d.name.clone()).collect(),
            ..Default::default()
        };

        for asset in assets {
            match apply(&asset) {
                Ok(()) => report.updated.push(asset.path),
                Err(e) => {
                    warn!("Failed to set mtime of {}: {}", asset.path.display(), e);
                    report.failed.push((asset.path, e.to_string()));
                }
            }
        }

        if !report.failed.is_empty() && report.updated.is_empty() {
            warn!("No theme template could be updated; expect a full rebuild");
        }
        info!(
            "Normalized mtime of {} theme templates ({} failed)",
            report.updated.len(),
            report.failed.len()
        );
        report
    }
}

fn apply(asset: &ThemeAsset) -> std::io::Result<()> {
    let old = mtime_of(&asset.path)?;
    debug!(
        "Restoring mtime of {}: {} -> {}",
        asset.path.display(),
        display(old),
        display(asset.target)
    );
    set_mtime(&asset.path, asset.target)
}

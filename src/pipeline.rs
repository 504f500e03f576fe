//! The incremental build pipeline
//!
//! restore cache -> normalize theme mtimes -> restore source mtimes ->
//! build -> save cache (only after a successful build)

use crate::app::AppInfo;
use crate::cache::CacheBundle;
use crate::cli::Invocation;
use crate::config::Config;
use crate::engine::{BuildEngine, ProjectProbe, PythonProbe, SphinxBuild};
use crate::error::IncrResult;
use crate::mtime::{
    create_history_tool, GitHistoryRestorer, HistoryTool, PyPiRegistry, ReleaseRegistry,
    ThemeNormalizer,
};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// What happened to the cache during a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheAction {
    /// Builder not cached; nothing restored or saved
    Passthrough,
    /// Build succeeded and the bundle was replaced
    Saved,
    /// Build failed; the bundle was not written
    Skipped,
}

/// Result of one pipeline run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildOutcome {
    /// Exit code of the build engine
    pub exit_code: i32,
    /// Rendered output directory
    pub output_dir: PathBuf,
    /// Intermediate directory
    pub intermediate_dir: PathBuf,
    /// Cache handling
    pub cache: CacheAction,
}

impl BuildOutcome {
    /// Whether the build engine reported success
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Wires the components of one run together
pub struct Pipeline {
    app: AppInfo,
    config: Config,
    engine: Box<dyn BuildEngine>,
    probe: Box<dyn ProjectProbe>,
    history: Box<dyn HistoryTool>,
    registry: Option<Box<dyn ReleaseRegistry>>,
}

impl Pipeline {
    /// Create a pipeline with the collaborators selected by `config`
    pub fn from_config(app: AppInfo, config: Config) -> Self {
        let engine = Box::new(SphinxBuild::new(config.build.sphinx_build.clone()));
        let probe = Box::new(PythonProbe::new(config.build.python.clone()));
        let history = create_history_tool(&config.history);
        let registry: Option<Box<dyn ReleaseRegistry>> = config.theme.release_lookup.then(|| {
            Box::new(PyPiRegistry::new(
                config.theme.index_url.clone(),
                Duration::from_secs(config.theme.timeout_secs),
            )) as Box<dyn ReleaseRegistry>
        });

        Self {
            app,
            config,
            engine,
            probe,
            history,
            registry,
        }
    }

    /// Replace the build engine
    pub fn with_engine(mut self, engine: Box<dyn BuildEngine>) -> Self {
        self.engine = engine;
        self
    }

    /// Replace the project probe
    pub fn with_probe(mut self, probe: Box<dyn ProjectProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Replace the history tool
    pub fn with_history(mut self, history: Box<dyn HistoryTool>) -> Self {
        self.history = history;
        self
    }

    /// Replace (or remove) the release registry
    pub fn with_registry(mut self, registry: Option<Box<dyn ReleaseRegistry>>) -> Self {
        self.registry = registry;
        self
    }

    /// Run one invocation
    ///
    /// Reconciliation failures of the source tree abort before the build;
    /// theme and partial-cache problems only log warnings.
    pub async fn run(&self, inv: &Invocation) -> IncrResult<BuildOutcome> {
        info!(
            "Running {} {}, cache directory: {}",
            self.app.name,
            self.app.version,
            inv.cache_dir.display()
        );

        let mut outcome = BuildOutcome {
            exit_code: 0,
            output_dir: inv.output_dir.clone(),
            intermediate_dir: inv.intermediate_dir.clone(),
            cache: CacheAction::Passthrough,
        };

        if !self.config.build.is_cached_builder(&inv.builder) {
            warn!(
                "Builder {} is not cached (cached builders: {}), passthrough",
                inv.builder,
                self.config.build.cached_builders.join(", ")
            );
            outcome.exit_code = self.build(inv).await?;
            return Ok(outcome);
        }

        let bundle = CacheBundle::new(&inv.cache_dir);
        let state = bundle.restore_with(
            &inv.output_dir,
            &inv.intermediate_dir,
            self.config.cache.restore_mode,
        )?;
        info!("Cache state: {}", state);

        let normalizer =
            ThemeNormalizer::new(&self.config.theme, self.probe.as_ref(), self.registry.as_deref());
        normalizer.normalize(&inv.conf_dir).await;

        GitHistoryRestorer::new(self.history.as_ref())
            .restore(&inv.source_dir)
            .await?;

        outcome.exit_code = self.build(inv).await?;

        if outcome.succeeded() {
            bundle.save(&inv.output_dir, &inv.intermediate_dir)?;
            outcome.cache = CacheAction::Saved;
        } else {
            warn!(
                "Skip saving cache because {} returns {}",
                self.engine.name(),
                outcome.exit_code
            );
            outcome.cache = CacheAction::Skipped;
        }

        Ok(outcome)
    }

    async fn build(&self, inv: &Invocation) -> IncrResult<i32> {
        info!(
            "Running {} {}...",
            self.engine.name(),
            inv.build_args.join(" ")
        );
        self.engine.run(&inv.build_args).await
    }
}

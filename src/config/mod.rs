//! Configuration management for incrbuild

pub mod schema;

pub use schema::{Config, HistoryBackend};

use crate::error::{IncrError, IncrResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// File name of the project-local configuration
pub const LOCAL_CONFIG_FILE: &str = ".incrbuild.toml";

/// Environment variables that override single configuration values
pub mod env {
    /// Overrides `build.sphinx_build`
    pub const SPHINX_BUILD: &str = "INCRBUILD_SPHINX_BUILD";
    /// Overrides `build.python`
    pub const PYTHON: &str = "INCRBUILD_PYTHON";
    /// Overrides `history.program` and selects the external backend
    pub const HISTORY_TOOL: &str = "INCRBUILD_HISTORY_TOOL";
}

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("incrbuild")
            .join("config.toml")
    }

    /// Find the nearest project-local config, starting at `start`
    pub fn find_local_config(start: &Path) -> Option<PathBuf> {
        start
            .ancestors()
            .map(|dir| dir.join(LOCAL_CONFIG_FILE))
            .find(|candidate| candidate.is_file())
    }

    /// Load configuration, using defaults if the file does not exist
    pub async fn load(&self) -> IncrResult<Config> {
        self.load_merged(None).await
    }

    /// Load the global configuration with an optional local file merged on top
    pub async fn load_merged(&self, local: Option<&Path>) -> IncrResult<Config> {
        let mut merged = toml::Table::new();

        if self.config_path.exists() {
            merge_tables(&mut merged, read_table(&self.config_path).await?);
        } else {
            debug!("Config file not found, using defaults");
        }

        if let Some(local) = local {
            debug!("Merging local config: {}", local.display());
            merge_tables(&mut merged, read_table(local).await?);
        }

        let path = local.unwrap_or(&self.config_path);
        let mut config: Config =
            toml::Value::Table(merged)
                .try_into()
                .map_err(|e: toml::de::Error| IncrError::ConfigInvalid {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                })?;

        apply_env_overrides(&mut config, |key| std::env::var(key).ok());
        Ok(config)
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

async fn read_table(path: &Path) -> IncrResult<toml::Table> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|e| IncrError::io(format!("reading config from {}", path.display()), e))?;

    content
        .parse::<toml::Table>()
        .map_err(|e| IncrError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

/// Deep-merge `overlay` into `base`; nested tables merge, other values replace
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(program) = lookup(env::SPHINX_BUILD) {
        debug!("{} overrides build.sphinx_build", env::SPHINX_BUILD);
        config.build.sphinx_build = program;
    }
    if let Some(python) = lookup(env::PYTHON) {
        debug!("{} overrides build.python", env::PYTHON);
        config.build.python = python;
    }
    if let Some(tool) = lookup(env::HISTORY_TOOL) {
        debug!("{} selects external history tool", env::HISTORY_TOOL);
        config.history.backend = HistoryBackend::External;
        config.history.program = tool;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[tokio::test]
    #[serial]
    async fn load_default_when_missing() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nonexistent.toml");
        let manager = ConfigManager::with_path(path);

        let config = manager.load().await.unwrap();
        assert_eq!(config.theme.default, "alabaster");
    }

    #[tokio::test]
    #[serial]
    async fn local_overrides_global() {
        let temp = TempDir::new().unwrap();
        let global = temp.path().join("config.toml");
        std::fs::write(
            &global,
            "[theme]\ndefault = \"furo\"\nrelease_lookup = true\n",
        )
        .unwrap();
        let local = temp.path().join(LOCAL_CONFIG_FILE);
        std::fs::write(&local, "[theme]\ndefault = \"sphinx_rtd_theme\"\n").unwrap();

        let manager = ConfigManager::with_path(global);
        let config = manager.load_merged(Some(&local)).await.unwrap();

        assert_eq!(config.theme.default, "sphinx_rtd_theme");
        assert!(config.theme.release_lookup); // kept from global
    }

    #[tokio::test]
    #[serial]
    async fn invalid_config_reports_path() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("config.toml");
        std::fs::write(&path, "[history]\nbackend = \"svn\"\n").unwrap();

        let err = ConfigManager::with_path(path.clone()).load().await.unwrap_err();
        match err {
            IncrError::ConfigInvalid { path: p, .. } => assert_eq!(p, path),
            other => panic!("expected ConfigInvalid, got {other:?}"),
        }
    }

    #[test]
    fn find_local_config_walks_ancestors() {
        let temp = TempDir::new().unwrap();
        let nested = temp.path().join("docs").join("source");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(temp.path().join(LOCAL_CONFIG_FILE), "").unwrap();

        let found = ConfigManager::find_local_config(&nested).unwrap();
        assert_eq!(found, temp.path().join(LOCAL_CONFIG_FILE));
    }

    #[test]
    fn env_overrides() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (env::SPHINX_BUILD, "/venv/bin/sphinx-build"),
            (env::HISTORY_TOOL, "/opt/git-restore-mtime"),
        ]);
        let mut config = Config::default();
        apply_env_overrides(&mut config, |k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.build.sphinx_build, "/venv/bin/sphinx-build");
        assert_eq!(config.build.python, "python3");
        assert_eq!(config.history.backend, HistoryBackend::External);
        assert_eq!(config.history.program, "/opt/git-restore-mtime");
    }

    #[test]
    fn merge_replaces_scalars_and_merges_tables() {
        let mut base: toml::Table = "[a]\nx = 1\ny = 2\n".parse().unwrap();
        let overlay: toml::Table = "[a]\ny = 3\n[b]\nz = 4\n".parse().unwrap();
        merge_tables(&mut base, overlay);

        assert_eq!(base["a"]["x"].as_integer(), Some(1));
        assert_eq!(base["a"]["y"].as_integer(), Some(3));
        assert_eq!(base["b"]["z"].as_integer(), Some(4));
    }
}

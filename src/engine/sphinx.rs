//! Sphinx implementations of the engine interfaces
//!
//! `sphinx-build` runs as a child process with inherited stdio. Project and
//! package questions are answered by short Python snippets executed with the
//! interpreter that has Sphinx installed.

use crate::engine::{BuildEngine, Distribution, ProjectProbe};
use crate::error::{IncrError, IncrResult};
use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::debug;

/// Evaluates conf.py with Sphinx's own config loader and prints html_theme
const THEME_SCRIPT: &str = r#"
import sys
from sphinx.config import eval_config_file
namespace = eval_config_file(sys.argv[1], None)
theme = namespace.get("html_theme")
print(theme if isinstance(theme, str) else "")
"#;

/// Prints distribution metadata as JSON, or null when not installed
const DISTRIBUTION_SCRIPT: &str = r#"
import json
import sys
from importlib import metadata
try:
    dist = metadata.distribution(sys.argv[1])
except metadata.PackageNotFoundError:
    print("null")
else:
    print(json.dumps({
        "name": dist.metadata["Name"],
        "version": dist.version,
        "requires": dist.requires or [],
        "files": [str(f.locate()) for f in dist.files or []],
    }))
"#;

/// Name of the Sphinx project configuration file
pub const CONF_FILE: &str = "conf.py";

/// Runs `sphinx-build`
pub struct SphinxBuild {
    program: String,
}

impl SphinxBuild {
    /// Create a runner for the given executable
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
        }
    }
}

#[async_trait]
impl BuildEngine for SphinxBuild {
    fn name(&self) -> &str {
        &self.program
    }

    async fn run(&self, args: &[String]) -> IncrResult<i32> {
        debug!("Executing: {} {:?}", self.program, args);

        let status = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::inherit())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| IncrError::command_failed(&self.program, e))?;

        Ok(status.code().unwrap_or(-1))
    }
}

/// Answers project questions through a Python interpreter
pub struct PythonProbe {
    python: String,
}

impl PythonProbe {
    /// Create a probe using the given interpreter
    pub fn new(python: impl Into<String>) -> Self {
        Self {
            python: python.into(),
        }
    }

    async fn exec(&self, script: &str, arg: &str) -> IncrResult<String> {
        let output = Command::new(&self.python)
            .arg("-c")
            .arg(script)
            .arg(arg)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| IncrError::command_failed(&self.python, e))?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            // The last traceback line carries the exception
            let reason = stderr.lines().last().unwrap_or("").trim().to_string();
            Err(IncrError::ProbeFailed(format!(
                "{} exited with {}: {}",
                self.python,
                output.status.code().unwrap_or(-1),
                reason
            )))
        }
    }
}

#[async_trait]
impl ProjectProbe for PythonProbe {
    async fn html_theme(&self, conf_dir: &Path) -> IncrResult<Option<String>> {
        let conf = conf_dir.join(CONF_FILE);
        let theme = self.exec(THEME_SCRIPT, &conf.to_string_lossy()).await?;
        Ok(parse_theme(&theme))
    }

    async fn distribution(&self, name: &str) -> IncrResult<Distribution> {
        let json = self.exec(DISTRIBUTION_SCRIPT, name).await?;
        parse_distribution(name, &json)
    }
}

fn parse_theme(stdout: &str) -> Option<String> {
    let theme = stdout.lines().last().unwrap_or("").trim();
    (!theme.is_empty()).then(|| theme.to_string())
}

fn parse_distribution(name: &str, json: &str) -> IncrResult<Distribution> {
    let dist: Option<Distribution> = serde_json::from_str(json)?;
    dist.ok_or_else(|| IncrError::PackageNotFound(name.to_string()))
}

//! Restore tracked file mtimes from git history
//!
//! Every tracked file gets the committer timestamp of the most recent commit
//! that touched it, so unchanged files look old to Sphinx and changed files
//! look new. Two backends implement [`HistoryTool`]:
//!
//! - [`BuiltinHistoryTool`]: walks `git log` directly
//! - [`ExternalHistoryTool`]: runs a `git-restore-mtime` compatible program
//!
//! Both are fatal on failure: building against a wrong staleness signal is
//! worse than not building.

use crate::config::schema::{HistoryBackend, HistoryConfig};
use crate::error::{IncrError, IncrResult};
use crate::mtime::set_mtime;
use async_trait::async_trait;
use filetime::FileTime;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info, info_span, warn, Instrument};

/// Prefix marking a commit header record in `git log -z` output
const COMMIT_MARKER: char = '\u{1}';

/// Restores tracked file mtimes inside a repository
#[async_trait]
pub trait HistoryTool: Send + Sync {
    /// Name used as log prefix
    fn name(&self) -> &str;

    /// Top-level directory of the working tree containing `dir`
    async fn toplevel(&self, dir: &Path) -> IncrResult<PathBuf> {
        resolve_root(dir).await
    }

    /// Rewrite the mtimes of all tracked files under `root`
    async fn resolve(&self, root: &Path) -> IncrResult<()>;
}

/// Resolve the top-level directory of the git working tree containing `dir`
pub async fn resolve_root(dir: &Path) -> IncrResult<PathBuf> {
    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .current_dir(dir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| IncrError::command_failed("git rev-parse --show-toplevel", e))?;

    if !output.status.success() {
        debug!(
            "git rev-parse failed: {}",
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Err(IncrError::NotAVersionControlledTree {
            path: dir.to_path_buf(),
        });
    }

    let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if root.is_empty() {
        return Err(IncrError::NotAVersionControlledTree {
            path: dir.to_path_buf(),
        });
    }
    Ok(PathBuf::from(root))
}

/// Create the history tool selected by configuration
pub fn create_history_tool(config: &HistoryConfig) -> Box<dyn HistoryTool> {
    match config.backend {
        HistoryBackend::Builtin => Box::new(BuiltinHistoryTool::new()),
        HistoryBackend::External => Box::new(ExternalHistoryTool::new(
            config.program.clone(),
            config.args.clone(),
        )),
    }
}

/// Resolves the repository root and restores its mtimes
pub struct GitHistoryRestorer<'a> {
    tool: &'a dyn HistoryTool,
}

impl<'a> GitHistoryRestorer<'a> {
    /// Create a restorer backed by `tool`
    pub fn new(tool: &'a dyn HistoryTool) -> Self {
        Self { tool }
    }

    /// Restore mtimes of every tracked file in the repository containing
    /// `source_dir`, returning the repository root
    pub async fn restore(&self, source_dir: &Path) -> IncrResult<PathBuf> {
        let root = self.tool.toplevel(source_dir).await?;
        info!("Git root: {}", root.display());

        self.tool
            .resolve(&root)
            .instrument(info_span!("history", tool = %self.tool.name()))
            .await?;

        Ok(root)
    }
}

/// Runs an external `git-restore-mtime` compatible program in the repository
/// root, forwarding its stderr lines to the log
pub struct ExternalHistoryTool {
    program: String,
    args: Vec<String>,
}

impl ExternalHistoryTool {
    /// Create a tool running `program` with `args`
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }
}

#[async_trait]
impl HistoryTool for ExternalHistoryTool {
    fn name(&self) -> &str {
        Path::new(&self.program)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(&self.program)
    }

    async fn resolve(&self, root: &Path) -> IncrResult<()> {
        debug!("Executing: {} {:?}", self.program, self.args);

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(root)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| IncrError::command_failed(&self.program, e))?;

        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).split(b'\n');
            while let Some(line) = lines
                .next_segment()
                .await
                .map_err(|e| IncrError::io(format!("reading {} output", self.program), e))?
            {
                info!("{}", String::from_utf8_lossy(&line).trim_end());
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| IncrError::command_failed(&self.program, e))?;

        match status.code() {
            Some(0) => Ok(()),
            Some(code) => Err(IncrError::HistoryToolFailure {
                tool: self.program.clone(),
                code,
            }),
            None => Err(IncrError::HistoryToolSignaled {
                tool: self.program.clone(),
            }),
        }
    }
}

/// Walks `git log` newest-first and assigns each tracked file the committer
/// timestamp of the first commit that lists it
///
/// Merge commits are skipped. Files absent from the fetched history (shallow
/// clones) keep their checkout mtime.
pub struct BuiltinHistoryTool;

impl BuiltinHistoryTool {
    /// Create the builtin tool
    pub fn new() -> Self {
        Self
    }

    async fn tracked_files(root: &Path) -> IncrResult<HashSet<String>> {
        let output = git_output(root, &["ls-files", "-z"]).await?;
        Ok(output
            .split(|b| *b == 0)
            .filter(|entry| !entry.is_empty())
            .map(|entry| String::from_utf8_lossy(entry).into_owned())
            .collect())
    }

    async fn is_shallow(root: &Path) -> bool {
        git_output(root, &["rev-parse", "--is-shallow-repository"])
            .await
            .map(|out| String::from_utf8_lossy(&out).trim() == "true")
            .unwrap_or(false)
    }

    async fn commit_times(
        root: &Path,
        tracked: HashSet<String>,
    ) -> IncrResult<HashMap<String, i64>> {
        let format = format!("--format=format:%x{:02x}%ct", COMMIT_MARKER as u32);
        let args = [
            "-c",
            "core.quotepath=off",
            "log",
            "--no-merges",
            "--no-renames",
            "--name-only",
            "-z",
            format.as_str(),
        ];
        debug!("Executing: git {:?}", args);

        let mut child = Command::new("git")
            .args(args)
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| IncrError::command_failed("git log", e))?;

        let mut parser = LogParser::new(tracked);
        if let Some(stdout) = child.stdout.take() {
            let mut records = BufReader::new(stdout).split(b'\0');
            while let Some(record) = records
                .next_segment()
                .await
                .map_err(|e| IncrError::io("reading git log output", e))?
            {
                if parser.feed(&String::from_utf8_lossy(&record)) {
                    break;
                }
            }
        }

        if parser.is_done() {
            // Every tracked file is resolved; the rest of history is not needed
            let _ = child.start_kill();
            let _ = child.wait().await;
        } else {
            let output = child
                .wait_with_output()
                .await
                .map_err(|e| IncrError::command_failed("git log", e))?;
            if !output.status.success() {
                warn!("git log: {}", String::from_utf8_lossy(&output.stderr).trim());
                return Err(IncrError::HistoryToolFailure {
                    tool: "git log".to_string(),
                    code: output.status.code().unwrap_or(-1),
                });
            }
        }

        Ok(parser.finish())
    }
}

impl Default for BuiltinHistoryTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HistoryTool for BuiltinHistoryTool {
    fn name(&self) -> &str {
        "git-history"
    }

    async fn resolve(&self, root: &Path) -> IncrResult<()> {
        let tracked = Self::tracked_files(root).await?;
        let total = tracked.len();
        if total == 0 {
            info!("No tracked files");
            return Ok(());
        }
        if Self::is_shallow(root).await {
            warn!("Shallow clone: files without fetched history keep their checkout mtime");
        }

        let times = Self::commit_times(root, tracked).await?;
        let mut updated = 0usize;
        for (relative, secs) in &times {
            let path = root.join(relative);
            match set_mtime(&path, FileTime::from_unix_time(*secs, 0)) {
                Ok(()) => updated += 1,
                // Deleted in the working tree but still tracked
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    debug!("Skipping missing file {}", path.display());
                }
                Err(e) => {
                    return Err(IncrError::io(
                        format!("setting mtime of {}", path.display()),
                        e,
                    ))
                }
            }
        }

        info!(
            "Restored mtime of {} of {} tracked files ({} without history)",
            updated,
            total,
            total - times.len()
        );
        Ok(())
    }
}

/// Incremental parser for `git log --name-only -z` output
///
/// Records are NUL separated. A commit record is the marker and committer
/// timestamp, followed by a newline and the first path of that commit when
/// the commit touched any file. Every other record is one raw path.
struct LogParser {
    pending: HashSet<String>,
    resolved: HashMap<String, i64>,
    current: Option<i64>,
}

impl LogParser {
    fn new(tracked: HashSet<String>) -> Self {
        Self {
            pending: tracked,
            resolved: HashMap::new(),
            current: None,
        }
    }

    /// Consume one NUL separated record; returns true once every file is resolved
    fn feed(&mut self, record: &str) -> bool {
        let record = record.trim_start_matches('\n');
        match record.strip_prefix(COMMIT_MARKER) {
            Some(header) => {
                let (stamp, first) = header.split_once('\n').unwrap_or((header, ""));
                self.current = stamp.trim().parse().ok();
                self.take(first.trim_start_matches('\n'));
            }
            None => self.take(record),
        }
        self.is_done()
    }

    fn take(&mut self, path: &str) {
        if path.is_empty() {
            return;
        }
        if let Some(secs) = self.current {
            if let Some(path) = self.pending.take(path) {
                self.resolved.insert(path, secs);
            }
        }
    }

    fn is_done(&self) -> bool {
        self.pending.is_empty()
    }

    fn finish(self) -> HashMap<String, i64> {
        self.resolved
    }
}

async fn git_output(root: &Path, args: &[&str]) -> IncrResult<Vec<u8>> {
    let output = Command::new("git")
        .args(args)
        .current_dir(root)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| IncrError::command_failed(format!("git {}", args.join(" ")), e))?;

    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(IncrError::command_exec(
            format!("git {}", args.join(" ")),
            String::from_utf8_lossy(&output.stderr).trim(),
        ))
    }
}

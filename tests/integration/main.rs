//! Integration tests for incrbuild

use std::fs;
use std::path::Path;
use std::process::Command as StdCommand;

fn git_available() -> bool {
    StdCommand::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn git(dir: &Path, args: &[&str], epoch: i64) {
    let date = format!("{} +0000", epoch);
    let output = StdCommand::new("git")
        .args([
            "-c",
            "user.name=Docs Bot",
            "-c",
            "user.email=docs@example.com",
            "-c",
            "commit.gpgsign=false",
            "-c",
            "init.defaultBranch=main",
        ])
        .args(args)
        .current_dir(dir)
        .env("GIT_AUTHOR_DATE", &date)
        .env("GIT_COMMITTER_DATE", &date)
        .output()
        .unwrap();
    assert!(output.status.success(), "git {:?} failed", args);
}

/// Sphinx-like source tree with three documents committed at 1_600_000_000
fn init_docs_repo(root: &Path) {
    git(root, &["init", "-q"], 0);
    for name in ["index", "install", "usage"] {
        fs::write(root.join(format!("{name}.rst")), format!("{name}\n====\n")).unwrap();
    }
    fs::write(root.join("conf.py"), "project = 'demo'\n").unwrap();
    git(root, &["add", "."], 0);
    git(root, &["commit", "-q", "-m", "initial"], 1_600_000_000);
}

mod cli_tests {
    use super::*;
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use serial_test::serial;
    use tempfile::TempDir;

    /// Command isolated from the caller's configuration
    fn incrbuild(temp: &Path) -> Command {
        let mut cmd = cargo_bin_cmd!("incrbuild");
        cmd.env("INCRBUILD_CONFIG", temp.join("no-config.toml"))
            .env("INCRBUILD_PYTHON", "false")
            .env_remove("INCRBUILD_CACHE")
            .env_remove("INCRBUILD_HISTORY_TOOL")
            .env_remove("INCRBUILD_LOG");
        if let Some(parent) = temp.parent() {
            cmd.env("GIT_CEILING_DIRECTORIES", parent);
        }
        cmd
    }

    /// Fake sphinx-build: writes a page and a doctree into OUTPUTDIR ($2),
    /// then exits with `code`
    #[cfg(unix)]
    fn fake_sphinx_build(dir: &Path, code: i32) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("fake-sphinx-build");
        fs::write(
            &script,
            format!(
                "#!/bin/sh\n\
                 mkdir -p \"$2/.doctrees\"\n\
                 echo '<p>index</p>' > \"$2/index.html\"\n\
                 echo env > \"$2/.doctrees/environment.pickle\"\n\
                 exit {code}\n"
            ),
        )
        .unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    #[test]
    #[serial]
    fn help_displays() {
        let temp = TempDir::new().unwrap();
        incrbuild(temp.path())
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("Incremental Sphinx builds"))
            .stdout(predicate::str::contains("--cache"));
    }

    #[test]
    #[serial]
    fn version_displays() {
        let temp = TempDir::new().unwrap();
        incrbuild(temp.path())
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("incrbuild"));
    }

    #[test]
    #[serial]
    fn missing_outputdir_is_usage_error() {
        let temp = TempDir::new().unwrap();
        incrbuild(temp.path())
            .arg("docs")
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Usage"));
    }

    #[test]
    #[serial]
    fn missing_source_dir() {
        let temp = TempDir::new().unwrap();
        incrbuild(temp.path())
            .arg(temp.path().join("nope"))
            .arg(temp.path().join("out"))
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Source directory not found"));
    }

    #[test]
    #[serial]
    fn invalid_config_file() {
        let temp = TempDir::new().unwrap();
        let config = temp.path().join("broken.toml");
        fs::write(&config, "[cache\n").unwrap();
        fs::create_dir(temp.path().join("docs")).unwrap();

        incrbuild(temp.path())
            .env("INCRBUILD_CONFIG", &config)
            .arg(temp.path().join("docs"))
            .arg(temp.path().join("out"))
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn non_html_builder_passes_through() {
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        fs::create_dir(&docs).unwrap();
        let engine = fake_sphinx_build(temp.path(), 3);
        let cache = temp.path().join("cache");

        incrbuild(temp.path())
            .env("INCRBUILD_SPHINX_BUILD", &engine)
            .args(["-b", "epub"])
            .arg(&docs)
            .arg(temp.path().join("out"))
            .arg("--cache")
            .arg(&cache)
            .assert()
            .code(3)
            .stderr(predicate::str::contains("passthrough"));

        assert!(!cache.exists());
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn html_build_outside_git_is_fatal() {
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        fs::create_dir(&docs).unwrap();
        let engine = fake_sphinx_build(temp.path(), 0);
        let out = temp.path().join("out");

        incrbuild(temp.path())
            .env("INCRBUILD_SPHINX_BUILD", &engine)
            .arg(&docs)
            .arg(&out)
            .arg("--cache")
            .arg(temp.path().join("cache"))
            .assert()
            .code(1)
            .stderr(predicate::str::contains("Not inside a git working tree"));

        assert!(!out.join("index.html").exists());
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn html_build_saves_cache() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        fs::create_dir(&docs).unwrap();
        init_docs_repo(&docs);
        let engine = fake_sphinx_build(temp.path(), 0);
        let out = temp.path().join("_build");
        let cache = temp.path().join("cache");

        incrbuild(temp.path())
            .env("INCRBUILD_SPHINX_BUILD", &engine)
            .arg(&docs)
            .arg(&out)
            .arg(format!("--cache={}", cache.display()))
            .assert()
            .success()
            .stderr(predicate::str::contains("Saving cache"));

        assert!(out.join("index.html").exists());
        assert!(cache.join("output/index.html").exists());
        assert!(cache.join("intermediate/environment.pickle").exists());
        assert!(!cache.join("output/.doctrees").exists());
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn failed_build_propagates_code_and_skips_save() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        fs::create_dir(&docs).unwrap();
        init_docs_repo(&docs);
        let engine = fake_sphinx_build(temp.path(), 2);
        let cache = temp.path().join("cache");

        incrbuild(temp.path())
            .env("INCRBUILD_SPHINX_BUILD", &engine)
            .arg(&docs)
            .arg(temp.path().join("_build"))
            .arg("--cache")
            .arg(&cache)
            .assert()
            .code(2)
            .stderr(predicate::str::contains("Skip saving cache"));

        assert!(!cache.exists());
    }

    #[cfg(unix)]
    #[test]
    #[serial]
    fn history_tool_exit_code_is_propagated() {
        use std::os::unix::fs::PermissionsExt;

        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        fs::create_dir(&docs).unwrap();
        init_docs_repo(&docs);
        let engine = fake_sphinx_build(temp.path(), 0);
        let tool = temp.path().join("broken-restore-mtime");
        fs::write(&tool, "#!/bin/sh\necho 'fatal: history unavailable' >&2\nexit 5\n").unwrap();
        fs::set_permissions(&tool, fs::Permissions::from_mode(0o755)).unwrap();
        let out = temp.path().join("_build");

        incrbuild(temp.path())
            .env("INCRBUILD_SPHINX_BUILD", &engine)
            .env("INCRBUILD_HISTORY_TOOL", &tool)
            .arg(&docs)
            .arg(&out)
            .arg("--cache")
            .arg(temp.path().join("cache"))
            .assert()
            .code(5)
            .stderr(predicate::str::contains("history unavailable"));

        assert!(!out.join("index.html").exists());
    }
}

mod pipeline_tests {
    use super::*;
    use async_trait::async_trait;
    use filetime::FileTime;
    use incrbuild::cli::Invocation;
    use incrbuild::config::Config;
    use incrbuild::engine::{BuildEngine, Distribution, ProjectProbe};
    use incrbuild::mtime::mtime_of;
    use incrbuild::{AppInfo, CacheAction, IncrError, IncrResult, Pipeline};
    use std::path::PathBuf;
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// mtime the fake engine stamps on everything it writes
    const BUILD_TIME: i64 = 1_640_000_000;

    /// Rebuilds a page when its source is newer than the page, like Sphinx
    struct StalenessEngine {
        source: PathBuf,
        output: PathBuf,
        intermediate: PathBuf,
        rebuilt: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl BuildEngine for StalenessEngine {
        fn name(&self) -> &str {
            "staleness-engine"
        }

        async fn run(&self, _args: &[String]) -> IncrResult<i32> {
            let stamp = FileTime::from_unix_time(BUILD_TIME, 0);
            fs::create_dir_all(&self.output).unwrap();
            fs::create_dir_all(&self.intermediate).unwrap();

            let mut sources: Vec<PathBuf> = fs::read_dir(&self.source)
                .unwrap()
                .map(|e| e.unwrap().path())
                .filter(|p| p.extension().is_some_and(|ext| ext == "rst"))
                .collect();
            sources.sort();

            for source in sources {
                let stem = source.file_stem().unwrap().to_string_lossy().into_owned();
                let page = self.output.join(format!("{stem}.html"));
                let stale = !page.exists() || mtime_of(&source).unwrap() > mtime_of(&page).unwrap();
                if stale {
                    fs::write(&page, fs::read(&source).unwrap()).unwrap();
                    filetime::set_file_mtime(&page, stamp).unwrap();
                    self.rebuilt.lock().unwrap().push(stem);
                }
            }

            let env = self.intermediate.join("environment.pickle");
            if !env.exists() {
                fs::write(&env, "env").unwrap();
                filetime::set_file_mtime(&env, stamp).unwrap();
            }
            Ok(0)
        }
    }

    /// Project using a theme with one template under `theme_dir`
    struct ThemeProbe {
        template: PathBuf,
    }

    #[async_trait]
    impl ProjectProbe for ThemeProbe {
        async fn html_theme(&self, _conf_dir: &Path) -> IncrResult<Option<String>> {
            Ok(Some("demo_theme".to_string()))
        }

        async fn distribution(&self, name: &str) -> IncrResult<Distribution> {
            if name != "demo_theme" {
                return Err(IncrError::PackageNotFound(name.to_string()));
            }
            Ok(Distribution {
                name: "demo-theme".to_string(),
                version: "1.0".to_string(),
                requires: vec![],
                files: vec![self.template.clone()],
            })
        }
    }

    fn touch_now(path: &Path) {
        filetime::set_file_mtime(path, FileTime::now()).unwrap();
    }

    #[tokio::test]
    async fn only_changed_document_is_rebuilt() {
        if !git_available() {
            return;
        }
        let temp = TempDir::new().unwrap();
        let docs = temp.path().join("docs");
        fs::create_dir(&docs).unwrap();
        init_docs_repo(&docs);
        let docs = docs.canonicalize().unwrap();

        let template = temp.path().join("site-packages/demo_theme/layout.html");
        fs::create_dir_all(template.parent().unwrap()).unwrap();
        fs::write(&template, "{{ body }}").unwrap();

        let output = temp.path().join("_build/html");
        let inv = Invocation {
            source_dir: docs.clone(),
            conf_dir: docs.clone(),
            intermediate_dir: output.join(".doctrees"),
            output_dir: output.clone(),
            builder: "html".to_string(),
            make_mode: false,
            cache_dir: temp.path().join("cache"),
            build_args: vec![],
        };
        let rebuilt = Arc::new(Mutex::new(Vec::new()));
        let pipeline = || {
            Pipeline::from_config(AppInfo::new("incrbuild", "test"), Config::default())
                .with_engine(Box::new(StalenessEngine {
                    source: docs.clone(),
                    output: output.clone(),
                    intermediate: inv.intermediate_dir.clone(),
                    rebuilt: rebuilt.clone(),
                }))
                .with_probe(Box::new(ThemeProbe {
                    template: template.clone(),
                }))
        };

        // First CI run: no cache, everything is built
        let outcome = pipeline().run(&inv).await.unwrap();
        assert_eq!(outcome.cache, CacheAction::Saved);
        assert_eq!(rebuilt.lock().unwrap().len(), 3);

        // Theme template is older than every page
        let theme_mtime = mtime_of(&template).unwrap();
        for page in ["index", "install", "usage"] {
            assert!(theme_mtime < mtime_of(&output.join(format!("{page}.html"))).unwrap());
        }

        // usage.rst changes after the first build
        fs::write(docs.join("usage.rst"), "usage\n====\n\nNew section.\n").unwrap();
        git(&docs, &["commit", "-q", "-am", "usage"], BUILD_TIME + 86_400);

        // Next CI run: fresh checkout and fresh theme install, cache restored
        fs::remove_dir_all(temp.path().join("_build")).unwrap();
        for name in ["index.rst", "install.rst", "usage.rst"] {
            touch_now(&docs.join(name));
        }
        touch_now(&template);
        rebuilt.lock().unwrap().clear();

        let outcome = pipeline().run(&inv).await.unwrap();

        assert_eq!(outcome.cache, CacheAction::Saved);
        assert_eq!(*rebuilt.lock().unwrap(), vec!["usage".to_string()]);
        assert_eq!(
            mtime_of(&docs.join("index.rst")).unwrap().unix_seconds(),
            1_600_000_000
        );
        assert!(mtime_of(&template).unwrap() < mtime_of(&output.join("index.html")).unwrap());
        assert!(inv.cache_dir.join("output/usage.html").exists());
    }
}

//! CLI argument definitions using clap derive
//!
//! [`BuildArgs`] mirrors the `sphinx-build` command line so malformed input
//! is rejected with a usage error before anything touches the filesystem.
//! [`IncrArgs`] holds the few options incrbuild consumes itself; they are
//! stripped before the remaining arguments are handed to `sphinx-build`.

use crate::app::AppInfo;
use crate::cli::split::{split_known, OwnOption};
use clap::{Arg, ArgAction, Args, Command, CommandFactory, FromArgMatches, Parser};
use std::ffi::OsString;
use std::path::PathBuf;

/// Builder used by sphinx-build when neither -b nor -M is given
pub const DEFAULT_BUILDER: &str = "html";

/// Incremental Sphinx builds for ephemeral CI environments
///
/// Accepts the sphinx-build command line. Previous build output is restored
/// from the cache directory, source and theme mtimes are reconciled, and the
/// result of a successful build is saved back.
#[derive(Parser, Debug, Clone)]
pub struct BuildArgs {
    /// Path to documentation source files
    #[arg(value_name = "SOURCEDIR")]
    pub sourcedir: PathBuf,

    /// Path to output directory
    #[arg(value_name = "OUTPUTDIR")]
    pub outputdir: PathBuf,

    /// Specific files to rebuild; ignored with -a
    #[arg(value_name = "FILENAMES")]
    pub filenames: Vec<PathBuf>,

    /// Builder to use
    #[arg(short = 'b', long = "builder", value_name = "BUILDER")]
    pub builder: Option<String>,

    /// Make-mode builder (sphinx-build -M BUILDER SOURCEDIR BUILDDIR)
    #[arg(short = 'M', value_name = "BUILDER", hide = true)]
    pub make_mode: Option<String>,

    /// Write all files (default: only write new and changed files)
    #[arg(short = 'a', long = "write-all")]
    pub write_all: bool,

    /// Don't use a saved environment, always read all files
    #[arg(short = 'E', long = "fresh-env")]
    pub fresh_env: bool,

    /// Directory for doctree and environment files
    #[arg(short = 'd', long = "doctree-dir", value_name = "PATH")]
    pub doctree_dir: Option<PathBuf>,

    /// Build in parallel with N processes, or "auto"
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    pub jobs: Option<String>,

    /// Directory containing conf.py
    #[arg(short = 'c', long = "conf-dir", value_name = "PATH")]
    pub conf_dir: Option<PathBuf>,

    /// Use no configuration file, only the -D options
    #[arg(short = 'C', long = "isolated")]
    pub isolated: bool,

    /// Override a setting in the configuration file
    #[arg(short = 'D', long = "define", value_name = "setting=value")]
    pub define: Vec<String>,

    /// Pass a value into HTML templates
    #[arg(short = 'A', long = "html-define", value_name = "name=value")]
    pub html_define: Vec<String>,

    /// Define tag: include "only" blocks with TAG
    #[arg(short = 't', long = "tag", value_name = "TAG")]
    pub tag: Vec<String>,

    /// Nitpicky mode: warn about all missing references
    #[arg(short = 'n', long = "nitpicky")]
    pub nitpicky: bool,

    /// Do not emit colored output
    #[arg(short = 'N', long = "no-color")]
    pub no_color: bool,

    /// Emit colored output
    #[arg(long = "color")]
    pub color: bool,

    /// Increase verbosity (can be repeated)
    #[arg(short = 'v', long = "verbose", action = ArgAction::Count)]
    pub verbose: u8,

    /// No output on stdout, just warnings on stderr
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// No output at all, not even warnings
    #[arg(short = 'Q', long = "silent")]
    pub silent: bool,

    /// Write warnings and errors to the given file
    #[arg(short = 'w', long = "warning-file", value_name = "FILE")]
    pub warning_file: Option<PathBuf>,

    /// Turn warnings into errors
    #[arg(short = 'W', long = "fail-on-warning")]
    pub fail_on_warning: bool,

    /// With -W, keep going when getting warnings
    #[arg(long = "keep-going")]
    pub keep_going: bool,

    /// Show full traceback on exception
    #[arg(short = 'T', long = "show-traceback")]
    pub show_traceback: bool,

    /// Run Pdb on exception
    #[arg(short = 'P', long = "pdb")]
    pub pdb: bool,

    /// Raise an exception on warnings
    #[arg(long = "exception-on-warning")]
    pub exception_on_warning: bool,
}

impl BuildArgs {
    /// Builder sphinx-build will run: the make-mode builder, else -b
    pub fn builder(&self) -> &str {
        self.make_mode
            .as_deref()
            .or(self.builder.as_deref())
            .unwrap_or(DEFAULT_BUILDER)
    }

    /// Whether sphinx-build runs in make mode
    pub fn is_make_mode(&self) -> bool {
        self.make_mode.is_some()
    }
}

/// Options consumed by incrbuild itself
#[derive(Args, Debug, Clone, Default)]
#[command(next_help_heading = "Incrbuild options")]
pub struct IncrArgs {
    /// Directory that will be cached by CI [default: <temp dir>/incrbuild]
    #[arg(long = "cache", env = "INCRBUILD_CACHE", value_name = "PATH")]
    pub cache: Option<PathBuf>,

    /// Configuration file path
    #[arg(long = "incrbuild-config", env = "INCRBUILD_CONFIG", value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Result of parsing one command line
#[derive(Debug, Clone)]
pub struct ParsedArgs {
    /// The sphinx-build view of the command line
    pub build: BuildArgs,
    /// incrbuild's own options
    pub incr: IncrArgs,
    /// Arguments forwarded verbatim to sphinx-build
    pub passthrough: Vec<String>,
}

/// Full command: sphinx-build grammar plus incrbuild options, named after
/// the running program
pub fn command_for(app: &AppInfo) -> Command {
    // sphinx-build lets a repeated option replace the earlier value
    let cmd = IncrArgs::augment_args(BuildArgs::command())
        .name(app.name.clone())
        .bin_name(app.name.clone())
        .args_override_self(true);
    with_version(cmd, app)
}

/// Whether the command already declares a `--version` option
pub fn has_version_flag(cmd: &Command) -> bool {
    cmd.get_arguments().any(|arg| arg.get_long() == Some("version"))
}

/// Make `--version` print the program's own version, adding the option
/// when the command does not declare one
pub fn with_version(cmd: Command, app: &AppInfo) -> Command {
    let cmd = cmd.version(app.version.clone());
    if has_version_flag(&cmd) {
        return cmd;
    }
    cmd.disable_version_flag(true).arg(
        Arg::new("version")
            .long("version")
            .action(ArgAction::Version)
            .help("Show program's version number and exit"),
    )
}

/// Long options of [`IncrArgs`] as seen by the passthrough split
pub fn own_options() -> Vec<OwnOption> {
    IncrArgs::augment_args(Command::new("incrbuild"))
        .get_arguments()
        .filter_map(|arg| {
            arg.get_long().map(|long| OwnOption {
                long: long.to_string(),
                takes_value: arg.get_action().takes_values(),
            })
        })
        .collect()
}

/// Parse a full argv (program name first)
///
/// The whole line is validated against the combined grammar; the
/// passthrough list is the original arguments minus incrbuild's options.
pub fn parse_from<I, T>(app: &AppInfo, argv: I) -> Result<ParsedArgs, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let argv: Vec<String> = argv
        .into_iter()
        .map(|arg| arg.into().to_string_lossy().into_owned())
        .collect();

    let matches = command_for(app).try_get_matches_from(&argv)?;
    let build = BuildArgs::from_arg_matches(&matches)?;
    let incr = IncrArgs::from_arg_matches(&matches)?;

    let split = split_known(argv.get(1..).unwrap_or_default(), &own_options());

    Ok(ParsedArgs {
        build,
        incr,
        passthrough: split.passthrough,
    })
}

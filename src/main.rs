//! incrbuild - Incremental Sphinx builds in ephemeral CI environments
//!
//! CLI entry point: parses the sphinx-build command line and runs the
//! pipeline.

use console::style;
use incrbuild::cli::{parse_from, Invocation, ParsedArgs};
use incrbuild::config::schema::GeneralConfig;
use incrbuild::config::ConfigManager;
use incrbuild::{AppInfo, IncrResult, Pipeline};
use std::io::IsTerminal;
use std::process::ExitCode;
use tracing::{debug, info_span, Instrument};
use tracing_subscriber::EnvFilter;

/// Log filter override
const LOG_ENV: &str = "INCRBUILD_LOG";

#[tokio::main]
async fn main() -> ExitCode {
    let app = AppInfo::current();

    // Usage errors, --help and --version exit here with clap's own codes
    let parsed = match parse_from(&app, std::env::args_os()) {
        Ok(parsed) => parsed,
        Err(e) => e.exit(),
    };

    match run(app, parsed).await {
        Ok(code) => exit_code(code),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            exit_code(e.exit_code())
        }
    }
}

async fn run(app: AppInfo, parsed: ParsedArgs) -> IncrResult<i32> {
    let config_manager = match parsed.incr.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };

    let source = std::path::absolute(&parsed.build.sourcedir)
        .unwrap_or_else(|_| parsed.build.sourcedir.clone());
    let local_config_path = ConfigManager::find_local_config(&source);

    let config = config_manager
        .load_merged(local_config_path.as_deref())
        .await?;

    init_logging(&config.general);
    debug!("Config: {}", config_manager.path().display());
    if let Some(ref path) = local_config_path {
        debug!("Found local config: {}", path.display());
    }

    let invocation = Invocation::resolve(&parsed, &app, &config)?;
    debug!("{:?}", invocation);

    let span = info_span!("incrbuild");
    let outcome = Pipeline::from_config(app, config)
        .run(&invocation)
        .instrument(span)
        .await?;

    Ok(outcome.exit_code)
}

fn init_logging(general: &GeneralConfig) {
    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(&general.log_level));

    // stdout belongs to sphinx-build
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    if general.log_format == "json" {
        builder.json().init();
    } else {
        builder
            .with_ansi(std::io::stderr().is_terminal())
            .without_time()
            .init();
    }
}

/// Process exit status for an engine or error exit code
fn exit_code(code: i32) -> ExitCode {
    match u8::try_from(code & 0xff) {
        Ok(0) if code != 0 => ExitCode::FAILURE,
        Ok(byte) => ExitCode::from(byte),
        Err(_) => ExitCode::FAILURE,
    }
}

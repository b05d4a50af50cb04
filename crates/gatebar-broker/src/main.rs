//! Gatebar broker entry point.
//!
//! Starts the AppGate service if it is not already running and serves its
//! login status to status-bar clients until the service exits or a client
//! sends `exit-service`.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use gatebar_broker::server;
use gatebar_core::{Config, Directories};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Gatebar broker - AppGate service supervisor and status server
#[derive(Parser, Debug)]
#[command(name = "gatebar-broker")]
#[command(version, about, long_about = None)]
struct Args {
    /// Config file (defaults to `~/.config/gatebar/config.json`)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Verbose service logging, RPC traffic tracing and log output on stderr
    #[arg(long)]
    debug: bool,
}

/// Log to the append-only broker log file, and to stderr in debug mode.
fn setup_logging(log_file: &Path, debug: bool) -> Result<WorkerGuard> {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("gatebar={default_level}")));

    let dir = log_file.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let file_name = log_file
        .file_name()
        .with_context(|| format!("Invalid log file path {}", log_file.display()))?;

    let file_appender = tracing_appender::rolling::never(dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true);

    let stderr_layer = debug.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_line_number(true)
    });

    tracing_subscriber::registry()
        .with(file_layer)
        .with(stderr_layer)
        .with(filter)
        .init();

    if debug {
        eprintln!("Logging to: {} (and stderr)", log_file.display());
    }
    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .unwrap_or_else(|| Directories::new().config_file);
    let mut config = Config::load(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    config.debug |= args.debug;
    config.validate()?;

    let _guard = setup_logging(&config.broker_log_file, config.debug)?;

    info!("Starting gatebar broker...");
    server::run(&config).await?;
    info!("Gatebar broker stopped");
    Ok(())
}

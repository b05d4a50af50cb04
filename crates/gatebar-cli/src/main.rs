//! Gatebar status client
//!
//! Asks the broker one question and prints the answer formatted for polybar.
//! A broker that is not running shows the same glyph as a service error.

mod render;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use gatebar_core::{Config, Directories};
use gatebar_rpc::{GOODBYE, QueryCommand, QueryConnection, QueryError};

use crate::render::Palette;

#[derive(Parser)]
#[command(name = "gatebar")]
#[command(about = "Show the AppGate VPN status in polybar")]
#[command(version)]
#[command(after_help = "\
Examples:
  gatebar                 Print the current status glyph
  gatebar ping            Check that the broker is answering
  gatebar exit-service    Stop the AppGate service and the broker

Colours and icons can be overridden with APPGATE_COLOR_<STATE> and
APPGATE_ICON_<STATE>, where <STATE> is CONNECTED, DISCONNECTED, CONNECTING
or ERROR.")]
struct Cli {
    /// One of status, ping, goodbye, exit-service
    #[arg(default_value = "status")]
    command: String,

    /// Config file (defaults to `~/.config/gatebar/config.json`)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let Some(command) = QueryCommand::parse(&cli.command) else {
        println!("invalid command: {}", cli.command);
        return Ok(());
    };

    let config_path = cli
        .config
        .unwrap_or_else(|| Directories::new().config_file);
    let config = load_config(&config_path)?;

    let palette = Palette::from_env();
    match query(&config, command).await {
        Ok(Some(reply)) => println!("{}", palette.render(&reply)),
        Ok(None) => {}
        Err(_) => println!("{}", palette.render_unreachable()),
    }
    Ok(())
}

fn load_config(path: &Path) -> Result<Config> {
    let config =
        Config::load(path).with_context(|| format!("Failed to load {}", path.display()))?;
    config.validate()?;
    Ok(config)
}

/// Send `command`; returns the broker's reply unless the command has none.
async fn query(config: &Config, command: QueryCommand) -> Result<Option<String>, QueryError> {
    let mut conn =
        QueryConnection::connect(config.query.address(), config.query.key_bytes()).await?;

    conn.send_text(command.as_str()).await?;
    if !command.expects_reply() {
        return Ok(None);
    }

    let reply = conn.recv_text().await?.ok_or(QueryError::Closed)?;

    // The reply is already in hand, so a failed goodbye does not change the output
    if command != QueryCommand::Goodbye && conn.send_text(GOODBYE).await.is_ok() {
        let _ = conn.recv_text().await;
    }

    Ok(Some(reply))
}

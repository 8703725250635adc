//! voicebox command-line tool

mod config;
mod demo;
mod logging;

use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing::warn;
use voicebox_presence_core::{decode_presence, EventPayload, PresenceDecode, VERSION};

use crate::config::CliConfig;
use crate::demo::DemoArgs;

#[derive(Debug, Parser)]
#[command(name = "voicebox", version, about = "Presence-synchronised call sessions")]
struct Cli {
    /// Configuration file (defaults to <config dir>/voicebox/config.toml)
    #[arg(short, long, env = "VOICEBOX_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level, overrides the configuration file
    #[arg(long, env = "VOICEBOX_LOG_LEVEL", global = true)]
    log_level: Option<String>,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Run two phones against an in-memory call and exchange presence
    Demo(DemoArgs),
    /// Validate the configuration and print it with defaults filled in
    CheckConfig,
    /// Decode a custom event payload given as a JSON object
    Decode {
        /// e.g. '{"presence_detected": true}'
        payload: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = CliConfig::load(cli.config.as_deref())?;
    if let Some(level) = cli.log_level {
        config.logging = config.logging.with_level(level);
    }
    if cli.json_logs {
        config.logging = config.logging.with_json();
    }
    logging::setup_logging(&config.logging)?;
    logging::log_welcome("voicebox", VERSION);

    match cli.command {
        Command::Demo(args) => {
            tokio::select! {
                rows = demo::run(&config, &args) => demo::print_table("After teardown", &rows?),
                _ = tokio::signal::ctrl_c() => warn!("Interrupted"),
            }
        }
        Command::CheckConfig => check_config(&config)?,
        Command::Decode { payload } => decode(&payload)?,
    }
    Ok(())
}

fn check_config(config: &CliConfig) -> Result<()> {
    config.session.validate()?;
    println!("{}", "Configuration is valid".green());
    print!("{}", config.redacted().to_toml()?);
    Ok(())
}

fn decode(payload: &str) -> Result<()> {
    let value: serde_json::Value = serde_json::from_str(payload).context("Payload is not JSON")?;
    let payload: EventPayload = match value {
        serde_json::Value::Object(map) => map,
        _ => return Err(anyhow!("Payload must be a JSON object")),
    };

    match decode_presence(&payload) {
        PresenceDecode::Present(true) => println!("{}", "present".green()),
        PresenceDecode::Present(false) => println!("{}", "absent".yellow()),
        PresenceDecode::Skip(reason) => println!("{} ({reason:?})", "ignored".dimmed()),
    }
    Ok(())
}

//! Depot command-line client.
//!
//! Loads configuration, builds the configured storage backend and runs a
//! single operation, printing the result as JSON on stdout.

mod commands;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use commands::Command;
use depot_shared::{AppConfig, LogConfig};

#[derive(Debug, Parser)]
#[command(name = "depot", version, about, long_about = None)]
struct Cli {
    #[arg(short, long, value_name = "config file", help = "Path to config file")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

fn init_tracing(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| log.filter.as_str().into());
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries command output
    if log.json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let config_path = cli.config.as_deref().map(|p| p.to_string_lossy().into_owned());
    let config =
        AppConfig::load_from(config_path.as_deref()).context("failed to load configuration")?;

    init_tracing(&config.log);
    debug!(provider = config.storage.provider.name(), "configuration loaded");

    let storage = depot_core::connect(&config.storage)
        .await
        .context("failed to initialize storage backend")?;

    let output = cli.command.run(storage.as_ref()).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

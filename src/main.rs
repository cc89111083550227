//! Missile Go - Unified CLI
//!
//! Runs the session server, prints wire schemas, or checks a config file.

#![warn(missing_docs)]

use anyhow::Result;
use clap::Parser;
use missile_go::cli::{Cli, Command};
use missile_go::{ServerConfig, schemas, serve};
use std::path::PathBuf;
use tracing::{info, instrument};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file
    dotenvy::dotenv().ok();
    initialize_tracing();

    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, host, port } => run_server(config, host, port).await,
        Command::Schema => print_schema(),
        Command::CheckConfig { config } => check_config(config),
    }
}

/// Run the HTTP session server
#[instrument(skip_all)]
async fn run_server(
    config_path: Option<PathBuf>,
    host: Option<String>,
    port: Option<u16>,
) -> Result<()> {
    let mut config = match config_path {
        Some(path) => ServerConfig::from_file(&path)?,
        None => {
            info!("No config file given, using defaults");
            ServerConfig::default()
        }
    };
    if let Some(host) = host {
        config = config.with_host(host);
    }
    if let Some(port) = port {
        config = config.with_port(port);
    }

    info!(host = %config.host(), port = config.port(), "Starting Missile Go server");
    serve(config).await
}

fn print_schema() -> Result<()> {
    println!("{}", serde_json::to_string_pretty(&schemas())?);
    Ok(())
}

#[instrument(skip_all, fields(path = %path.display()))]
fn check_config(path: PathBuf) -> Result<()> {
    let config = ServerConfig::from_file(&path)?;
    println!("{}", toml::to_string_pretty(&config)?);
    info!("Config is valid");
    Ok(())
}

fn initialize_tracing() {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,missile_go=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

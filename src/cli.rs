//! Command-line interface for missile_go.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Missile Go - authoritative session server for live Go matches
#[derive(Parser, Debug)]
#[command(name = "missile_go")]
#[command(about = "Authoritative session server for live Missile Go matches", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the HTTP session server
    Serve {
        /// TOML config file; defaults apply when absent
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Host to bind to, overriding the config
        #[arg(long)]
        host: Option<String>,

        /// Port to bind to, overriding the config
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Print the JSON schema of every wire type
    Schema,

    /// Load and validate a config file, then print the effective values
    CheckConfig {
        /// TOML config file
        #[arg(short, long, default_value = "missile_go.toml")]
        config: PathBuf,
    },
}

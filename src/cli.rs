//! Command-line interface for the duet_games coordinator.

use clap::{Parser, Subcommand};

/// Duet Games - turn-based game session coordinator for paired players
#[derive(Parser, Debug)]
#[command(name = "duet_games")]
#[command(about = "Game session coordinator for paired players", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the coordinator service (HTTP surface plus janitor)
    Serve {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = "duet_games.toml")]
        config: std::path::PathBuf,

        /// Override the configured database path
        #[arg(long)]
        db_path: Option<String>,

        /// Override the configured bind port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Run a single janitor sweep and exit
    Sweep {
        /// Path to the TOML configuration file
        #[arg(short, long, default_value = "duet_games.toml")]
        config: std::path::PathBuf,
    },
}

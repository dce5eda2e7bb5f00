mod commands;

use std::path::PathBuf;

use anyhow::Result;
use calmirror_core::MirrorConfig;
use clap::{Parser, Subcommand};
use simplelog::{ColorChoice, Config as LogConfig, LevelFilter, TermLogger, TerminalMode};

#[derive(Parser)]
#[command(name = "calmirror")]
#[command(about = "Mirror external calendar sources into one destination calendar")]
struct Cli {
    /// Path to the config file (default: platform config dir)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one reconciliation cycle for every subscription
    Sync {
        /// Only sync this subscription (by id)
        #[arg(short, long)]
        subscription: Option<String>,
    },
    /// Run cycles on a fixed interval until terminated
    Daemon,
    /// Show last cycle outcome and mapping counts per subscription
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Warn
    };
    TermLogger::init(
        level,
        LogConfig::default(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    )?;

    let path = cli.config.unwrap_or_else(MirrorConfig::default_path);
    let config = MirrorConfig::load(&path)?;

    match cli.command {
        Commands::Sync { subscription } => {
            commands::sync::run(&config, subscription.as_deref()).await
        }
        Commands::Daemon => commands::daemon::run(&config).await,
        Commands::Status => commands::status::run(&config).await,
    }
}

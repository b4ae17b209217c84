//! Tilevault CLI - command-line interface
//!
//! Thin wrapper over the `tilevault` library: downloads the tiles
//! covering a region for offline use, removes cached tiles, and reports
//! cache statistics.

mod commands;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "tilevault",
    version,
    about = "Offline map tile cache manager",
    propagate_version = true
)]
struct Cli {
    /// Path to an INI config file. Defaults to the platform config
    /// directory when present.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Download the tiles covering a region for offline use.
    Download(commands::download::DownloadArgs),
    /// Remove cached tiles.
    Remove(commands::remove::RemoveArgs),
    /// Show cache statistics.
    Status(commands::status::StatusArgs),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("tilevault=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match commands::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {}", err);
            return ExitCode::FAILURE;
        }
    };

    let result = match cli.command {
        Command::Download(args) => commands::download::run(args, config).await,
        Command::Remove(args) => commands::remove::run(args, config).await,
        Command::Status(args) => commands::status::run(args, config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

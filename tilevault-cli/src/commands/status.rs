//! `tilevault status` - report cache statistics.

use clap::Args;
use console::style;

use tilevault::cache::TileStore;
use tilevault::config::VaultConfig;

use super::{format_bytes, open_store, CommandResult};

#[derive(Args)]
pub struct StatusArgs {
    /// Emit machine-readable JSON instead of the table.
    #[arg(long)]
    json: bool,
}

pub async fn run(args: StatusArgs, config: VaultConfig) -> CommandResult {
    let store = open_store(&config).await?;
    let stats = store.stats();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("{}", style("tile cache").bold());
    println!("  directory: {}", config.cache.directory.display());
    println!("  tiles:     {}", stats.entries);
    println!("  size:      {}", format_bytes(stats.size_bytes));
    match stats.budget_bytes {
        Some(budget) => println!("  budget:    {}", format_bytes(budget)),
        None => println!("  budget:    unbounded"),
    }
    Ok(())
}

//! `tilevault remove` - bulk-evict cached tiles.

use std::collections::BTreeSet;

use clap::Args;

use tilevault::config::VaultConfig;
use tilevault::coord::BoundingBox;
use tilevault::scheduler::RemovalScope;

use super::{
    build_scheduler, cancel_on_ctrlc, gate_for, open_store, print_outcome, watch_progress,
    CommandResult,
};

#[derive(Args)]
pub struct RemoveArgs {
    /// Remove every cached tile.
    #[arg(long, conflicts_with_all = ["south", "west", "north", "east"])]
    all: bool,

    /// Southern edge of the region to clear (degrees latitude).
    #[arg(long, allow_hyphen_values = true, requires_all = ["west", "north", "east"])]
    south: Option<f64>,

    /// Western edge of the region to clear (degrees longitude).
    #[arg(long, allow_hyphen_values = true)]
    west: Option<f64>,

    /// Northern edge of the region to clear (degrees latitude).
    #[arg(long, allow_hyphen_values = true)]
    north: Option<f64>,

    /// Eastern edge of the region to clear (degrees longitude).
    #[arg(long, allow_hyphen_values = true)]
    east: Option<f64>,

    /// Lowest zoom level to clear.
    #[arg(long, default_value_t = 0)]
    min_zoom: u8,

    /// Highest zoom level to clear.
    #[arg(long, default_value_t = 19)]
    max_zoom: u8,

    /// Skip the confirmation prompt.
    #[arg(long, short = 'y')]
    yes: bool,
}

pub async fn run(args: RemoveArgs, config: VaultConfig) -> CommandResult {
    let scope = if args.all {
        RemovalScope::All
    } else {
        match (args.south, args.west, args.north, args.east) {
            (Some(south), Some(west), Some(north), Some(east)) => {
                let bbox = BoundingBox::new(south, west, north, east)?;
                let zooms: BTreeSet<u8> = (args.min_zoom..=args.max_zoom).collect();
                RemovalScope::Region { bbox, zooms }
            }
            _ => return Err("pass either --all or all four region edges".into()),
        }
    };

    let store = open_store(&config).await?;
    let scheduler = build_scheduler(&config, store, gate_for(args.yes))?;

    let handle = scheduler.start_removal(scope).await?;
    cancel_on_ctrlc(scheduler, handle.clone());

    let outcome = watch_progress(&handle, "removing").await;
    print_outcome(&outcome);
    Ok(())
}

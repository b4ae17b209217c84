//! `tilevault download` - bulk-download a region for offline use.

use std::collections::BTreeSet;

use clap::Args;

use tilevault::config::VaultConfig;
use tilevault::coord::BoundingBox;

use super::{
    build_scheduler, cancel_on_ctrlc, gate_for, open_store, print_outcome, watch_progress,
    CommandResult,
};

#[derive(Args)]
pub struct DownloadArgs {
    /// Southern edge of the region (degrees latitude).
    #[arg(long, allow_hyphen_values = true)]
    south: f64,

    /// Western edge of the region (degrees longitude).
    #[arg(long, allow_hyphen_values = true)]
    west: f64,

    /// Northern edge of the region (degrees latitude).
    #[arg(long, allow_hyphen_values = true)]
    north: f64,

    /// Eastern edge of the region (degrees longitude).
    #[arg(long, allow_hyphen_values = true)]
    east: f64,

    /// Lowest zoom level to fetch.
    #[arg(long, default_value_t = 12)]
    min_zoom: u8,

    /// Highest zoom level to fetch.
    #[arg(long, default_value_t = 15)]
    max_zoom: u8,

    /// Skip the confirmation prompt.
    #[arg(long, short = 'y')]
    yes: bool,
}

pub async fn run(args: DownloadArgs, config: VaultConfig) -> CommandResult {
    let bbox = BoundingBox::new(args.south, args.west, args.north, args.east)?;
    let zooms: BTreeSet<u8> = (args.min_zoom..=args.max_zoom).collect();

    let store = open_store(&config).await?;
    let scheduler = build_scheduler(&config, store, gate_for(args.yes))?;

    let handle = scheduler.start_download(&bbox, &zooms)?;
    cancel_on_ctrlc(scheduler, handle.clone());

    let outcome = watch_progress(&handle, "downloading").await;
    print_outcome(&outcome);
    Ok(())
}

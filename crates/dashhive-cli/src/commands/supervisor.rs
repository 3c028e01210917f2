// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Fleet supervisor command.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use dashhive::config::ENV_DATA_DIR;
use dashhive::supervisor::{Supervisor, SupervisorConfig};
use dashhive::FleetPaths;

/// Run the fleet supervisor
#[derive(Args)]
pub struct SupervisorArgs {
    /// Data directory for tables, knowledge and logs
    #[arg(long, env = ENV_DATA_DIR, default_value = ".")]
    data_dir: PathBuf,

    /// Roster file (defaults to <data-dir>/shared/fleet.json)
    #[arg(long)]
    roster: Option<PathBuf>,
}

pub async fn run(args: SupervisorArgs) -> Result<()> {
    let paths = FleetPaths::new(&args.data_dir);
    let roster = args.roster.unwrap_or_else(|| paths.roster());
    info!(data_dir = %args.data_dir.display(), roster = %roster.display(), "starting supervisor");

    let config = SupervisorConfig::new(roster, paths);
    Supervisor::new(config).run().await?;
    Ok(())
}

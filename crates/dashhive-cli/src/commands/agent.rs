// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Single-agent command.
//!
//! Normally launched by the supervisor with identity in the environment;
//! stdin is the supervisor's control channel and stdout carries this
//! agent's outbound control messages, so all logging goes to stderr.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use dashhive::agent::Agent;
use dashhive::config::{ENV_AGENT_NAME, ENV_AGENT_ROLE};
use dashhive::world::sim::SimWorld;
use dashhive::{AgentConfig, FleetPaths, Role};

/// Run a single agent
#[derive(Args)]
pub struct AgentArgs {
    /// Agent name
    #[arg(long, env = ENV_AGENT_NAME)]
    name: String,

    /// Agent role (miner, builder, explorer, default)
    #[arg(long, env = ENV_AGENT_ROLE, default_value = "default")]
    role: String,

    /// Data directory; falls back to DASHHIVE_DATA_DIR, then the current
    /// directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// World server host
    #[arg(long, default_value = "127.0.0.1")]
    host: String,

    /// World server port
    #[arg(long, default_value_t = 25565)]
    port: u16,
}

pub async fn run(args: AgentArgs) -> Result<()> {
    let paths = match args.data_dir {
        Some(dir) => FleetPaths::new(dir),
        None => FleetPaths::from_env(),
    };

    let mut config = AgentConfig::new(args.name, Role::from_name(&args.role));
    config.host = args.host;
    config.port = args.port;
    info!(agent = %config.name, role = %config.role, "starting agent");

    // The built-in world is an in-process field of ore, trees and survey
    // targets; a networked world client plugs in through the same trait.
    let world = SimWorld::sample_field();
    let agent = Agent::new(config, paths, world)?;
    agent.run(tokio::io::stdin(), tokio::io::stdout()).await?;
    Ok(())
}

// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Data-directory scaffolding command.
//!
//! Creates the directory layout, seed Q-tables (global, one per role,
//! one per roster agent), an empty shared knowledge base and, when no
//! roster exists yet, a starter roster with one agent per role.

use std::path::PathBuf;

use anyhow::Result;
use clap::Args;
use tracing::info;

use dashhive::config::{load_roster, ENV_DATA_DIR};
use dashhive::knowledge::KnowledgeStore;
use dashhive::learning::{ensure_default_states, global_defaults, role_defaults, QTable, TableStore};
use dashhive::{AgentConfig, FleetPaths, Role};

/// Scaffold a data directory
#[derive(Args)]
pub struct InitArgs {
    /// Data directory to scaffold
    #[arg(long, env = ENV_DATA_DIR, default_value = ".")]
    data_dir: PathBuf,

    /// Roster file (defaults to <data-dir>/shared/fleet.json)
    #[arg(long)]
    roster: Option<PathBuf>,

    /// Overwrite existing seed tables
    #[arg(long)]
    force: bool,
}

fn starter_roster() -> Vec<AgentConfig> {
    vec![
        AgentConfig::new("Digger", Role::Miner),
        AgentConfig::new("Mason", Role::Builder),
        AgentConfig::new("Scout", Role::Explorer),
    ]
}

pub async fn run(args: InitArgs) -> Result<()> {
    let paths = FleetPaths::new(&args.data_dir);
    paths.ensure_dirs()?;

    if !paths.global_table().exists() || args.force {
        TableStore::flush(&paths.global_table(), &global_defaults())?;
        info!(path = %paths.global_table().display(), "seeded global table");
    }

    for role in [Role::Miner, Role::Builder, Role::Explorer, Role::Default] {
        let path = paths.role_table(role);
        if !path.exists() || args.force {
            TableStore::flush(&path, &role_defaults(role))?;
            info!(path = %path.display(), "seeded role table");
        }
    }

    let roster_path = args.roster.unwrap_or_else(|| paths.roster());
    if !roster_path.exists() {
        let roster = starter_roster();
        std::fs::write(&roster_path, serde_json::to_string_pretty(&roster)?)?;
        info!(path = %roster_path.display(), agents = roster.len(), "wrote starter roster");
    }

    for agent in load_roster(&roster_path) {
        let path = paths.individual_table(&agent.name);
        if !path.exists() || args.force {
            let mut table = QTable::new();
            ensure_default_states(&mut table);
            TableStore::flush(&path, &table)?;
            info!(agent = %agent.name, "seeded individual table");
        }
    }

    KnowledgeStore::initialize(&paths.knowledge_base())?;
    info!(data_dir = %args.data_dir.display(), "data directory ready");
    Ok(())
}

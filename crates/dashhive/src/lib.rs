// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! dashhive: a multi-agent fleet with shared tabular reinforcement
//! learning.
//!
//! A supervisor process spawns one child process per configured agent,
//! restarts any that exit, pings them for liveness and relays help
//! requests between them over a JSON-lines control channel. Each agent
//! runs a periodic decision cycle: derive a coarse state, pick an action
//! with an epsilon-greedy policy over a Q-table, execute it against the
//! world through the [`world::WorldClient`] boundary, then fold the
//! outcome back into the table. Individual, role and global tables are
//! persisted as JSON and blended at startup and on a fixed cycle cadence
//! so discoveries propagate across the fleet.

pub mod agent;
pub mod config;
pub mod constants;
pub mod error;
pub mod knowledge;
pub mod learning;
pub mod messages;
pub mod supervisor;
pub mod world;

pub use config::{AgentConfig, FleetPaths, Role};
pub use error::{HiveError, Result};

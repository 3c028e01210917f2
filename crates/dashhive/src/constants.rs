// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Fleet-wide tuning constants.
//!
//! Timing values are fixed wall-clock durations that trigger fallback
//! branches, not retries of the identical operation.

use std::time::Duration;

/// Q-learning step size (how much new information overrides old).
pub const LEARNING_RATE: f64 = 0.1;

/// Q-learning discount factor (importance of future rewards).
pub const DISCOUNT_FACTOR: f64 = 0.9;

/// Probability of choosing a random action over the greedy one.
pub const EXPLORATION_RATE: f64 = 0.3;

/// Merge weight for the global table.
pub const MERGE_WEIGHT_GLOBAL: f64 = 1.0;

/// Merge weight for the role table.
pub const MERGE_WEIGHT_ROLE: f64 = 0.3;

/// Merge weight for the agent's individual table.
pub const MERGE_WEIGHT_INDIVIDUAL: f64 = 0.2;

/// Reward applied when a task completes successfully.
pub const REWARD_SUCCESS: f64 = 10.0;

/// Reward applied when a task fails.
pub const REWARD_FAILURE: f64 = -10.0;

/// Decision cycles between table reload-and-merge passes.
pub const MERGE_EVERY_CYCLES: u64 = 50;

/// Interval between supervisor keepalive broadcasts.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5);

/// Delay before respawning an exited agent process.
pub const RESPAWN_DELAY: Duration = Duration::from_secs(10);

/// How long a requester waits for assistance before its fallback.
pub const HELP_WAIT: Duration = Duration::from_secs(30);

/// Watchdog tick.
pub const WATCHDOG_TICK: Duration = Duration::from_secs(1);

/// Interval between autonomous decision cycles.
pub const DECISION_INTERVAL: Duration = Duration::from_secs(5);

/// Inactivity window after which an idle agent is forced back to work.
pub const IDLE_THRESHOLD: Duration = Duration::from_secs(10);

/// Heartbeat cadence for liveness touches while connected.
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Timeout for a single path-finding operation.
pub const PATHFIND_TIMEOUT: Duration = Duration::from_secs(10);

/// Maximum block-search distance for gathering and assists.
pub const FIND_BLOCK_DISTANCE: u32 = 64;

/// How long the supervisor waits for children to flush on shutdown.
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

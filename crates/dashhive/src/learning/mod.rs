// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Tabular action-value learning: symbolic states, epsilon-greedy action
//! selection, one-step Q-updates, and three-tier table merging.
//!
//! Tables map a symbolic state key to per-action value estimates. Three
//! tiers exist on disk: the fleet-wide *global* table, a per-role table,
//! and each agent's *individual* table. Merging is an additive weighted
//! blend (`1.0·global + 0.3·role + 0.2·individual`), not a normalized
//! average — repeated merges without intervening learning re-add the
//! shared contributions on top of whatever the individual table already
//! holds. That confidence accumulation is intentional.

pub mod store;

use indexmap::IndexMap;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::Role;
use crate::constants::{
    DISCOUNT_FACTOR, EXPLORATION_RATE, LEARNING_RATE, MERGE_WEIGHT_GLOBAL, MERGE_WEIGHT_INDIVIDUAL,
    MERGE_WEIGHT_ROLE,
};

pub use store::TableStore;

/// Actions lazily seeded for a state on its first visit.
pub const DEFAULT_ACTIONS: [&str; 3] = ["explore", "gather", "idle"];

/// Symbolic label summarizing an agent's current situation.
///
/// Recomputed every decision cycle from observable condition; no history
/// is retained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Idle,
    Busy,
    LowResources,
    ConstructionNeeded,
    Exploring,
    Mining,
    Building,
}

impl AgentState {
    /// Key used for this state in persisted tables.
    pub fn table_key(&self) -> &'static str {
        match self {
            Self::Idle => "state_idle",
            Self::Busy => "state_busy",
            Self::LowResources => "state_low_resources",
            Self::ConstructionNeeded => "state_construction_needed",
            Self::Exploring => "state_exploring",
            Self::Mining => "state_mining",
            Self::Building => "state_building",
        }
    }
}

/// Per-action value estimates for one state, in first-seen order.
pub type ActionValues = IndexMap<String, f64>;

/// Action-value table: state key → (action → learned value).
///
/// Backed by an insertion-ordered map so greedy tie-breaks and the on-disk
/// JSON are deterministic.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QTable(pub IndexMap<String, ActionValues>);

impl QTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of states with entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the table has no entries.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value for a state/action pair, 0 when absent.
    pub fn value(&self, state_key: &str, action: &str) -> f64 {
        self.0
            .get(state_key)
            .and_then(|actions| actions.get(action))
            .copied()
            .unwrap_or(0.0)
    }

    /// Maximum action value for a state, 0 when the state is unknown or
    /// has no actions.
    pub fn max_value(&self, state_key: &str) -> f64 {
        self.0
            .get(state_key)
            .map(|actions| actions.values().copied().fold(f64::NEG_INFINITY, f64::max))
            .filter(|max| max.is_finite())
            .unwrap_or(0.0)
    }

    /// Set a state/action value, creating the state entry if needed.
    pub fn set(&mut self, state_key: &str, action: &str, value: f64) {
        self.0
            .entry(state_key.to_string())
            .or_default()
            .insert(action.to_string(), value);
    }

    /// Actions for a state, seeding the default action set on first visit.
    pub fn actions_for(&mut self, state: AgentState) -> &ActionValues {
        self.0.entry(state.table_key().to_string()).or_insert_with(|| {
            debug!(state = state.table_key(), "seeding default actions for new state");
            DEFAULT_ACTIONS
                .iter()
                .map(|action| ((*action).to_string(), 0.0))
                .collect()
        })
    }
}

/// Epsilon-greedy action selector.
///
/// With probability ε, picks uniformly among the actions currently defined
/// for the state; otherwise picks the maximum-valued action with ties
/// broken by first-seen order (no randomized tie-break).
#[derive(Debug)]
pub struct EpsilonGreedy {
    epsilon: f64,
    rng: StdRng,
}

impl Default for EpsilonGreedy {
    fn default() -> Self {
        Self::new()
    }
}

impl EpsilonGreedy {
    /// Policy with the fleet's fixed exploration rate.
    pub fn new() -> Self {
        Self {
            epsilon: EXPLORATION_RATE,
            rng: StdRng::from_entropy(),
        }
    }

    /// Deterministic policy for tests.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self {
            epsilon: EXPLORATION_RATE,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Choose an action for `state`, seeding defaults on first visit.
    ///
    /// Never fails: an unseen state always yields one of the seeded
    /// default actions.
    pub fn choose(&mut self, table: &mut QTable, state: AgentState) -> String {
        let actions = table.actions_for(state);
        if actions.is_empty() {
            // A state persisted with no actions (hand-edited table).
            return DEFAULT_ACTIONS[0].to_string();
        }

        if self.rng.gen::<f64>() < self.epsilon {
            let index = self.rng.gen_range(0..actions.len());
            actions
                .get_index(index)
                .map(|(action, _)| action.clone())
                .unwrap_or_else(|| DEFAULT_ACTIONS[0].to_string())
        } else {
            let mut best: Option<(&String, f64)> = None;
            for (action, value) in actions {
                // Strictly-greater keeps the first-seen action on ties.
                if best.map_or(true, |(_, max)| *value > max) {
                    best = Some((action, *value));
                }
            }
            best.map(|(action, _)| action.clone())
                .unwrap_or_else(|| DEFAULT_ACTIONS[0].to_string())
        }
    }
}

/// Apply a one-step Q-learning update and return the new value.
///
/// `Q(s,a) ← Q(s,a) + α·(r + γ·max_a' Q(s',a') − Q(s,a))`
pub fn update(
    table: &mut QTable,
    state: AgentState,
    action: &str,
    reward: f64,
    next_state: AgentState,
) -> f64 {
    let state_key = state.table_key();
    let current = table.value(state_key, action);
    let max_next = table.max_value(next_state.table_key());
    let updated = current + LEARNING_RATE * (reward + DISCOUNT_FACTOR * max_next - current);

    table.set(state_key, action, updated);
    debug!(
        state = state_key,
        action,
        reward,
        value = updated,
        "table updated"
    );
    updated
}

/// Merge the three table tiers into a fresh working table.
///
/// Pure function over immutable snapshots; persistence of the result is
/// the caller's job. Missing entries contribute 0. Merging only adds
/// weighted contributions — it never deletes a previously learned entry.
#[must_use]
pub fn merge(global: &QTable, role: &QTable, individual: &QTable) -> QTable {
    let mut merged = QTable::new();

    for (source, weight) in [
        (global, MERGE_WEIGHT_GLOBAL),
        (role, MERGE_WEIGHT_ROLE),
        (individual, MERGE_WEIGHT_INDIVIDUAL),
    ] {
        for (state_key, actions) in &source.0 {
            for (action, value) in actions {
                let current = merged.value(state_key, action);
                merged.set(state_key, action, current + value * weight);
            }
        }
    }

    merged
}

/// Insert canned priors for the baseline states when absent.
///
/// Guarantees `state_idle`, `state_mining` and `state_building` are never
/// empty after a merge.
pub fn ensure_default_states(table: &mut QTable) {
    let defaults: [(&str, &[(&str, f64)]); 3] = [
        ("state_idle", &[("explore", 0.5), ("gather", 0.5), ("craft", 0.0)]),
        ("state_mining", &[("dig", 0.7), ("explore", 0.2), ("gather", 0.1)]),
        (
            "state_building",
            &[("placeBlock", 0.6), ("explore", 0.3), ("gather", 0.1)],
        ),
    ];

    for (state_key, actions) in defaults {
        if !table.0.contains_key(state_key) {
            let entry: ActionValues = actions
                .iter()
                .map(|(action, value)| ((*action).to_string(), *value))
                .collect();
            table.0.insert(state_key.to_string(), entry);
        }
    }
}

/// Template table for a role, used when scaffolding a fresh data directory.
#[must_use]
pub fn role_defaults(role: Role) -> QTable {
    let mut table = QTable::new();
    match role {
        Role::Miner => {
            table.set("state_idle", "explore", 0.3);
            table.set("state_idle", "gather", 0.5);
            table.set("state_idle", "craft", 0.2);
            table.set("state_mining", "dig", 0.7);
            table.set("state_mining", "explore", 0.2);
            table.set("state_mining", "gather", 0.1);
        }
        Role::Builder => {
            table.set("state_idle", "explore", 0.4);
            table.set("state_idle", "gather", 0.4);
            table.set("state_idle", "craft", 0.2);
            table.set("state_building", "placeBlock", 0.6);
            table.set("state_building", "explore", 0.3);
            table.set("state_building", "gather", 0.1);
        }
        Role::Explorer => {
            table.set("state_idle", "explore", 0.7);
            table.set("state_idle", "gather", 0.2);
            table.set("state_idle", "craft", 0.1);
            table.set("state_exploring", "discover", 0.6);
            table.set("state_exploring", "gather", 0.3);
            table.set("state_exploring", "avoid", 0.1);
        }
        Role::Default => {
            table.set("state_idle", "explore", 0.5);
            table.set("state_idle", "gather", 0.3);
            table.set("state_idle", "craft", 0.2);
        }
    }
    table
}

/// Template for the fleet-wide global table.
#[must_use]
pub fn global_defaults() -> QTable {
    let mut table = QTable::new();
    table.set("state_idle", "explore", 0.4);
    table.set("state_idle", "gather", 0.3);
    table.set("state_idle", "craft", 0.3);
    table.set("state_working", "gather", 0.5);
    table.set("state_working", "explore", 0.2);
    table.set("state_working", "craft", 0.3);
    table
}

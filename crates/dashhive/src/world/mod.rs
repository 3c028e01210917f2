// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Boundary contract for the external world agent.
//!
//! The fleet never speaks the world protocol itself. Everything an agent
//! does in the shared world — movement, block interaction, crafting,
//! inventory — goes through [`WorldClient`], and the provider's internals
//! are out of scope. [`sim::SimWorld`] is a deterministic in-memory
//! implementation used for local runs and the test suite.

pub mod sim;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::Result;

/// A world position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    /// Create a position.
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    /// Offset by a delta.
    #[must_use]
    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}

/// A block observed in the world.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockDescriptor {
    /// Block kind name (`iron_ore`, `oak_log`, …).
    pub name: String,
    /// Block position.
    pub position: Position,
}

/// An inventory stack.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    /// Item name.
    pub name: String,
    /// Stack count.
    pub count: u32,
}

/// Outcome of a path-finding operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GotoOutcome {
    /// Reached the goal.
    Arrived,
    /// Gave up after the fixed timeout; fallback branch, not a retry.
    Timeout,
}

/// Lifecycle events emitted by the world connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    /// The agent's avatar entered the world.
    Spawned,
    /// The connection dropped.
    Disconnected,
    /// Provider-side error, connection still up.
    Error(String),
}

/// Capability contract the external world agent must satisfy.
///
/// All calls are suspension points in the agent's single-threaded
/// cooperative loop. Implementations report failures as
/// [`HiveError::World`](crate::HiveError::World); callers log, clear the
/// busy guard and return to the next decision cycle.
#[async_trait]
pub trait WorldClient: Send + Sync {
    /// Current position of the agent's avatar.
    async fn position(&self) -> Result<Position>;

    /// Travel toward `target`, giving up after `timeout`.
    async fn goto(&self, target: Position, timeout: Duration) -> Result<GotoOutcome>;

    /// Find up to `count` blocks whose name matches `predicate`, within
    /// `max_distance` of the avatar.
    async fn find_blocks(
        &self,
        predicate: &(dyn for<'a> Fn(&'a str) -> bool + Send + Sync),
        max_distance: u32,
        count: usize,
    ) -> Result<Vec<BlockDescriptor>>;

    /// Dig a block out of the world.
    async fn dig(&self, block: &BlockDescriptor) -> Result<()>;

    /// Place a block against `reference`, on the face given by
    /// `face_vector`.
    async fn place_block(&self, reference: &BlockDescriptor, face_vector: Position) -> Result<()>;

    /// Equip an item into a slot (`"hand"` for tools).
    async fn equip(&self, item: &str, slot: &str) -> Result<()>;

    /// Craft `quantity` of `recipe`, optionally at a crafting station.
    async fn craft(
        &self,
        recipe: &str,
        quantity: u32,
        station: Option<&BlockDescriptor>,
    ) -> Result<()>;

    /// Snapshot of the agent's inventory.
    async fn inventory_items(&self) -> Result<Vec<ItemStack>>;

    /// Next lifecycle event, if one is pending.
    async fn next_event(&self) -> Option<WorldEvent>;
}

/// Find the first block with exactly `name`.
pub async fn find_block_named(
    world: &dyn WorldClient,
    name: &str,
    max_distance: u32,
) -> Result<Option<BlockDescriptor>> {
    let target = name.to_string();
    let blocks = world
        .find_blocks(&move |candidate| candidate == target, max_distance, 1)
        .await?;
    Ok(blocks.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_offset_and_display() {
        let pos = Position::new(1.0, 64.0, -3.0).offset(0.5, 0.0, 3.0);
        assert_eq!(pos, Position::new(1.5, 64.0, 0.0));
        assert_eq!(pos.to_string(), "(1.5, 64.0, 0.0)");
    }
}

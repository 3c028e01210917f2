// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Deterministic in-memory world.
//!
//! Stands in for the external world agent during local runs and in the
//! test suite: a finite field of named blocks, instantaneous travel and a
//! flat inventory. Travel can be forced to time out to exercise the
//! fallback branches.

use std::collections::VecDeque;
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::{HiveError, Result};

use super::{BlockDescriptor, GotoOutcome, ItemStack, Position, WorldClient, WorldEvent};

#[derive(Debug, Default)]
struct SimState {
    position: Position,
    blocks: Vec<BlockDescriptor>,
    inventory: IndexMap<String, u32>,
    equipped: Option<String>,
    events: VecDeque<WorldEvent>,
    goto_times_out: bool,
}

/// In-memory [`WorldClient`] implementation.
#[derive(Debug, Default)]
pub struct SimWorld {
    inner: Mutex<SimState>,
}

impl SimWorld {
    /// Empty world at the origin.
    pub fn new() -> Self {
        Self::default()
    }

    /// World pre-populated with `blocks`, queuing a `Spawned` event.
    pub fn with_blocks(blocks: Vec<BlockDescriptor>) -> Self {
        let mut state = SimState {
            blocks,
            ..SimState::default()
        };
        state.events.push_back(WorldEvent::Spawned);
        Self {
            inner: Mutex::new(state),
        }
    }

    /// Small scattered field of logs, stone and ores for local runs.
    pub fn sample_field() -> Self {
        let mut blocks = Vec::new();
        for (i, name) in ["oak_log", "oak_log", "stone", "stone", "iron_ore", "coal_ore"]
            .iter()
            .enumerate()
        {
            let offset = (i as f64 + 1.0) * 8.0;
            blocks.push(BlockDescriptor {
                name: (*name).to_string(),
                position: Position::new(offset, 64.0, -offset),
            });
        }
        Self::with_blocks(blocks)
    }

    /// Force every subsequent `goto` to time out.
    pub async fn set_goto_times_out(&self, times_out: bool) {
        self.inner.lock().await.goto_times_out = times_out;
    }

    /// Grant items directly, bypassing gathering.
    pub async fn grant(&self, item: &str, count: u32) {
        let mut state = self.inner.lock().await;
        *state.inventory.entry(item.to_string()).or_insert(0) += count;
    }

    /// Queue a lifecycle event for the agent to observe.
    pub async fn push_event(&self, event: WorldEvent) {
        self.inner.lock().await.events.push_back(event);
    }

    /// Remaining blocks in the field.
    pub async fn remaining_blocks(&self) -> usize {
        self.inner.lock().await.blocks.len()
    }
}

#[async_trait]
impl WorldClient for SimWorld {
    async fn position(&self) -> Result<Position> {
        Ok(self.inner.lock().await.position)
    }

    async fn goto(&self, target: Position, _timeout: Duration) -> Result<GotoOutcome> {
        let mut state = self.inner.lock().await;
        if state.goto_times_out {
            return Ok(GotoOutcome::Timeout);
        }
        state.position = target;
        Ok(GotoOutcome::Arrived)
    }

    async fn find_blocks(
        &self,
        predicate: &(dyn for<'a> Fn(&'a str) -> bool + Send + Sync),
        _max_distance: u32,
        count: usize,
    ) -> Result<Vec<BlockDescriptor>> {
        let state = self.inner.lock().await;
        Ok(state
            .blocks
            .iter()
            .filter(|block| predicate(&block.name))
            .take(count)
            .cloned()
            .collect())
    }

    async fn dig(&self, block: &BlockDescriptor) -> Result<()> {
        let mut state = self.inner.lock().await;
        let index = state
            .blocks
            .iter()
            .position(|candidate| candidate == block)
            .ok_or_else(|| HiveError::World(format!("block {} is gone", block.name)))?;
        let dug = state.blocks.remove(index);
        *state.inventory.entry(dug.name.clone()).or_insert(0) += 1;
        debug!(block = %dug.name, "dug block");
        Ok(())
    }

    async fn place_block(&self, reference: &BlockDescriptor, face_vector: Position) -> Result<()> {
        let mut state = self.inner.lock().await;
        let item = state
            .equipped
            .clone()
            .ok_or_else(|| HiveError::World("nothing equipped to place".to_string()))?;
        let held = state.inventory.get_mut(&item);
        match held {
            Some(count) if *count > 0 => *count -= 1,
            _ => return Err(HiveError::World(format!("no {item} left to place"))),
        }
        let position = reference.position.offset(face_vector.x, face_vector.y, face_vector.z);
        state.blocks.push(BlockDescriptor {
            name: item,
            position,
        });
        Ok(())
    }

    async fn equip(&self, item: &str, _slot: &str) -> Result<()> {
        let mut state = self.inner.lock().await;
        if state.inventory.get(item).copied().unwrap_or(0) == 0 {
            return Err(HiveError::World(format!("{item} not in inventory")));
        }
        state.equipped = Some(item.to_string());
        Ok(())
    }

    async fn craft(
        &self,
        recipe: &str,
        quantity: u32,
        _station: Option<&BlockDescriptor>,
    ) -> Result<()> {
        let mut state = self.inner.lock().await;
        *state.inventory.entry(recipe.to_string()).or_insert(0) += quantity;
        Ok(())
    }

    async fn inventory_items(&self) -> Result<Vec<ItemStack>> {
        let state = self.inner.lock().await;
        Ok(state
            .inventory
            .iter()
            .filter(|(_, count)| **count > 0)
            .map(|(name, count)| ItemStack {
                name: name.clone(),
                count: *count,
            })
            .collect())
    }

    async fn next_event(&self) -> Option<WorldEvent> {
        self.inner.lock().await.events.pop_front()
    }
}

// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Role task implementations: gathering, exploration, building, crafting
//! and the single bounded assist.
//!
//! Each function is one bounded attempt. Looping, reward assignment and
//! the busy guard belong to the agent loop; a world failure propagates up,
//! gets logged there, and control returns on the next decision cycle.

use rand::Rng;
use tracing::{info, warn};

use crate::constants::{FIND_BLOCK_DISTANCE, PATHFIND_TIMEOUT};
use crate::error::Result;
use crate::knowledge::KnowledgeStore;
use crate::world::{find_block_named, BlockDescriptor, GotoOutcome, Position, WorldClient};

/// Ore and stone kinds miners target.
pub const MINING_TARGETS: [&str; 6] = [
    "stone",
    "iron_ore",
    "coal_ore",
    "gold_ore",
    "diamond_ore",
    "redstone_ore",
];

/// Log kinds gathered for wood.
pub const TREE_TARGETS: [&str; 6] = [
    "oak_log",
    "birch_log",
    "spruce_log",
    "jungle_log",
    "acacia_log",
    "dark_oak_log",
];

/// Valuable ores the explorer surveys for.
pub const SURVEY_TARGETS: [&str; 3] = ["diamond_ore", "emerald_ore", "gold_ore"];

/// Tool kind needed to extract a block, if any.
pub fn tool_for_block(block: &str) -> Option<&'static str> {
    match block {
        "stone" | "iron_ore" | "coal_ore" | "gold_ore" | "diamond_ore" | "redstone_ore" => {
            Some("pickaxe")
        }
        "dirt" | "grass" | "sand" => Some("shovel"),
        name if name.ends_with("_log") => Some("axe"),
        _ => None,
    }
}

/// Outcome of one bounded behavior attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskOutcome {
    /// The attempt did what it set out to do.
    Completed,
    /// Nothing suitable was found within range.
    NothingFound,
    /// Path-finding gave up; try again next cycle.
    PathTimeout,
    /// A required item is missing; the caller may request help for it.
    MissingResource(String),
}

impl TaskOutcome {
    /// Whether this outcome counts as task success for the reward.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Equip the best held tool for `block`, if one is in the inventory.
///
/// Missing tools are not fatal — digging proceeds bare-handed, slower in a
/// real world and identically in the simulated one.
async fn equip_best_tool(world: &dyn WorldClient, block: &str) -> Result<()> {
    let Some(kind) = tool_for_block(block) else {
        return Ok(());
    };
    let items = world.inventory_items().await?;
    let Some(tool) = items.iter().find(|item| item.name.ends_with(kind)) else {
        warn!(block, kind, "no suitable tool held, digging bare-handed");
        return Ok(());
    };
    world.equip(&tool.name, "hand").await
}

/// Travel to `block` and extract it, learning any unlocked recipe.
async fn travel_and_dig(
    world: &dyn WorldClient,
    knowledge: &mut KnowledgeStore,
    block: &BlockDescriptor,
) -> Result<TaskOutcome> {
    match world.goto(block.position, PATHFIND_TIMEOUT).await? {
        GotoOutcome::Arrived => {}
        GotoOutcome::Timeout => {
            warn!(block = %block.name, "pathfinding timed out");
            return Ok(TaskOutcome::PathTimeout);
        }
    }

    equip_best_tool(world, &block.name).await?;
    world.dig(block).await?;
    info!(block = %block.name, at = %block.position, "extracted block");
    knowledge.record_recipe_learned(&block.name)?;
    Ok(TaskOutcome::Completed)
}

/// One resource-gathering attempt.
///
/// With `target` set, only that block kind qualifies; otherwise any mining
/// or tree target does.
pub async fn gather_resources(
    world: &dyn WorldClient,
    knowledge: &mut KnowledgeStore,
    target: Option<&str>,
) -> Result<TaskOutcome> {
    let wanted: Vec<String> = match target {
        Some(name) => vec![name.to_string()],
        None => MINING_TARGETS
            .iter()
            .chain(TREE_TARGETS.iter())
            .map(|name| (*name).to_string())
            .collect(),
    };

    let found = world
        .find_blocks(
            &move |name| wanted.iter().any(|w| w == name),
            FIND_BLOCK_DISTANCE,
            1,
        )
        .await?;

    match found.into_iter().next() {
        Some(block) => travel_and_dig(world, knowledge, &block).await,
        None => {
            info!(target = target.unwrap_or("any"), "no gather targets in range");
            Ok(TaskOutcome::NothingFound)
        }
    }
}

/// One exploration attempt: move to a random nearby point and survey.
///
/// Discovered valuable ores are recorded into the shared knowledge base.
/// `NothingFound` means the survey came up empty and the caller may ask
/// the fleet for help.
pub async fn explore_and_survey<R: Rng>(
    world: &dyn WorldClient,
    knowledge: &mut KnowledgeStore,
    rng: &mut R,
) -> Result<TaskOutcome> {
    let here = world.position().await?;
    let target = Position::new(
        here.x + rng.gen_range(-50.0..50.0),
        here.y,
        here.z + rng.gen_range(-50.0..50.0),
    );

    match world.goto(target, PATHFIND_TIMEOUT).await? {
        GotoOutcome::Arrived => info!(at = %target, "moved to exploration point"),
        GotoOutcome::Timeout => {
            warn!("exploration pathfinding timed out");
            return Ok(TaskOutcome::PathTimeout);
        }
    }

    let mut discovered = 0usize;
    for resource in SURVEY_TARGETS {
        let blocks = world
            .find_blocks(&move |name| name == resource, 32, 5)
            .await?;
        for block in blocks {
            info!(resource, at = %block.position, "discovered resource");
            knowledge.record_resource_location(resource, block.position)?;
            discovered += 1;
        }
    }

    if discovered == 0 {
        warn!("survey found no valuable resources");
        return Ok(TaskOutcome::NothingFound);
    }
    Ok(TaskOutcome::Completed)
}

/// One pass over a structure plan (the agent passes the head of the
/// shared queue).
///
/// Already-occupied positions are skipped. A missing block item aborts the
/// pass and surfaces the item so the agent can request help for it.
pub async fn build_plan(
    world: &dyn WorldClient,
    plan: Option<&crate::knowledge::StructurePlan>,
) -> Result<TaskOutcome> {
    let Some(plan) = plan else {
        return Ok(TaskOutcome::NothingFound);
    };

    for planned in &plan.blocks {
        let position = plan.origin.offset(planned.x, planned.y, planned.z);

        let occupied = world
            .find_blocks(&|_| true, FIND_BLOCK_DISTANCE, usize::MAX)
            .await?
            .iter()
            .any(|block| block.position == position);
        if occupied {
            info!(at = %position, "block already present, skipping");
            continue;
        }

        match world.goto(position, PATHFIND_TIMEOUT).await? {
            GotoOutcome::Arrived => {}
            GotoOutcome::Timeout => return Ok(TaskOutcome::PathTimeout),
        }

        let held = world
            .inventory_items()
            .await?
            .iter()
            .any(|item| item.name == planned.block && item.count > 0);
        if !held {
            warn!(item = %planned.block, "required block not in inventory");
            return Ok(TaskOutcome::MissingResource(planned.block.clone()));
        }

        world.equip(&planned.block, "hand").await?;
        let reference = BlockDescriptor {
            name: "support".to_string(),
            position: position.offset(0.0, -1.0, 0.0),
        };
        world
            .place_block(&reference, Position::new(0.0, 1.0, 0.0))
            .await?;
        info!(item = %planned.block, at = %position, "placed block");
    }

    info!(structure = %plan.name, "construction completed");
    Ok(TaskOutcome::Completed)
}

/// Craft `item` from a known recipe, gathering one missing ingredient if
/// needed and using a crafting table when one is in range.
pub async fn craft_item(
    world: &dyn WorldClient,
    knowledge: &mut KnowledgeStore,
    item: &str,
) -> Result<TaskOutcome> {
    let Some(recipe) = knowledge.document().recipes.get(item).cloned() else {
        warn!(item, "recipe not known");
        return Ok(TaskOutcome::NothingFound);
    };

    let held = world.inventory_items().await?;
    for (ingredient, quantity) in &recipe.ingredients {
        let have = held
            .iter()
            .find(|stack| &stack.name == ingredient)
            .map(|stack| stack.count)
            .unwrap_or(0);
        if have < *quantity {
            info!(ingredient = %ingredient, "missing ingredient, gathering");
            let gathered = gather_resources(world, knowledge, Some(ingredient)).await?;
            if !gathered.is_success() {
                return Ok(TaskOutcome::MissingResource(ingredient.clone()));
            }
        }
    }

    let station = find_block_named(world, "crafting_table", FIND_BLOCK_DISTANCE).await?;
    world.craft(item, 1, station.as_ref()).await?;
    info!(item, "crafted item");
    Ok(TaskOutcome::Completed)
}

/// Exactly one bounded assist: locate the requested resource kind, travel
/// to it, extract it. The outcome is never reported back.
pub async fn assist_resource_gather(
    world: &dyn WorldClient,
    knowledge: &mut KnowledgeStore,
    resource: &str,
) -> Result<TaskOutcome> {
    match find_block_named(world, resource, FIND_BLOCK_DISTANCE).await? {
        Some(block) => {
            let outcome = travel_and_dig(world, knowledge, &block).await?;
            info!(resource, ?outcome, "assist attempt finished");
            Ok(outcome)
        }
        None => {
            warn!(resource, "requested resource not found, assist dropped");
            Ok(TaskOutcome::NothingFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::world::sim::SimWorld;
    use crate::world::Position;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn knowledge() -> (tempfile::TempDir, KnowledgeStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = KnowledgeStore::load(dir.path().join("knowledgeBase.json"));
        (dir, store)
    }

    fn block(name: &str, x: f64) -> BlockDescriptor {
        BlockDescriptor {
            name: name.to_string(),
            position: Position::new(x, 64.0, 0.0),
        }
    }

    #[test]
    fn test_tool_table() {
        assert_eq!(tool_for_block("iron_ore"), Some("pickaxe"));
        assert_eq!(tool_for_block("sand"), Some("shovel"));
        assert_eq!(tool_for_block("dark_oak_log"), Some("axe"));
        assert_eq!(tool_for_block("crafting_table"), None);
    }

    #[tokio::test]
    async fn test_gather_extracts_first_target() {
        let (_dir, mut knowledge) = knowledge();
        let world = SimWorld::with_blocks(vec![block("iron_ore", 8.0), block("stone", 16.0)]);

        let outcome = gather_resources(&world, &mut knowledge, None).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);
        assert_eq!(world.remaining_blocks().await, 1);
    }

    #[tokio::test]
    async fn test_gather_nothing_in_range() {
        let (_dir, mut knowledge) = knowledge();
        let world = SimWorld::new();
        let outcome = gather_resources(&world, &mut knowledge, Some("diamond_ore"))
            .await
            .unwrap();
        assert_eq!(outcome, TaskOutcome::NothingFound);
    }

    #[tokio::test]
    async fn test_gather_path_timeout_is_not_success() {
        let (_dir, mut knowledge) = knowledge();
        let world = SimWorld::with_blocks(vec![block("stone", 8.0)]);
        world.set_goto_times_out(true).await;

        let outcome = gather_resources(&world, &mut knowledge, None).await.unwrap();
        assert_eq!(outcome, TaskOutcome::PathTimeout);
        assert!(!outcome.is_success());
        assert_eq!(world.remaining_blocks().await, 1);
    }

    #[tokio::test]
    async fn test_survey_records_shared_resources() {
        let (_dir, mut knowledge) = knowledge();
        let world = SimWorld::with_blocks(vec![block("diamond_ore", 8.0)]);
        let mut rng = StdRng::seed_from_u64(3);

        let outcome = explore_and_survey(&world, &mut knowledge, &mut rng)
            .await
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);
        assert!(knowledge
            .document()
            .shared_resources
            .contains_key("diamond_ore"));
    }

    #[tokio::test]
    async fn test_survey_empty_reports_nothing_found() {
        let (_dir, mut knowledge) = knowledge();
        let world = SimWorld::with_blocks(vec![block("stone", 8.0)]);
        let mut rng = StdRng::seed_from_u64(3);

        let outcome = explore_and_survey(&world, &mut knowledge, &mut rng)
            .await
            .unwrap();
        assert_eq!(outcome, TaskOutcome::NothingFound);
    }

    #[tokio::test]
    async fn test_build_reports_missing_resource() {
        let world = SimWorld::new();
        let plan = crate::knowledge::StructurePlan {
            name: "wall".to_string(),
            origin: Position::new(0.0, 64.0, 0.0),
            blocks: vec![crate::knowledge::PlannedBlock {
                block: "stone".to_string(),
                x: 1.0,
                y: 0.0,
                z: 0.0,
            }],
        };

        let outcome = build_plan(&world, Some(&plan)).await.unwrap();
        assert_eq!(outcome, TaskOutcome::MissingResource("stone".to_string()));
    }

    #[tokio::test]
    async fn test_build_places_held_blocks() {
        let world = SimWorld::new();
        world.grant("stone", 2).await;
        let plan = crate::knowledge::StructurePlan {
            name: "wall".to_string(),
            origin: Position::new(0.0, 64.0, 0.0),
            blocks: vec![
                crate::knowledge::PlannedBlock {
                    block: "stone".to_string(),
                    x: 1.0,
                    y: 0.0,
                    z: 0.0,
                },
                crate::knowledge::PlannedBlock {
                    block: "stone".to_string(),
                    x: 2.0,
                    y: 0.0,
                    z: 0.0,
                },
            ],
        };

        let outcome = build_plan(&world, Some(&plan)).await.unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);
        assert_eq!(world.remaining_blocks().await, 2);
    }

    #[tokio::test]
    async fn test_assist_is_single_bounded_attempt() {
        let (_dir, mut knowledge) = knowledge();
        let world = SimWorld::with_blocks(vec![block("iron_ore", 8.0)]);

        let outcome = assist_resource_gather(&world, &mut knowledge, "iron_ore")
            .await
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);

        // Second request finds nothing; no retry happens internally.
        let outcome = assist_resource_gather(&world, &mut knowledge, "iron_ore")
            .await
            .unwrap();
        assert_eq!(outcome, TaskOutcome::NothingFound);
    }

    #[tokio::test]
    async fn test_craft_uses_known_recipe_and_gathers_missing() {
        let (_dir, mut knowledge) = knowledge();
        let mut recipe = crate::knowledge::Recipe::default();
        recipe.ingredients.insert("oak_log".to_string(), 1);
        knowledge
            .document_mut()
            .recipes
            .insert("wooden_pickaxe".to_string(), recipe);

        let world = SimWorld::with_blocks(vec![block("oak_log", 8.0)]);
        let outcome = craft_item(&world, &mut knowledge, "wooden_pickaxe")
            .await
            .unwrap();
        assert_eq!(outcome, TaskOutcome::Completed);

        let items = world.inventory_items().await.unwrap();
        assert!(items.iter().any(|item| item.name == "wooden_pickaxe"));
    }

    #[tokio::test]
    async fn test_craft_unknown_recipe() {
        let (_dir, mut knowledge) = knowledge();
        let world = SimWorld::new();
        let outcome = craft_item(&world, &mut knowledge, "anvil").await.unwrap();
        assert_eq!(outcome, TaskOutcome::NothingFound);
    }
}

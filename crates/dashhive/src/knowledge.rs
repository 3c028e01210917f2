// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Shared knowledge document: recipes, structure plans and last-known
//! resource locations.
//!
//! Any agent may mutate the document; persistence is a full synchronous
//! overwrite with no locking — the last flush wins. Unlike the Q-tables
//! there is no merge at this layer.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::Result;
use crate::world::Position;

/// Ingredient list for one craftable item.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Recipe {
    /// Ingredient name → required quantity.
    pub ingredients: IndexMap<String, u32>,
}

/// One block inside a structure plan, offset from the plan origin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannedBlock {
    /// Block/item name to place.
    pub block: String,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// A named, ordered block-placement plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StructurePlan {
    /// Structure name.
    pub name: String,
    /// World origin the block offsets apply to.
    pub origin: Position,
    /// Blocks in placement order.
    pub blocks: Vec<PlannedBlock>,
}

/// Last known location of a resource, with the time it was surveyed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceSighting {
    /// Where the resource was seen.
    pub position: Position,
    /// When the survey recorded it.
    #[serde(rename = "discoveredAt")]
    pub discovered_at: DateTime<Utc>,
}

impl ResourceSighting {
    /// A sighting at `position`, stamped now.
    pub fn at(position: Position) -> Self {
        Self {
            position,
            discovered_at: Utc::now(),
        }
    }
}

/// The shared knowledge document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KnowledgeBase {
    /// Item name → recipe.
    #[serde(default)]
    pub recipes: IndexMap<String, Recipe>,

    /// Pending structure plans, in build order.
    #[serde(default)]
    pub structures: Vec<StructurePlan>,

    /// Resource name → last known sighting.
    #[serde(default, rename = "sharedResources")]
    pub shared_resources: IndexMap<String, ResourceSighting>,
}

/// Fixed mapping from a gathered item to the recipe it unlocks.
///
/// Returns the recipe name an agent should learn after extracting `item`.
pub fn recipe_unlocked_by(item: &str) -> Option<&'static str> {
    match item {
        "cobblestone" => Some("furnace"),
        "oak_planks" => Some("crafting_table"),
        "iron_ingot" => Some("iron_pickaxe"),
        "diamond" => Some("diamond_pickaxe"),
        "stick" => Some("wooden_pickaxe"),
        _ => None,
    }
}

/// Loads, mutates and flushes the shared knowledge document.
#[derive(Debug, Clone)]
pub struct KnowledgeStore {
    path: PathBuf,
    document: KnowledgeBase,
}

impl KnowledgeStore {
    /// Load the document at `path`.
    ///
    /// Missing or corrupt input is logged and replaced by the documented
    /// empty default (`{recipes:{}, structures:[], sharedResources:{}}`);
    /// this never fails.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let document = Self::read_document(&path);
        Self { path, document }
    }

    fn read_document(path: &Path) -> KnowledgeBase {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "knowledge base not found, starting empty");
                return KnowledgeBase::default();
            }
            Err(err) => {
                error!(path = %path.display(), %err, "knowledge base unreadable, starting empty");
                return KnowledgeBase::default();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(document) => document,
            Err(err) => {
                error!(path = %path.display(), %err, "corrupt knowledge base, starting empty");
                KnowledgeBase::default()
            }
        }
    }

    /// Write the empty default document if the file is absent.
    pub fn initialize(path: &Path) -> Result<()> {
        if path.exists() {
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&KnowledgeBase::default())?;
        fs::write(path, json)?;
        info!(path = %path.display(), "initialized shared knowledge base");
        Ok(())
    }

    /// The live document.
    pub fn document(&self) -> &KnowledgeBase {
        &self.document
    }

    /// Mutable access to the live document; callers flush afterwards.
    pub fn document_mut(&mut self) -> &mut KnowledgeBase {
        &mut self.document
    }

    /// Reload the document from disk, replacing in-memory state.
    pub fn reload(&mut self) {
        self.document = Self::read_document(&self.path);
    }

    /// Record that gathering `item` unlocked a recipe.
    ///
    /// Looks up the fixed item→recipe mapping; when the matching template
    /// recipe already exists in the live document it is (re)written under
    /// its name and the document flushed synchronously. Returns the recipe
    /// name when one was recorded.
    pub fn record_recipe_learned(&mut self, item: &str) -> Result<Option<&'static str>> {
        let Some(recipe_name) = recipe_unlocked_by(item) else {
            return Ok(None);
        };
        let Some(template) = self.document.recipes.get(recipe_name).cloned() else {
            return Ok(None);
        };

        info!(item, recipe = recipe_name, "learned recipe");
        self.document
            .recipes
            .insert(recipe_name.to_string(), template);
        self.flush()?;
        Ok(Some(recipe_name))
    }

    /// Record the last known location of a resource and flush. Repeated
    /// sightings overwrite the entry with a fresh timestamp.
    pub fn record_resource_location(&mut self, resource: &str, position: Position) -> Result<()> {
        self.document
            .shared_resources
            .insert(resource.to_string(), ResourceSighting::at(position));
        self.flush()
    }

    /// Serialize the full document, overwriting prior contents.
    pub fn flush(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&self.document)?;
        fs::write(&self.path, json)?;
        Ok(())
    }
}

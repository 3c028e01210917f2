// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! On-disk persistence for action-value tables.
//!
//! Every table is a flat, human-readable JSON document that is fully
//! overwritten on each flush — no append log, no versioning. Concurrent
//! flushes from peer processes race and the last writer wins; that is
//! acceptable because tables are continuously reloaded and re-merged from
//! disk rather than held as a long-lived in-memory source of truth.

use std::fs;
use std::path::Path;

use tracing::{error, info, warn};

use crate::config::{FleetPaths, Role};
use crate::error::{HiveError, Result};

use super::{ensure_default_states, merge, QTable};

/// Loads and flushes the three table tiers for one data directory.
#[derive(Debug, Clone)]
pub struct TableStore {
    paths: FleetPaths,
}

impl TableStore {
    /// Create a store over a fleet data layout.
    pub fn new(paths: FleetPaths) -> Self {
        Self { paths }
    }

    /// The underlying path layout.
    pub fn paths(&self) -> &FleetPaths {
        &self.paths
    }

    /// Load a table from `path`.
    ///
    /// Missing or corrupt files are logged and replaced with an empty
    /// table; the next flush overwrites the bad file.
    pub fn load(path: &Path) -> QTable {
        let contents = match fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "table not found, starting empty");
                return QTable::new();
            }
            Err(err) => {
                error!(path = %path.display(), %err, "table not readable, starting empty");
                return QTable::new();
            }
        };

        match serde_json::from_str(&contents) {
            Ok(table) => table,
            Err(err) => {
                error!(path = %path.display(), %err, "corrupt table, starting empty");
                QTable::new()
            }
        }
    }

    /// Serialize `table` to `path`, fully overwriting prior contents.
    pub fn flush(path: &Path, table: &QTable) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)
                    .map_err(|err| HiveError::persistence(path, err.to_string()))?;
            }
        }
        let json = serde_json::to_string_pretty(table)
            .map_err(|err| HiveError::persistence(path, err.to_string()))?;
        fs::write(path, json).map_err(|err| HiveError::persistence(path, err.to_string()))?;
        Ok(())
    }

    /// Load an agent's individual table.
    pub fn load_individual(&self, agent: &str) -> QTable {
        Self::load(&self.paths.individual_table(agent))
    }

    /// Load a role table.
    pub fn load_role(&self, role: Role) -> QTable {
        Self::load(&self.paths.role_table(role))
    }

    /// Load the global table.
    pub fn load_global(&self) -> QTable {
        Self::load(&self.paths.global_table())
    }

    /// Flush an agent's individual table.
    pub fn flush_individual(&self, agent: &str, table: &QTable) -> Result<()> {
        Self::flush(&self.paths.individual_table(agent), table)
    }

    /// Reload all three tiers from disk and produce the agent's fresh
    /// working table: weighted merge plus baseline-state seeding.
    ///
    /// The caller owns persisting the result; this function never writes.
    pub fn merged_for(&self, agent: &str, role: Role) -> QTable {
        let global = self.load_global();
        let role_table = self.load_role(role);
        let individual = self.load_individual(agent);

        let mut merged = merge(&global, &role_table, &individual);
        ensure_default_states(&mut merged);
        info!(
            agent,
            role = %role,
            states = merged.len(),
            "merged table tiers"
        );
        merged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, TableStore) {
        let dir = tempfile::tempdir().unwrap();
        let paths = FleetPaths::new(dir.path());
        paths.ensure_dirs().unwrap();
        (dir, TableStore::new(paths))
    }

    #[test]
    fn test_flush_then_load_round_trip() {
        let (_dir, store) = store();
        let mut table = QTable::new();
        table.set("state_idle", "gather", 1.25);

        store.flush_individual("Sniffer", &table).unwrap();
        let loaded = store.load_individual("Sniffer");
        assert_eq!(loaded, table);
    }

    #[test]
    fn test_load_missing_is_empty() {
        let (_dir, store) = store();
        assert!(store.load_individual("Nobody").is_empty());
        assert!(store.load_global().is_empty());
    }

    #[test]
    fn test_load_corrupt_is_empty_and_recoverable() {
        let (_dir, store) = store();
        let path = store.paths().individual_table("Wrench");
        fs::write(&path, "{\"state_idle\": [oops").unwrap();

        assert!(store.load_individual("Wrench").is_empty());

        // The next flush overwrites the corrupt file.
        let mut table = QTable::new();
        table.set("state_idle", "explore", 0.5);
        store.flush_individual("Wrench", &table).unwrap();
        assert_eq!(store.load_individual("Wrench"), table);
    }

    #[test]
    fn test_merged_for_blends_tiers_and_seeds_defaults() {
        let (_dir, store) = store();

        let mut global = QTable::new();
        global.set("state_idle", "gather", 1.0);
        TableStore::flush(&store.paths().global_table(), &global).unwrap();

        let mut role = QTable::new();
        role.set("state_idle", "gather", 2.0);
        TableStore::flush(&store.paths().role_table(Role::Miner), &role).unwrap();

        let mut individual = QTable::new();
        individual.set("state_idle", "gather", 5.0);
        store.flush_individual("Digger", &individual).unwrap();

        let merged = store.merged_for("Digger", Role::Miner);
        assert!((merged.value("state_idle", "gather") - 2.6).abs() < 1e-12);
        assert!(merged.0.contains_key("state_mining"));
        assert!(merged.0.contains_key("state_building"));
    }
}

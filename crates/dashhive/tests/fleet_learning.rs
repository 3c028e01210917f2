// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! End-to-end learning flow over a shared data directory: agents learn
//! individually, knowledge and table values propagate through the shared
//! files, and corrupt state recovers without halting the fleet.

use dashhive::agent::Agent;
use dashhive::knowledge::KnowledgeStore;
use dashhive::learning::{ensure_default_states, merge, update, AgentState, QTable, TableStore};
use dashhive::world::sim::SimWorld;
use dashhive::world::{BlockDescriptor, Position};
use dashhive::{AgentConfig, FleetPaths, Role};

fn fleet_dir() -> (tempfile::TempDir, FleetPaths) {
    let dir = tempfile::tempdir().unwrap();
    let paths = FleetPaths::new(dir.path());
    paths.ensure_dirs().unwrap();
    (dir, paths)
}

fn ore_world() -> SimWorld {
    SimWorld::with_blocks(vec![BlockDescriptor {
        name: "iron_ore".to_string(),
        position: Position::new(10.0, 64.0, 10.0),
    }])
}

#[tokio::test]
async fn test_learning_propagates_between_agents_through_global_table() {
    let (_dir, paths) = fleet_dir();
    let store = TableStore::new(paths.clone());

    // Digger learns that gathering while idle pays off.
    let mut table = QTable::new();
    for _ in 0..20 {
        update(
            &mut table,
            AgentState::Idle,
            "gather",
            10.0,
            AgentState::Idle,
        );
    }
    store.flush_individual("Digger", &table).unwrap();
    let learned = table.value("state_idle", "gather");
    assert!(learned > 5.0);

    // A fleet sync promotes the individual table to the global tier.
    TableStore::flush(&paths.global_table(), &store.load_individual("Digger")).unwrap();

    // A fresh agent on the same data directory inherits the value at its
    // startup merge, on top of its own seeded defaults.
    let mason = Agent::new(
        AgentConfig::new("Mason", Role::Builder),
        paths,
        SimWorld::new(),
    )
    .unwrap();
    let inherited = mason.table().value("state_idle", "gather");
    assert!(
        (inherited - learned).abs() < 1e-9,
        "global tier carries full weight"
    );
    assert!(mason.table().0.contains_key("state_building"));
}

#[tokio::test]
async fn test_corrupt_individual_table_recovers_at_startup() {
    let (_dir, paths) = fleet_dir();
    std::fs::write(paths.individual_table("Digger"), "{broken").unwrap();

    let digger = Agent::new(
        AgentConfig::new("Digger", Role::Miner),
        paths.clone(),
        SimWorld::new(),
    )
    .unwrap();

    // Startup replaced the corrupt file with the merged, seeded table.
    let store = TableStore::new(paths);
    let on_disk = store.load_individual("Digger");
    assert_eq!(&on_disk, digger.table());
    assert!(on_disk.0.contains_key("state_mining"));
}

#[tokio::test]
async fn test_decision_cycles_persist_learning() {
    let (_dir, paths) = fleet_dir();
    let mut digger = Agent::new(
        AgentConfig::new("Digger", Role::Miner),
        paths.clone(),
        ore_world(),
    )
    .unwrap();

    let seeded = digger.table().clone();
    for _ in 0..3 {
        digger.decision_cycle().await.unwrap();
    }
    assert_ne!(digger.table(), &seeded);

    // A restart re-merges the flushed individual tier at its blend weight
    // rather than adopting it verbatim.
    let reborn = Agent::new(
        AgentConfig::new("Digger", Role::Miner),
        paths,
        SimWorld::new(),
    )
    .unwrap();
    let mut expected = merge(&QTable::new(), &QTable::new(), digger.table());
    ensure_default_states(&mut expected);
    assert_eq!(reborn.table(), &expected);
}

#[tokio::test]
async fn test_knowledge_flows_between_agents() {
    let (_dir, paths) = fleet_dir();

    // The peer opens the document before the sighting exists.
    let mut digger = KnowledgeStore::load(paths.knowledge_base());
    assert!(digger.document().shared_resources.is_empty());

    let mut scout = KnowledgeStore::load(paths.knowledge_base());
    scout
        .record_resource_location("diamond_ore", Position::new(120.0, 12.0, -40.0))
        .unwrap();

    // A reload picks up what the peer flushed.
    digger.reload();
    let sighting = digger
        .document()
        .shared_resources
        .get("diamond_ore")
        .expect("sighting shared through the document");
    assert!((sighting.position.x - 120.0).abs() < f64::EPSILON);
}

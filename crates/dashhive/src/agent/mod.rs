// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Per-agent runtime: the single-task cooperative decision loop.
//!
//! Everything an agent does runs on one task; world calls and timers are
//! the only suspension points, so in-memory state is never mutated
//! concurrently and the busy guard stays advisory. The loop multiplexes
//! the decision interval, the 1-second watchdog tick, the heartbeat and
//! the supervisor's control channel with `tokio::select!`.

pub mod behavior;
pub mod help;
pub mod watchdog;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{AsyncBufReadExt, AsyncWrite, BufReader};
use tracing::{error, info, warn};

use crate::config::{AgentConfig, FleetPaths};
use crate::constants::{
    DECISION_INTERVAL, HEARTBEAT_INTERVAL, MERGE_EVERY_CYCLES, REWARD_FAILURE, REWARD_SUCCESS,
    WATCHDOG_TICK,
};
use crate::error::Result;
use crate::knowledge::KnowledgeStore;
use crate::learning::{update, AgentState, EpsilonGreedy, QTable, TableStore};
use crate::messages::{self, AgentMessage, HelpRequest, HelpType, SupervisorMessage};
use crate::world::{WorldClient, WorldEvent};

use behavior::TaskOutcome;
use help::HelpState;
use watchdog::{Activity, ActivityWatchdog, BusyGuard};

/// Number of log items below which resources count as low.
const LOW_RESOURCE_THRESHOLD: u32 = 10;

/// One agent's runtime state over a world connection.
pub struct Agent<W: WorldClient> {
    config: AgentConfig,
    store: TableStore,
    knowledge: KnowledgeStore,
    table: QTable,
    policy: EpsilonGreedy,
    guard: BusyGuard,
    watchdog: ActivityWatchdog,
    help: HelpState,
    world: W,
    rng: StdRng,
    cycles: u64,
    outbox: Vec<AgentMessage>,
    shutting_down: bool,
}

impl<W: WorldClient> Agent<W> {
    /// Set up an agent: directory layout, knowledge document, and the
    /// startup table merge (flushed immediately).
    pub fn new(config: AgentConfig, paths: FleetPaths, world: W) -> Result<Self> {
        paths.ensure_dirs()?;
        let knowledge = KnowledgeStore::load(paths.knowledge_base());
        let store = TableStore::new(paths);

        let mut agent = Self {
            config,
            store,
            knowledge,
            table: QTable::new(),
            policy: EpsilonGreedy::new(),
            guard: BusyGuard::default(),
            watchdog: ActivityWatchdog::new(),
            help: HelpState::new(),
            world,
            rng: StdRng::from_entropy(),
            cycles: 0,
            outbox: Vec::new(),
            shutting_down: false,
        };
        agent.merge_and_flush()?;
        info!(agent = %agent.config.name, role = %agent.config.role, "agent initialized");
        Ok(agent)
    }

    /// Name of this agent.
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The live working table.
    pub fn table(&self) -> &QTable {
        &self.table
    }

    /// Whether the busy guard is held.
    pub fn is_busy(&self) -> bool {
        self.guard.is_busy()
    }

    /// Reload all three tiers, merge, seed defaults, and flush the result
    /// as the new individual table.
    fn merge_and_flush(&mut self) -> Result<()> {
        self.table = self
            .store
            .merged_for(&self.config.name, self.config.role);
        self.store.flush_individual(&self.config.name, &self.table)
    }

    /// Derive the symbolic state from observable condition. Memoryless:
    /// nothing from previous cycles is consulted except the busy guard.
    async fn derive_state(&mut self) -> Result<AgentState> {
        if self.guard.is_busy() {
            return Ok(AgentState::Busy);
        }

        let items = self.world.inventory_items().await?;
        let logs: u32 = items
            .iter()
            .filter(|item| item.name.ends_with("_log"))
            .map(|item| item.count)
            .sum();
        if logs < LOW_RESOURCE_THRESHOLD {
            return Ok(AgentState::LowResources);
        }

        if !self.knowledge.document().structures.is_empty() {
            return Ok(AgentState::ConstructionNeeded);
        }

        Ok(AgentState::Idle)
    }

    /// Run one decision cycle: derive state, pick an action, execute it
    /// under the busy guard, apply the reward and flush the table.
    pub async fn decision_cycle(&mut self) -> Result<()> {
        self.cycles += 1;
        if self.cycles % MERGE_EVERY_CYCLES == 0 {
            self.merge_and_flush()?;
        }

        if self.guard.is_busy() {
            return Ok(());
        }
        let state = self.derive_state().await?;
        if !self.guard.try_acquire() {
            return Ok(());
        }
        let action = self.policy.choose(&mut self.table, state);

        let outcome = self.execute_action(&action, None).await;
        self.guard.release();
        self.watchdog.touch(Activity::Action);

        let outcome = match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                // World failures are retry-next-cycle, not immediate retry.
                error!(agent = %self.config.name, %err, "action failed");
                TaskOutcome::NothingFound
            }
        };

        self.apply_outcome(state, &action, &outcome).await?;

        if let TaskOutcome::MissingResource(resource) = &outcome {
            self.request_help(HelpRequest::resource_gather(resource.clone()));
        } else if outcome == TaskOutcome::NothingFound && action != "idle" {
            self.request_help(HelpRequest::resource_gather("any_valuable_ore"));
        }

        Ok(())
    }

    /// Flat reward, TD update against the freshly derived next state, and
    /// a synchronous individual-table flush (loss window: one update).
    async fn apply_outcome(
        &mut self,
        state: AgentState,
        action: &str,
        outcome: &TaskOutcome,
    ) -> Result<()> {
        let reward = if outcome.is_success() {
            REWARD_SUCCESS
        } else {
            REWARD_FAILURE
        };
        let next_state = self.derive_state().await.unwrap_or(AgentState::Idle);
        update(&mut self.table, state, action, reward, next_state);
        self.store.flush_individual(&self.config.name, &self.table)
    }

    /// Dispatch an action name to its behavior. Unknown actions fall back
    /// to exploration.
    async fn execute_action(&mut self, action: &str, target: Option<&str>) -> Result<TaskOutcome> {
        match action {
            "gather" | "dig" => {
                behavior::gather_resources(&self.world, &mut self.knowledge, target).await
            }
            "explore" | "discover" | "avoid" => {
                behavior::explore_and_survey(&self.world, &mut self.knowledge, &mut self.rng).await
            }
            "craft" => behavior::craft_item(&self.world, &mut self.knowledge, "wooden_pickaxe").await,
            "placeBlock" => {
                let plan = self.knowledge.document().structures.first().cloned();
                let outcome = behavior::build_plan(&self.world, plan.as_ref()).await?;
                if outcome.is_success() {
                    self.knowledge.document_mut().structures.remove(0);
                    self.knowledge.flush()?;
                }
                Ok(outcome)
            }
            "idle" => Ok(TaskOutcome::Completed),
            other => {
                warn!(action = other, "no behavior for action, exploring instead");
                behavior::explore_and_survey(&self.world, &mut self.knowledge, &mut self.rng).await
            }
        }
    }

    /// Queue a help request for the supervisor and start the wait window.
    fn request_help(&mut self, request: HelpRequest) {
        if self.help.begin(request.clone()) {
            self.outbox.push(AgentMessage::RequestHelp(request));
        }
    }

    /// Handle one supervisor control message.
    pub async fn handle_message(&mut self, message: SupervisorMessage) -> Result<()> {
        match message {
            SupervisorMessage::KeepAlive => {
                // Liveness ping only. It does not count as agent activity:
                // the watchdog tracks what the agent itself does, and a 5s
                // ping cadence would otherwise mask every stall.
                tracing::debug!(agent = %self.config.name, "keepalive received");
                Ok(())
            }
            SupervisorMessage::Assist(request) => self.handle_assist(request).await,
            SupervisorMessage::Shutdown => {
                info!(agent = %self.config.name, "shutdown instruction received");
                self.shutting_down = true;
                self.emergency_flush();
                Ok(())
            }
        }
    }

    /// Attempt exactly one bounded assist; no outcome is reported back.
    async fn handle_assist(&mut self, request: HelpRequest) -> Result<()> {
        match request.help_type {
            HelpType::ResourceGather => {}
        }
        if !self.guard.try_acquire() {
            warn!(agent = %self.config.name, "busy, assist instruction dropped");
            return Ok(());
        }

        let result = behavior::assist_resource_gather(
            &self.world,
            &mut self.knowledge,
            &request.resource,
        )
        .await;
        self.guard.release();
        self.watchdog.touch(Activity::WorldInteraction);

        if let Err(err) = result {
            error!(agent = %self.config.name, %err, "assist attempt failed");
        }
        Ok(())
    }

    /// The 1-second tick: world lifecycle events, the help wait window,
    /// and the inactivity check.
    pub async fn watchdog_tick(&mut self) -> Result<()> {
        while let Some(event) = self.world.next_event().await {
            match event {
                WorldEvent::Spawned => {
                    info!(agent = %self.config.name, "spawned into the world");
                    self.watchdog.touch(Activity::Movement);
                }
                WorldEvent::Disconnected => {
                    warn!(agent = %self.config.name, "world connection dropped");
                }
                WorldEvent::Error(reason) => {
                    error!(agent = %self.config.name, reason, "world error");
                }
            }
        }

        if let Some(request) = self.help.take_due_fallback(self.guard) {
            self.run_help_fallback(&request).await;
            return Ok(());
        }

        if self.watchdog.is_stalled(self.guard) {
            info!(agent = %self.config.name, "idle past threshold, forcing default task");
            self.force_default_task().await;
        }
        Ok(())
    }

    /// The unconditional post-window fallback: the agent's own gathering
    /// routine, regardless of whether assistance ever arrived.
    async fn run_help_fallback(&mut self, request: &HelpRequest) {
        if !self.guard.try_acquire() {
            return;
        }
        let target = match request.help_type {
            HelpType::ResourceGather => Some(request.resource.as_str()),
        };
        // A named target the fleet could not supply either is widened to
        // any gatherable resource.
        let target = target.filter(|name| *name != "any_valuable_ore");
        let result = behavior::gather_resources(&self.world, &mut self.knowledge, target).await;
        self.guard.release();
        self.watchdog.touch(Activity::Action);
        if let Err(err) = result {
            error!(agent = %self.config.name, %err, "help fallback failed");
        }
    }

    /// Watchdog-forced default task: one gather attempt.
    async fn force_default_task(&mut self) {
        if !self.guard.try_acquire() {
            return;
        }
        let result = behavior::gather_resources(&self.world, &mut self.knowledge, None).await;
        self.guard.release();
        self.watchdog.touch(Activity::Action);
        if let Err(err) = result {
            error!(agent = %self.config.name, %err, "forced task failed");
        }
    }

    /// Best-effort flush of the individual table; used on shutdown and on
    /// the uncaught-error path to minimize learning loss.
    pub fn emergency_flush(&self) {
        if let Err(err) = self.store.flush_individual(&self.config.name, &self.table) {
            error!(agent = %self.config.name, %err, "emergency table flush failed");
        }
    }

    /// Drain queued outbound control messages.
    fn take_outbox(&mut self) -> Vec<AgentMessage> {
        std::mem::take(&mut self.outbox)
    }

    /// Drive the agent until shutdown.
    ///
    /// `control` carries supervisor messages (the process's stdin);
    /// `outbound` carries this agent's control messages (stdout). An error
    /// escaping the loop triggers an emergency flush before it propagates.
    pub async fn run<R, Wr>(mut self, control: R, mut outbound: Wr) -> Result<()>
    where
        R: tokio::io::AsyncRead + Unpin,
        Wr: AsyncWrite + Unpin,
    {
        let mut lines = BufReader::new(control).lines();
        let mut decide = tokio::time::interval(DECISION_INTERVAL);
        let mut tick = tokio::time::interval(WATCHDOG_TICK);
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);

        let result = loop {
            if self.shutting_down {
                break Ok(());
            }

            let step = tokio::select! {
                _ = decide.tick() => self.decision_cycle().await,
                _ = tick.tick() => self.watchdog_tick().await,
                _ = heartbeat.tick() => {
                    self.watchdog.touch(Activity::Heartbeat);
                    Ok(())
                }
                line = lines.next_line() => match line {
                    Ok(Some(line)) => match messages::parse_supervisor_line(&line) {
                        Ok(message) => self.handle_message(message).await,
                        Err(err) => {
                            warn!(agent = %self.config.name, %err, "unparsable control line");
                            Ok(())
                        }
                    },
                    // Control channel closed: the supervisor is gone.
                    Ok(None) => {
                        info!(agent = %self.config.name, "control channel closed, exiting");
                        self.shutting_down = true;
                        self.emergency_flush();
                        Ok(())
                    }
                    Err(err) => Err(err.into()),
                },
            };

            if let Err(err) = step {
                break Err(err);
            }

            for message in self.take_outbox() {
                if let Err(err) = messages::write_line(&mut outbound, &message).await {
                    // Fire-and-forget: a lost request just means the 30s
                    // window elapses with no assist.
                    warn!(agent = %self.config.name, %err, "failed to send control message");
                }
            }
        };

        if result.is_err() {
            self.emergency_flush();
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Role;
    use crate::world::sim::SimWorld;
    use crate::world::{BlockDescriptor, Position};
    use std::time::Duration;

    fn agent_with_world(world: SimWorld) -> (tempfile::TempDir, Agent<SimWorld>) {
        let dir = tempfile::tempdir().unwrap();
        let paths = FleetPaths::new(dir.path());
        let config = AgentConfig::new("TestBot", Role::Miner);
        let agent = Agent::new(config, paths, world).unwrap();
        (dir, agent)
    }

    fn ore_field() -> SimWorld {
        SimWorld::with_blocks(vec![BlockDescriptor {
            name: "iron_ore".to_string(),
            position: Position::new(8.0, 64.0, 8.0),
        }])
    }

    #[tokio::test]
    async fn test_startup_merge_seeds_and_persists_individual_table() {
        let (_dir, agent) = agent_with_world(SimWorld::new());
        for key in ["state_idle", "state_mining", "state_building"] {
            assert!(agent.table().0.contains_key(key), "missing {key}");
        }

        let on_disk = agent.store.load_individual("TestBot");
        assert_eq!(&on_disk, agent.table());
    }

    #[tokio::test]
    async fn test_decision_cycle_updates_and_flushes() {
        let (_dir, mut agent) = agent_with_world(ore_field());
        let before = agent.table().clone();

        agent.decision_cycle().await.unwrap();

        assert_ne!(agent.table(), &before, "cycle must write an update");
        let on_disk = agent.store.load_individual("TestBot");
        assert_eq!(&on_disk, agent.table());
        assert!(!agent.is_busy(), "guard released on every exit path");
    }

    #[tokio::test]
    async fn test_derive_state_low_resources_then_construction() {
        let (_dir, mut agent) = agent_with_world(SimWorld::new());
        assert_eq!(agent.derive_state().await.unwrap(), AgentState::LowResources);

        agent.world.grant("oak_log", 20).await;
        assert_eq!(agent.derive_state().await.unwrap(), AgentState::Idle);

        agent.knowledge.document_mut().structures.push(
            crate::knowledge::StructurePlan {
                name: "hut".to_string(),
                origin: Position::default(),
                blocks: Vec::new(),
            },
        );
        assert_eq!(
            agent.derive_state().await.unwrap(),
            AgentState::ConstructionNeeded
        );

        agent.guard.try_acquire();
        assert_eq!(agent.derive_state().await.unwrap(), AgentState::Busy);
    }

    #[tokio::test]
    async fn test_assist_runs_one_bounded_attempt() {
        let (_dir, mut agent) = agent_with_world(ore_field());
        agent
            .handle_message(SupervisorMessage::Assist(HelpRequest::resource_gather(
                "iron_ore",
            )))
            .await
            .unwrap();
        assert_eq!(agent.world.remaining_blocks().await, 0);
        assert!(!agent.is_busy());
    }

    #[tokio::test]
    async fn test_assist_dropped_while_busy() {
        let (_dir, mut agent) = agent_with_world(ore_field());
        agent.guard.try_acquire();
        agent
            .handle_message(SupervisorMessage::Assist(HelpRequest::resource_gather(
                "iron_ore",
            )))
            .await
            .unwrap();
        // Nothing was dug: the instruction was dropped, not queued.
        assert_eq!(agent.world.remaining_blocks().await, 1);
    }

    #[tokio::test]
    async fn test_help_fallback_fires_once_through_tick() {
        let (_dir, mut agent) = agent_with_world(ore_field());
        agent.help = HelpState::with_wait(Duration::from_millis(0));
        agent.request_help(HelpRequest::resource_gather("iron_ore"));

        tokio::time::sleep(Duration::from_millis(5)).await;
        agent.watchdog_tick().await.unwrap();
        assert_eq!(agent.world.remaining_blocks().await, 0, "fallback gathered");

        // No pending request left; another tick does not re-run it.
        assert!(!agent.help.is_pending());
    }

    #[tokio::test]
    async fn test_keepalives_do_not_mask_a_stall() {
        let (_dir, mut agent) = agent_with_world(ore_field());
        agent.watchdog = ActivityWatchdog::with_threshold(Duration::from_millis(1));

        // First tick drains the spawn event, which counts as movement and
        // resets the inactivity window.
        agent.watchdog_tick().await.unwrap();
        assert_eq!(agent.world.remaining_blocks().await, 1);

        tokio::time::sleep(Duration::from_millis(10)).await;
        // Pings keep arriving, but they are not agent activity.
        agent.handle_message(SupervisorMessage::KeepAlive).await.unwrap();
        agent.handle_message(SupervisorMessage::KeepAlive).await.unwrap();

        agent.watchdog_tick().await.unwrap();
        // The stalled watchdog forced the default gather task.
        assert_eq!(agent.world.remaining_blocks().await, 0);
    }

    #[tokio::test]
    async fn test_watchdog_tick_drains_lifecycle_events() {
        let (_dir, mut agent) = agent_with_world(SimWorld::new());
        agent.world.push_event(WorldEvent::Disconnected).await;
        agent
            .world
            .push_event(WorldEvent::Error("chunk load failed".to_string()))
            .await;

        // Both events are consumed and logged; neither is an error for the
        // tick itself.
        agent.watchdog_tick().await.unwrap();
        assert!(agent.world.next_event().await.is_none());
    }

    #[tokio::test]
    async fn test_shutdown_message_flushes_and_stops() {
        let (_dir, mut agent) = agent_with_world(SimWorld::new());
        agent.table.set("state_idle", "gather", 7.0);

        agent.handle_message(SupervisorMessage::Shutdown).await.unwrap();
        assert!(agent.shutting_down);

        let on_disk = agent.store.load_individual("TestBot");
        assert!((on_disk.value("state_idle", "gather") - 7.0).abs() < 1e-12);
    }

    #[tokio::test]
    async fn test_run_exits_when_control_channel_closes() {
        let (_dir, agent) = agent_with_world(SimWorld::new());
        let control: &[u8] = b"{\"type\":\"keepAlive\"}\n";
        let mut outbound = std::io::Cursor::new(Vec::new());

        tokio::time::timeout(
            Duration::from_secs(30),
            agent.run(control, &mut outbound),
        )
        .await
        .expect("agent must exit after EOF")
        .unwrap();
    }
}

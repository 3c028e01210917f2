// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Fleet supervisor: spawns, monitors and restarts agent processes,
//! broadcasts liveness pings and relays help requests.
//!
//! Every agent runs as an independent child process. The supervisor keeps
//! one handle per roster entry and reconciles after every exit: any
//! process exit, regardless of code, schedules exactly one respawn after
//! a fixed delay. There is no retry cap — fleet liveness is favored over
//! restart-storm protection, so the restart counter is exposed instead.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;

use indexmap::IndexMap;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::config::{
    load_roster, AgentConfig, FleetPaths, ENV_AGENT_NAME, ENV_AGENT_ROLE, ENV_DATA_DIR,
};
use crate::constants::{KEEPALIVE_INTERVAL, RESPAWN_DELAY, SHUTDOWN_GRACE};
use crate::error::{HiveError, Result};
use crate::messages::{self, parse_agent_line, AgentMessage, HelpRequest, SupervisorMessage};

/// How agent processes are launched.
#[derive(Debug, Clone)]
pub enum AgentCommand {
    /// Re-exec the current executable with `agent` arguments.
    SelfExec,
    /// Run a custom executable (tests, alternate agent builds).
    Custom(PathBuf, Vec<String>),
}

/// Supervisor tuning; the defaults are the fleet's fixed production values.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Agent roster location.
    pub roster_path: PathBuf,
    /// Data directory layout shared with the agents.
    pub paths: FleetPaths,
    /// Backoff before respawning an exited agent.
    pub respawn_delay: std::time::Duration,
    /// Keepalive broadcast interval.
    pub keepalive_interval: std::time::Duration,
    /// Grace window for agents to flush and exit at shutdown.
    pub shutdown_grace: std::time::Duration,
    /// How to launch agents.
    pub command: AgentCommand,
}

impl SupervisorConfig {
    /// Production configuration for a roster and data directory.
    pub fn new(roster_path: impl Into<PathBuf>, paths: FleetPaths) -> Self {
        Self {
            roster_path: roster_path.into(),
            paths,
            respawn_delay: RESPAWN_DELAY,
            keepalive_interval: KEEPALIVE_INTERVAL,
            shutdown_grace: SHUTDOWN_GRACE,
            command: AgentCommand::SelfExec,
        }
    }
}

/// Supervisor-owned handle to one live agent process.
#[derive(Debug)]
pub struct AgentHandle {
    /// The agent's immutable configuration.
    pub config: AgentConfig,
    /// Times this agent has been respawned after an exit.
    pub restarts: u32,
    /// Process id, when the OS reported one.
    pub pid: Option<u32>,
    stdin: ChildStdin,
}

/// Internal fleet events funneled into the supervisor loop.
#[derive(Debug)]
enum FleetEvent {
    /// A child process exited (any code means "needs respawn").
    AgentExited { name: String, code: Option<i32> },
    /// The respawn backoff for an agent elapsed.
    RespawnDue { name: String },
    /// An agent asked for help.
    Help { requester: String, request: HelpRequest },
}

/// Pick the first registered agent other than the requester.
///
/// Busy detection for delegation targets is a stub that always reports
/// not-busy (see [`Supervisor::is_agent_busy`]); selection is purely
/// registration order.
fn next_assist_candidate<'a, I>(registered: I, requester: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    registered.into_iter().find(|name| *name != requester)
}

/// The fleet supervisor.
pub struct Supervisor {
    config: SupervisorConfig,
    registry: IndexMap<String, AgentHandle>,
    roster: HashMap<String, AgentConfig>,
    // Survives handle removal so the counter is cumulative across respawns.
    restart_counts: HashMap<String, u32>,
    events_tx: mpsc::UnboundedSender<FleetEvent>,
    events_rx: mpsc::UnboundedReceiver<FleetEvent>,
}

impl Supervisor {
    /// Create a supervisor; the roster is loaded lazily in [`Self::run`]
    /// (or explicitly via [`Self::reconcile_roster`]).
    pub fn new(config: SupervisorConfig) -> Self {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        Self {
            config,
            registry: IndexMap::new(),
            roster: HashMap::new(),
            restart_counts: HashMap::new(),
            events_tx,
            events_rx,
        }
    }

    /// Number of live process handles.
    pub fn live_handles(&self) -> usize {
        self.registry.len()
    }

    /// Restart counter for an agent, when registered.
    pub fn restarts(&self, name: &str) -> Option<u32> {
        self.registry.get(name).map(|handle| handle.restarts)
    }

    /// Whether an agent is busy, for delegation candidate selection.
    ///
    /// Stub that always reports not-busy. Agents do not report their busy
    /// guard back over the control channel, so the supervisor has nothing
    /// to consult; candidate selection is registration order alone. Known
    /// limitation.
    pub fn is_agent_busy(&self, _name: &str) -> bool {
        false
    }

    /// Load the roster and spawn any configured agent that has no live
    /// handle. After this pass the handle set equals the roster.
    pub async fn reconcile_roster(&mut self) -> Result<()> {
        self.config.paths.ensure_dirs()?;
        let roster = load_roster(&self.config.roster_path);
        for agent in roster {
            self.roster.insert(agent.name.clone(), agent.clone());
            if !self.registry.contains_key(&agent.name) {
                if let Err(err) = self.spawn(agent.clone(), 0).await {
                    error!(agent = %agent.name, %err, "initial spawn failed");
                }
            }
        }
        Ok(())
    }

    fn build_command(&self, agent: &AgentConfig) -> Result<Command> {
        let (program, args): (PathBuf, Vec<String>) = match &self.config.command {
            AgentCommand::SelfExec => {
                let exe = std::env::current_exe()
                    .map_err(|err| HiveError::Configuration(err.to_string()))?;
                (
                    exe,
                    vec![
                        "agent".to_string(),
                        "--name".to_string(),
                        agent.name.clone(),
                        "--role".to_string(),
                        agent.role.name().to_string(),
                    ],
                )
            }
            AgentCommand::Custom(program, args) => (program.clone(), args.clone()),
        };

        let mut command = Command::new(program);
        command
            .args(args)
            .env(ENV_AGENT_NAME, &agent.name)
            .env(ENV_AGENT_ROLE, agent.role.name())
            .env(ENV_DATA_DIR, self.config.paths.root())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        Ok(command)
    }

    /// Start a process bound to this agent's identity and register its
    /// handle. `restarts` carries the counter across respawns.
    async fn spawn(&mut self, agent: AgentConfig, restarts: u32) -> Result<()> {
        let mut child = self
            .build_command(&agent)?
            .spawn()
            .map_err(|err| HiveError::process(&agent.name, format!("spawn failed: {err}")))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| HiveError::process(&agent.name, "child stdin not piped"))?;
        let stdout = child.stdout.take();
        let pid = child.id();

        if let Some(stdout) = stdout {
            self.watch_stdout(agent.name.clone(), stdout);
        }
        self.watch_exit(agent.name.clone(), child);

        info!(agent = %agent.name, role = %agent.role, pid, restarts, "agent started");
        self.registry.insert(
            agent.name.clone(),
            AgentHandle {
                config: agent,
                restarts,
                pid,
                stdin,
            },
        );
        Ok(())
    }

    /// Forward a child's stdout: control messages become fleet events,
    /// everything else is logged under the agent's name.
    fn watch_stdout(&self, name: String, stdout: tokio::process::ChildStdout) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                match parse_agent_line(&line) {
                    Some(AgentMessage::RequestHelp(request)) => {
                        let _ = events.send(FleetEvent::Help {
                            requester: name.clone(),
                            request,
                        });
                    }
                    None => info!(agent = %name, "[{name}] {line}"),
                }
            }
        });
    }

    /// Wait for a child to exit and report it to the loop.
    fn watch_exit(&self, name: String, mut child: Child) {
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let code = match child.wait().await {
                Ok(status) => status.code(),
                Err(err) => {
                    error!(agent = %name, %err, "wait on child failed");
                    None
                }
            };
            let _ = events.send(FleetEvent::AgentExited { name, code });
        });
    }

    /// Handle a child exit: log it and unconditionally schedule one
    /// respawn after the configured delay.
    fn on_exit(&mut self, name: String, code: Option<i32>) {
        warn!(agent = %name, ?code, "agent process exited, scheduling respawn");
        self.registry.shift_remove(&name);

        let events = self.events_tx.clone();
        let delay = self.config.respawn_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(FleetEvent::RespawnDue { name });
        });
    }

    /// Respawn an agent with its identical roster configuration.
    async fn on_respawn_due(&mut self, name: String) {
        let Some(agent) = self.roster.get(&name).cloned() else {
            warn!(agent = %name, "exited agent no longer in roster, dropping");
            return;
        };
        let restarts = self
            .restart_counts
            .entry(name.clone())
            .and_modify(|count| *count = count.saturating_add(1))
            .or_insert(1);
        let restarts = *restarts;
        if let Err(err) = self.spawn(agent, restarts).await {
            error!(agent = %name, %err, "respawn failed, rescheduling");
            self.on_exit(name, None);
        }
    }

    /// Send a no-payload liveness ping to every handle, fire-and-forget.
    async fn broadcast_keepalive(&mut self) {
        for (name, handle) in &mut self.registry {
            if let Err(err) =
                messages::write_line(&mut handle.stdin, &SupervisorMessage::KeepAlive).await
            {
                // The exit monitor reaps the dead handle; nothing to do here.
                warn!(agent = %name, %err, "keepalive send failed");
            }
        }
    }

    /// Relay a help request to one other registered agent.
    ///
    /// No acknowledgment path exists; if no other agent is registered the
    /// request is logged and dropped.
    pub async fn relay_help(&mut self, requester: &str, request: HelpRequest) {
        let candidate = next_assist_candidate(
            self.registry.keys().map(String::as_str),
            requester,
        )
        .filter(|name| !self.is_agent_busy(name))
        .map(str::to_string);

        let Some(candidate) = candidate else {
            warn!(requester, "no other agent registered, help request dropped");
            return;
        };

        info!(requester, helper = %candidate, resource = %request.resource, "delegating help");
        if let Some(handle) = self.registry.get_mut(&candidate) {
            if let Err(err) =
                messages::write_line(&mut handle.stdin, &SupervisorMessage::Assist(request)).await
            {
                warn!(helper = %candidate, %err, "assist send failed");
            }
        }
    }

    /// Send a terminate instruction to every handle, then wait out the
    /// grace window for each agent's own flush-then-exit.
    pub async fn shutdown(&mut self) {
        info!(agents = self.registry.len(), "shutting down fleet");
        for (name, handle) in &mut self.registry {
            if let Err(err) =
                messages::write_line(&mut handle.stdin, &SupervisorMessage::Shutdown).await
            {
                warn!(agent = %name, %err, "shutdown send failed");
            }
        }

        // Children flush their tables and exit on their own; give them the
        // grace window before the supervisor process goes away.
        let deadline = tokio::time::Instant::now() + self.config.shutdown_grace;
        while !self.registry.is_empty() && tokio::time::Instant::now() < deadline {
            match tokio::time::timeout_at(deadline, self.events_rx.recv()).await {
                Ok(Some(FleetEvent::AgentExited { name, .. })) => {
                    info!(agent = %name, "agent exited cleanly");
                    self.registry.shift_remove(&name);
                }
                Ok(Some(_)) => {}
                Ok(None) | Err(_) => break,
            }
        }
        self.registry.clear();
    }

    /// Handle one fleet event. Exposed to the loop and to tests.
    async fn handle_event(&mut self, event: FleetEvent) {
        match event {
            FleetEvent::AgentExited { name, code } => self.on_exit(name, code),
            FleetEvent::RespawnDue { name } => self.on_respawn_due(name).await,
            FleetEvent::Help { requester, request } => {
                info!(
                    requester = %requester,
                    resource = %request.resource,
                    "help requested"
                );
                self.relay_help(&requester, request).await;
            }
        }
    }

    /// Run the fleet until a termination signal arrives.
    pub async fn run(mut self) -> Result<()> {
        self.reconcile_roster().await?;
        info!(agents = self.registry.len(), "fleet supervisor running");

        let mut keepalive = tokio::time::interval(self.config.keepalive_interval);
        keepalive.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = keepalive.tick() => self.broadcast_keepalive().await,
                event = self.events_rx.recv() => match event {
                    Some(event) => self.handle_event(event).await,
                    None => break,
                },
                signal = shutdown_signal() => {
                    info!(?signal, "termination signal received");
                    self.shutdown().await;
                    return Ok(());
                }
            }
        }
        Ok(())
    }
}

/// Resolve on SIGINT or SIGTERM.
async fn shutdown_signal() -> &'static str {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                error!(%err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return "interrupt";
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => "interrupt",
            _ = term.recv() => "terminate",
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        "interrupt"
    }
}

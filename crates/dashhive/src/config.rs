// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Fleet configuration: the agent roster and the on-disk data layout.
//!
//! The roster file is a JSON array of agent definitions. A missing or
//! invalid roster is logged and replaced by an empty one so startup can
//! continue in degraded mode.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::error::Result;

/// Environment variable carrying the agent name into a spawned process.
pub const ENV_AGENT_NAME: &str = "DASHHIVE_AGENT_NAME";
/// Environment variable carrying the agent role into a spawned process.
pub const ENV_AGENT_ROLE: &str = "DASHHIVE_AGENT_ROLE";
/// Environment variable carrying the data directory into a spawned process.
pub const ENV_DATA_DIR: &str = "DASHHIVE_DATA_DIR";

/// Behavioral category shaping an agent's task priorities.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Digs ores and stone.
    Miner,
    /// Places planned structures.
    Builder,
    /// Roams and surveys for resources.
    Explorer,
    /// Generic fallback behavior.
    #[default]
    Default,
}

impl Role {
    /// Parse a role from its lowercase name, falling back to `Default`.
    pub fn from_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "miner" => Self::Miner,
            "builder" => Self::Builder,
            "explorer" => Self::Explorer,
            _ => Self::Default,
        }
    }

    /// Lowercase name used in file paths and environment variables.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Miner => "miner",
            Self::Builder => "builder",
            Self::Explorer => "explorer",
            Self::Default => "default",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One agent's identity and connection parameters. Immutable after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent name.
    pub name: String,

    /// Behavioral role.
    #[serde(default)]
    pub role: Role,

    /// World server host.
    #[serde(default = "default_host")]
    pub host: String,

    /// World server port.
    #[serde(default = "default_port")]
    pub port: u16,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    25565
}

impl AgentConfig {
    /// Create a config with default connection parameters.
    pub fn new(name: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            role,
            host: default_host(),
            port: default_port(),
        }
    }
}

/// Load the agent roster from a JSON file.
///
/// Never fails: a missing or unparsable roster is logged and an empty
/// roster returned so the supervisor can keep running.
pub fn load_roster(path: &Path) -> Vec<AgentConfig> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) => {
            error!(path = %path.display(), %err, "roster not readable, starting with empty fleet");
            return Vec::new();
        }
    };

    match serde_json::from_str::<Vec<AgentConfig>>(&contents) {
        Ok(roster) => {
            info!(path = %path.display(), agents = roster.len(), "roster loaded");
            roster
        }
        Err(err) => {
            error!(path = %path.display(), %err, "invalid roster, starting with empty fleet");
            Vec::new()
        }
    }
}

/// On-disk layout for tables, knowledge and logs, derived from one data
/// directory.
///
/// ```text
/// <data>/individual/<name>_qtable.json   per-agent tables
/// <data>/shared/<role>_qtable.json       role tables
/// <data>/shared/mainQTable.json          global table
/// <data>/shared/knowledgeBase.json       shared knowledge document
/// <data>/shared/fleet.json               default roster location
/// <data>/logs/                           per-agent log files
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FleetPaths {
    root: PathBuf,
}

impl FleetPaths {
    /// Create a layout rooted at `data_dir`.
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: data_dir.into(),
        }
    }

    /// Root data directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding per-agent individual tables.
    pub fn individual_dir(&self) -> PathBuf {
        self.root.join("individual")
    }

    /// Directory holding role tables, the global table and the knowledge base.
    pub fn shared_dir(&self) -> PathBuf {
        self.root.join("shared")
    }

    /// Directory for per-agent log files.
    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Individual table path for an agent.
    pub fn individual_table(&self, agent: &str) -> PathBuf {
        self.individual_dir().join(format!("{agent}_qtable.json"))
    }

    /// Role table path.
    pub fn role_table(&self, role: Role) -> PathBuf {
        self.shared_dir().join(format!("{}_qtable.json", role.name()))
    }

    /// Global table path.
    pub fn global_table(&self) -> PathBuf {
        self.shared_dir().join("mainQTable.json")
    }

    /// Shared knowledge document path.
    pub fn knowledge_base(&self) -> PathBuf {
        self.shared_dir().join("knowledgeBase.json")
    }

    /// Default roster location under the shared directory.
    pub fn roster(&self) -> PathBuf {
        self.shared_dir().join("fleet.json")
    }

    /// Create the individual/shared/logs directories if absent.
    pub fn ensure_dirs(&self) -> Result<()> {
        for dir in [self.individual_dir(), self.shared_dir(), self.logs_dir()] {
            if !dir.exists() {
                fs::create_dir_all(&dir)?;
                info!(dir = %dir.display(), "created data directory");
            }
        }
        Ok(())
    }

    /// Resolve the data directory from the environment, defaulting to the
    /// current directory.
    pub fn from_env() -> Self {
        match std::env::var(ENV_DATA_DIR) {
            Ok(dir) if !dir.is_empty() => Self::new(dir),
            _ => {
                warn!("{ENV_DATA_DIR} not set, using current directory");
                Self::new(".")
            }
        }
    }
}

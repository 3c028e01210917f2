// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Error types for DashHive.
//!
//! The fleet is designed to degrade rather than halt: configuration and
//! persistence problems are logged and replaced with safe defaults at the
//! call site, world-interaction failures return control to the next
//! decision cycle, and process failures always schedule a respawn. The
//! variants here mirror that taxonomy.

use thiserror::Error;

/// DashHive result type.
pub type Result<T> = std::result::Result<T, HiveError>;

/// Errors that can occur in fleet operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum HiveError {
    /// Missing or invalid roster / knowledge document.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Corrupt or unreadable table / knowledge file.
    #[error("Persistence error at {path}: {reason}")]
    Persistence { path: String, reason: String },

    /// World-interaction failure (path timeout, dig/place/craft failure).
    #[error("World interaction error: {0}")]
    World(String),

    /// Agent process crash or spawn failure.
    #[error("Process error for agent {agent}: {reason}")]
    Process { agent: String, reason: String },

    /// Control-channel send or framing failure.
    #[error("Channel error: {0}")]
    Channel(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl HiveError {
    /// Build a persistence error for a path.
    pub fn persistence(path: impl AsRef<std::path::Path>, reason: impl Into<String>) -> Self {
        Self::Persistence {
            path: path.as_ref().display().to_string(),
            reason: reason.into(),
        }
    }

    /// Build a process error for a named agent.
    pub fn process(agent: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Process {
            agent: agent.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = HiveError::persistence("/tmp/qtable.json", "unexpected EOF");
        assert_eq!(
            err.to_string(),
            "Persistence error at /tmp/qtable.json: unexpected EOF"
        );

        let err = HiveError::process("Sniffer", "exited with code 1");
        assert_eq!(
            err.to_string(),
            "Process error for agent Sniffer: exited with code 1"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: HiveError = io.into();
        assert!(matches!(err, HiveError::Io(_)));
    }
}

// Copyright 2026 Dropbox (created by Andrew Yates <ayates@dropbox.com>)

//! Typed fire-and-forget messages between the supervisor and its agents.
//!
//! The control channel is JSON lines over the child's stdin (supervisor →
//! agent) and stdout (agent → supervisor); stderr stays free for logs.
//! There is no response path and no correlation identifiers — delivery is
//! best-effort and never acknowledged. Lines on an agent's stdout that do
//! not parse as a control message are passed through as that agent's log
//! output.

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::error::{HiveError, Result};

/// Kinds of assistance an agent can ask for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum HelpType {
    /// Locate, travel to and extract one resource of the requested kind.
    ResourceGather,
}

/// Payload of a help request; ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpRequest {
    /// What kind of help is needed.
    #[serde(rename = "helpType")]
    pub help_type: HelpType,
    /// Resource name the requester is blocked on; `details` on the wire.
    #[serde(rename = "details")]
    pub resource: String,
}

impl HelpRequest {
    /// A resource-gathering request.
    pub fn resource_gather(resource: impl Into<String>) -> Self {
        Self {
            help_type: HelpType::ResourceGather,
            resource: resource.into(),
        }
    }
}

/// Messages sent from the supervisor to an agent process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum SupervisorMessage {
    /// No-payload liveness ping, broadcast on a fixed interval.
    KeepAlive,
    /// Delegated assist instruction relayed from another agent's request.
    Assist(HelpRequest),
    /// Flush-then-exit instruction for fleet shutdown.
    Shutdown,
}

/// Messages sent from an agent process to the supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum AgentMessage {
    /// Ask the supervisor to delegate help to another agent.
    RequestHelp(HelpRequest),
}

/// Encode a message as a single JSON line (newline included).
pub fn encode_line<T: Serialize>(message: &T) -> Result<String> {
    let mut line = serde_json::to_string(message)?;
    line.push('\n');
    Ok(line)
}

/// Write a message as one JSON line to `writer` and flush it.
pub async fn write_line<W, T>(writer: &mut W, message: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let line = encode_line(message)?;
    writer
        .write_all(line.as_bytes())
        .await
        .map_err(|err| HiveError::Channel(err.to_string()))?;
    writer
        .flush()
        .await
        .map_err(|err| HiveError::Channel(err.to_string()))?;
    Ok(())
}

/// Parse one line of agent stdout as a control message.
///
/// Returns `None` for anything that is not a control message; those lines
/// belong to the agent's log output.
pub fn parse_agent_line(line: &str) -> Option<AgentMessage> {
    let trimmed = line.trim();
    if !trimmed.starts_with('{') {
        return None;
    }
    serde_json::from_str(trimmed).ok()
}

/// Parse one line of agent stdin as a supervisor message.
pub fn parse_supervisor_line(line: &str) -> Result<SupervisorMessage> {
    serde_json::from_str(line.trim()).map_err(HiveError::from)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keep_alive_wire_shape() {
        let line = encode_line(&SupervisorMessage::KeepAlive).unwrap();
        assert_eq!(line, "{\"type\":\"keepAlive\"}\n");
        assert_eq!(
            parse_supervisor_line(&line).unwrap(),
            SupervisorMessage::KeepAlive
        );
    }

    #[test]
    fn test_request_help_round_trip() {
        let message = AgentMessage::RequestHelp(HelpRequest::resource_gather("iron_ore"));
        let line = encode_line(&message).unwrap();
        assert!(line.contains("\"requestHelp\""));
        assert!(line.contains("\"helpType\":\"resource_gather\""));
        assert!(line.contains("\"details\":\"iron_ore\""));

        assert_eq!(parse_agent_line(&line), Some(message));
    }

    #[test]
    fn test_assist_round_trip() {
        let message = SupervisorMessage::Assist(HelpRequest::resource_gather("oak_log"));
        let line = encode_line(&message).unwrap();
        let parsed = parse_supervisor_line(&line).unwrap();
        assert_eq!(parsed, message);
    }

    #[test]
    fn test_log_lines_are_not_control_messages() {
        assert_eq!(parse_agent_line("mining at (8.0, 64.0, 8.0)"), None);
        assert_eq!(parse_agent_line(""), None);
        // JSON, but not a known control message.
        assert_eq!(parse_agent_line("{\"level\":\"info\"}"), None);
    }

    #[tokio::test]
    async fn test_write_line_appends_newline() {
        let mut buffer = std::io::Cursor::new(Vec::new());
        write_line(&mut buffer, &SupervisorMessage::Shutdown)
            .await
            .unwrap();
        assert_eq!(buffer.into_inner(), b"{\"type\":\"shutdown\"}\n");
    }
}

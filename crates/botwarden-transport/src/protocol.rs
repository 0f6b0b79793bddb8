//! Wire protocol for observer/controller communication.

use botwarden_core::{LogRecord, SessionConfig, StatusSnapshot};
use serde::{Deserialize, Serialize};

/// Message from client to server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a session with this config.
    Start(SessionConfig),
    /// Stop the session.
    Stop,
    /// Send chat text or a command.
    Send(String),
    /// Clear the event log for everyone.
    Clear,
    /// Ping for keepalive.
    Ping,
}

impl ClientMessage {
    /// Action name echoed back in [`ServerMessage::Ack`].
    #[must_use]
    pub const fn action(&self) -> &'static str {
        match self {
            Self::Start(_) => "start",
            Self::Stop => "stop",
            Self::Send(_) => "send",
            Self::Clear => "clear",
            Self::Ping => "ping",
        }
    }
}

/// Message from server to client.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Retained records, oldest first. Sent once on attach.
    Backlog(Vec<LogRecord>),
    /// A newly appended record.
    Log(LogRecord),
    /// Session status after a transition.
    Status(StatusSnapshot),
    /// The event log was cleared.
    Clear,
    /// A control message was carried out.
    Ack(String),
    /// A control message failed.
    Error(String),
    /// Pong response.
    Pong,
}

#[cfg(test)]
mod tests {
    use botwarden_core::{LogCategory, Severity};

    use super::*;

    #[test]
    fn test_server_envelope_shape() {
        let record = LogRecord::now(LogCategory::Chat, "<a> hi".to_string(), Severity::Info);
        let json = serde_json::to_value(ServerMessage::Log(record)).unwrap();
        assert_eq!(json["type"], "log");
        assert_eq!(json["data"]["category"], "chat");
        assert_eq!(json["data"]["message"], "<a> hi");

        let json = serde_json::to_value(ServerMessage::Status(StatusSnapshot::idle())).unwrap();
        assert_eq!(json["type"], "status");
        assert_eq!(json["data"]["connected"], false);
        assert_eq!(json["data"]["protocolVersion"], "unknown");

        let json = serde_json::to_string(&ServerMessage::Clear).unwrap();
        assert_eq!(json, r#"{"type":"clear"}"#);
    }

    #[test]
    fn test_parse_start() {
        let msg: ClientMessage = serde_json::from_str(
            r#"{"type":"start","data":{"host":"s","port":25565,"identity":"u","authMode":"password"}}"#,
        )
        .unwrap();
        if let ClientMessage::Start(config) = msg {
            assert_eq!(config.server_address(), "s:25565");
            assert_eq!(config.protocol_version, "auto");
        } else {
            panic!("Wrong message type");
        }
    }

    #[test]
    fn test_parse_control_messages() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type":"send","data":"/home"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Send(ref text) if text == "/home"));
        assert_eq!(msg.action(), "send");

        let msg: ClientMessage = serde_json::from_str(r#"{"type":"stop"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Stop));

        assert!(serde_json::from_str::<ClientMessage>(r#"{"type":"reboot"}"#).is_err());
    }
}

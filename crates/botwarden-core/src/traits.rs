//! Boundary with the external game-protocol client.

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::SessionConfig;

/// Identifies one connect attempt. Events from older attempts are stale.
pub type Generation = u64;

/// Lifecycle event raised by the external client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Authentication with the server succeeded.
    Login,
    /// The agent entered the world; the session is usable.
    Spawn { protocol_version: Option<String> },
    /// The connection ended.
    End { reason: Option<String> },
    /// The client reported a failure.
    Error { message: String },
    /// The server kicked the agent.
    Kicked { reason: String },
    /// Inbound chat or system message text.
    Message { text: String },
    /// Prompt from the interactive sign-in flow (device code, link).
    AuthPrompt { text: String },
}

/// An event tagged with the attempt it belongs to.
#[derive(Debug, Clone)]
pub struct TaggedEvent {
    pub generation: Generation,
    pub event: SessionEvent,
}

/// Where a client delivers lifecycle events for one attempt.
///
/// Handed to [`GameClient::connect`]; clones share the same attempt.
#[derive(Debug, Clone)]
pub struct EventSink {
    generation: Generation,
    tx: mpsc::UnboundedSender<TaggedEvent>,
}

impl EventSink {
    /// Create a sink for one attempt.
    #[must_use]
    pub const fn new(generation: Generation, tx: mpsc::UnboundedSender<TaggedEvent>) -> Self {
        Self { generation, tx }
    }

    /// Attempt this sink belongs to.
    #[must_use]
    pub const fn generation(&self) -> Generation {
        self.generation
    }

    /// Deliver an event. Returns `false` once the receiver is gone.
    pub fn emit(&self, event: SessionEvent) -> bool {
        self.tx
            .send(TaggedEvent {
                generation: self.generation,
                event,
            })
            .is_ok()
    }
}

/// Error reported by the external client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    #[error("Connect failed: {0}")]
    Connect(String),
    #[error("Chat failed: {0}")]
    Chat(String),
    #[error("Action failed: {0}")]
    Action(String),
    #[error("Connection closed")]
    Closed,
}

/// A live connection created by a [`GameClient`].
///
/// All methods are synchronous and may fail.
pub trait GameHandle: Send + Sync {
    /// Send chat text or a command.
    ///
    /// # Errors
    /// Returns error if the client rejects the message.
    fn chat(&self, text: &str) -> Result<(), ClientError>;

    /// Close the connection. The client is expected to raise `End` later.
    ///
    /// # Errors
    /// Returns error if teardown fails.
    fn disconnect(&self) -> Result<(), ClientError>;

    /// Issue a harmless action (a small look adjustment) to avoid idle kicks.
    ///
    /// # Errors
    /// Returns error if the handle can no longer act.
    fn perform_keep_alive(&self, yaw_delta: f32, pitch_delta: f32) -> Result<(), ClientError>;

    /// Version negotiated with the server, once known.
    fn protocol_version(&self) -> Option<String>;
}

/// Trait for game-protocol client backends.
#[async_trait]
pub trait GameClient: Send + Sync {
    /// Start a connection attempt.
    ///
    /// Resolves once the attempt is initiated, not when login completes.
    /// Further progress is reported through `events`.
    async fn connect(
        &self,
        config: &SessionConfig,
        events: EventSink,
    ) -> Result<Arc<dyn GameHandle>, ClientError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_tags_generation() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(7, tx);
        assert!(sink.emit(SessionEvent::Login));

        let tagged = rx.try_recv().unwrap();
        assert_eq!(tagged.generation, 7);
        assert_eq!(tagged.event, SessionEvent::Login);
    }

    #[test]
    fn test_sink_reports_closed_receiver() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = EventSink::new(1, tx);
        drop(rx);
        assert!(!sink.emit(SessionEvent::End { reason: None }));
    }
}

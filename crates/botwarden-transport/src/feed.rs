//! Per-observer bridge from the event log and status updates to a channel.

use std::sync::Arc;

use botwarden_core::{EventLog, StatusSnapshot, SubscriptionId};
use botwarden_session::SessionController;
use futures::StreamExt;
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};
use tokio_stream::wrappers::{BroadcastStream, errors::BroadcastStreamRecvError};

use crate::protocol::{ClientMessage, ServerMessage};

/// Shared state for observer connections.
#[derive(Clone)]
pub struct ObserverState {
    /// The process-wide session controller.
    pub controller: Arc<SessionController>,
    admin_token: Option<Arc<str>>,
}

impl ObserverState {
    /// Create state that accepts every observer.
    #[must_use]
    pub const fn new(controller: Arc<SessionController>) -> Self {
        Self {
            controller,
            admin_token: None,
        }
    }

    /// Require observers to present `token`.
    #[must_use]
    pub fn with_admin_token(mut self, token: impl Into<String>) -> Self {
        self.admin_token = Some(Arc::from(token.into()));
        self
    }

    /// The log observers are attached to.
    #[must_use]
    pub fn event_log(&self) -> &Arc<EventLog> {
        self.controller.event_log()
    }

    /// Whether a presented token grants access.
    #[must_use]
    pub fn is_authorized(&self, token: Option<&str>) -> bool {
        self.admin_token
            .as_deref()
            .is_none_or(|expected| token == Some(expected))
    }

    /// Carry out a control message and build the reply.
    pub async fn handle_client_message(&self, msg: ClientMessage) -> ServerMessage {
        let action = msg.action();
        let result = match msg {
            ClientMessage::Ping => return ServerMessage::Pong,
            ClientMessage::Start(config) => self.controller.start(config).await,
            ClientMessage::Stop => {
                self.controller.stop();
                Ok(())
            }
            ClientMessage::Send(text) => self.controller.send_message(&text),
            ClientMessage::Clear => {
                self.event_log().clear();
                Ok(())
            }
        };

        match result {
            Ok(()) => ServerMessage::Ack(action.to_string()),
            Err(e) => {
                tracing::debug!(action, error = %e, "control message rejected");
                ServerMessage::Error(e.to_string())
            }
        }
    }
}

/// Live feed for one observer: log records, clears and status updates.
///
/// Detaches from the log and stops forwarding when dropped.
pub struct ObserverFeed {
    event_log: Arc<EventLog>,
    subscription: SubscriptionId,
    status_task: JoinHandle<()>,
}

impl ObserverFeed {
    /// Attach an observer that receives messages on `tx`.
    ///
    /// Returns the feed and the initial backlog + status messages, which
    /// must reach the observer before anything queued on `tx`.
    #[must_use]
    pub fn attach(
        state: &ObserverState,
        tx: mpsc::UnboundedSender<ServerMessage>,
    ) -> (Self, Vec<ServerMessage>) {
        let event_log = Arc::clone(state.event_log());
        let controller = Arc::clone(&state.controller);

        let record_tx = tx.clone();
        let clear_tx = tx.clone();
        let (subscription, backlog) = event_log.subscribe_with_backlog(
            move |record| {
                let _ = record_tx.send(ServerMessage::Log(record.clone()));
            },
            move || {
                let _ = clear_tx.send(ServerMessage::Clear);
            },
        );

        let status_rx = controller.subscribe_status();
        let initial = vec![
            ServerMessage::Backlog(backlog),
            ServerMessage::Status(controller.get_status()),
        ];
        let status_task = tokio::spawn(forward_status(controller, status_rx, tx));

        (
            Self {
                event_log,
                subscription,
                status_task,
            },
            initial,
        )
    }

    /// Log subscription held by this feed.
    #[must_use]
    pub const fn subscription(&self) -> SubscriptionId {
        self.subscription
    }
}

impl Drop for ObserverFeed {
    fn drop(&mut self) {
        self.event_log.unsubscribe(self.subscription);
        self.status_task.abort();
    }
}

async fn forward_status(
    controller: Arc<SessionController>,
    rx: broadcast::Receiver<StatusSnapshot>,
    tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let mut updates = BroadcastStream::new(rx);
    while let Some(update) = updates.next().await {
        let status = match update {
            Ok(status) => status,
            Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "status updates lagged, resending current status");
                controller.get_status()
            }
        };
        if tx.send(ServerMessage::Status(status)).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use botwarden_core::{
        ClientError, EventSink, GameClient, GameHandle, LogCategory, SessionConfig,
    };
    use botwarden_session::ControllerSettings;

    use super::*;

    struct QuietHandle;

    impl GameHandle for QuietHandle {
        fn chat(&self, _text: &str) -> Result<(), ClientError> {
            Ok(())
        }

        fn disconnect(&self) -> Result<(), ClientError> {
            Ok(())
        }

        fn perform_keep_alive(&self, _yaw: f32, _pitch: f32) -> Result<(), ClientError> {
            Ok(())
        }

        fn protocol_version(&self) -> Option<String> {
            None
        }
    }

    struct QuietClient;

    #[async_trait]
    impl GameClient for QuietClient {
        async fn connect(
            &self,
            _config: &SessionConfig,
            _events: EventSink,
        ) -> Result<Arc<dyn GameHandle>, ClientError> {
            Ok(Arc::new(QuietHandle))
        }
    }

    fn state() -> ObserverState {
        let controller = SessionController::new(
            Arc::new(QuietClient),
            Arc::new(EventLog::new()),
            ControllerSettings::default(),
        );
        ObserverState::new(controller)
    }

    async fn next(rx: &mut mpsc::UnboundedReceiver<ServerMessage>) -> ServerMessage {
        tokio::time::timeout(Duration::from_secs(1), rx.recv())
            .await
            .expect("timed out waiting for message")
            .expect("channel closed")
    }

    #[tokio::test]
    async fn test_attach_sends_backlog_then_live() {
        let state = state();
        state.event_log().info(LogCategory::Console, "earlier");

        let (tx, mut rx) = mpsc::unbounded_channel();
        let (feed, initial) = ObserverFeed::attach(&state, tx);

        assert!(matches!(&initial[0], ServerMessage::Backlog(records) if records.len() == 1));
        assert!(matches!(&initial[1], ServerMessage::Status(s) if !s.connected));

        state.event_log().info(LogCategory::Chat, "live");
        assert!(matches!(next(&mut rx).await, ServerMessage::Log(r) if r.message == "live"));

        state.event_log().clear();
        assert!(matches!(next(&mut rx).await, ServerMessage::Clear));

        assert_eq!(state.event_log().subscriber_count(), 1);
        drop(feed);
        assert_eq!(state.event_log().subscriber_count(), 0);
    }

    #[tokio::test]
    async fn test_status_updates_are_forwarded() {
        let state = state();
        let (tx, mut rx) = mpsc::unbounded_channel();
        let (_feed, _initial) = ObserverFeed::attach(&state, tx);

        let reply = state
            .handle_client_message(ClientMessage::Start(SessionConfig::new("s", "u")))
            .await;
        assert!(matches!(reply, ServerMessage::Ack(ref action) if action == "start"));

        let mut saw_connecting = false;
        for _ in 0..4 {
            if let ServerMessage::Status(status) = next(&mut rx).await {
                saw_connecting = status.connecting;
                break;
            }
        }
        assert!(saw_connecting);
    }

    #[tokio::test]
    async fn test_control_messages() {
        let state = state();

        assert!(matches!(
            state.handle_client_message(ClientMessage::Ping).await,
            ServerMessage::Pong
        ));

        let reply = state
            .handle_client_message(ClientMessage::Send("hello".to_string()))
            .await;
        assert!(matches!(reply, ServerMessage::Error(ref m) if m == "Session is not connected"));

        let bad = SessionConfig::new("s", "u").with_port(0);
        assert!(matches!(
            state.handle_client_message(ClientMessage::Start(bad)).await,
            ServerMessage::Error(_)
        ));

        let good = SessionConfig::new("s", "u");
        assert!(matches!(
            state.handle_client_message(ClientMessage::Start(good.clone())).await,
            ServerMessage::Ack(_)
        ));
        assert!(matches!(
            state.handle_client_message(ClientMessage::Start(good)).await,
            ServerMessage::Error(ref m) if m.contains("already")
        ));

        assert!(matches!(
            state.handle_client_message(ClientMessage::Clear).await,
            ServerMessage::Ack(ref action) if action == "clear"
        ));
        assert!(state.event_log().is_empty());

        assert!(matches!(
            state.handle_client_message(ClientMessage::Stop).await,
            ServerMessage::Ack(_)
        ));
        assert!(!state.controller.get_status().connecting);
    }

    #[tokio::test]
    async fn test_admin_token() {
        let open = state();
        assert!(open.is_authorized(None));

        let locked = state().with_admin_token("secret");
        assert!(locked.is_authorized(Some("secret")));
        assert!(!locked.is_authorized(Some("wrong")));
        assert!(!locked.is_authorized(None));
    }
}

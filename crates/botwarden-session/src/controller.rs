//! Session controller for one unattended agent.
//!
//! Owns at most one live session and drives the
//! `Idle -> Connecting -> Active -> Idle` state machine. Client events are
//! funneled through a single dispatcher task, so handlers never run
//! concurrently with each other; timers (keep-alive, reconnect) are
//! separate tasks that are aborted on every transition that retires them.

use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use botwarden_core::{
    ConfigError, EventLog, EventSink, GameClient, GameHandle, LogCategory, SessionConfig,
    SessionEvent, Severity, StatusSnapshot, TaggedEvent,
    status::UNKNOWN_VERSION,
    traits::Generation,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{broadcast, mpsc},
    task::JoinHandle,
};

use crate::{Backoff, ControllerSettings, keep_alive};

/// Buffered status notifications per lagging receiver.
const STATUS_CHANNEL_CAPACITY: usize = 64;

/// Minecraft-style formatting code marker.
const FORMAT_CODE: char = '\u{a7}';

/// Tag carried by genuine player chat lines.
const CHAT_TAG: &str = "[CHAT]";

/// Session controller error.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Session is already connecting or connected")]
    AlreadyActive,
    #[error("Session is not connected")]
    NotConnected,
    #[error("Failed to send message: {0}")]
    SendFailed(String),
    #[error("Invalid session config: {0}")]
    InvalidConfig(#[from] ConfigError),
    #[error("Failed to start session: {0}")]
    ConnectFailed(String),
}

/// Lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Connecting,
    Active,
}

/// What a keep-alive tick should do.
pub(crate) enum KeepAliveTick {
    Act(Arc<dyn GameHandle>),
    Skip,
    Done,
}

enum Attempt {
    Caller(SessionConfig),
    Reconnect { epoch: Generation },
}

struct Inner {
    state: SessionState,
    config: Option<SessionConfig>,
    handle: Option<Arc<dyn GameHandle>>,
    negotiated_version: Option<String>,
    last_error: Option<String>,
    /// Bumped on every attempt, `stop`, and retired attempt.
    generation: Generation,
    backoff: Backoff,
    keep_alive: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
}

impl Inner {
    fn snapshot(&self) -> StatusSnapshot {
        let config = self.config.as_ref();
        StatusSnapshot {
            connected: self.state == SessionState::Active,
            connecting: self.state == SessionState::Connecting,
            server: config.map(SessionConfig::server_address),
            identity: config.map(|c| c.identity.clone()),
            protocol_version: self
                .negotiated_version
                .clone()
                .unwrap_or_else(|| UNKNOWN_VERSION.to_string()),
            error: self.last_error.clone(),
        }
    }

    fn stop_keep_alive(&mut self) {
        if let Some(task) = self.keep_alive.take() {
            task.abort();
        }
    }

    fn cancel_reconnect(&mut self) {
        if let Some(task) = self.reconnect.take() {
            task.abort();
        }
    }
}

/// Side effects collected under the state lock and applied after it is released.
#[derive(Default)]
struct Effects {
    disconnect: Option<Arc<dyn GameHandle>>,
    records: Vec<(LogCategory, String, Severity)>,
    status: Option<StatusSnapshot>,
}

impl Effects {
    fn log(&mut self, category: LogCategory, message: impl Into<String>, severity: Severity) {
        self.records.push((category, message.into(), severity));
    }
}

/// Controller for a single long-running remote session.
///
/// Construct once per process and share the returned `Arc`.
pub struct SessionController {
    client: Arc<dyn GameClient>,
    event_log: Arc<EventLog>,
    settings: ControllerSettings,
    inner: Mutex<Inner>,
    status_tx: broadcast::Sender<StatusSnapshot>,
    events_tx: mpsc::UnboundedSender<TaggedEvent>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    self_ref: Weak<Self>,
}

impl SessionController {
    /// Create a controller and start its event dispatcher.
    ///
    /// Must be called from within a tokio runtime.
    #[must_use]
    pub fn new(
        client: Arc<dyn GameClient>,
        event_log: Arc<EventLog>,
        settings: ControllerSettings,
    ) -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (status_tx, _) = broadcast::channel(STATUS_CHANNEL_CAPACITY);
        let backoff = Backoff::new(settings.backoff_floor(), settings.backoff_cap());

        let controller = Arc::new_cyclic(|weak| Self {
            client,
            event_log,
            settings,
            inner: Mutex::new(Inner {
                state: SessionState::Idle,
                config: None,
                handle: None,
                negotiated_version: None,
                last_error: None,
                generation: 0,
                backoff,
                keep_alive: None,
                reconnect: None,
            }),
            status_tx,
            events_tx,
            dispatcher: Mutex::new(None),
            self_ref: weak.clone(),
        });

        let task = tokio::spawn(dispatch(Arc::downgrade(&controller), events_rx));
        *controller.dispatcher.lock() = Some(task);
        controller
    }

    /// Start a session.
    ///
    /// Resolves once the attempt is initiated; login and spawn are reported
    /// through status notifications.
    ///
    /// # Errors
    /// Returns `AlreadyActive` unless idle, `InvalidConfig` for a bad config,
    /// or `ConnectFailed` if the client could not initiate the attempt.
    pub async fn start(&self, config: SessionConfig) -> Result<(), SessionError> {
        self.begin_attempt(Attempt::Caller(config)).await
    }

    /// Stop the session and cancel all timers. Safe from any state.
    pub fn stop(&self) {
        let mut fx = Effects::default();
        {
            let mut inner = self.inner.lock();
            inner.cancel_reconnect();
            inner.stop_keep_alive();
            inner.config = None;
            fx.disconnect = inner.handle.take();
            inner.state = SessionState::Idle;
            inner.generation += 1;
            inner.negotiated_version = None;
            inner.last_error = None;

            fx.log(LogCategory::Console, "Session stopped", Severity::Info);
            fx.status = Some(inner.snapshot());
        }
        self.apply(fx);
    }

    /// Send chat text or a command through the live session.
    ///
    /// # Errors
    /// Returns `NotConnected` unless active, or `SendFailed` if the client
    /// rejects the text.
    pub fn send_message(&self, text: &str) -> Result<(), SessionError> {
        let handle = {
            let inner = self.inner.lock();
            match (inner.state, &inner.handle) {
                (SessionState::Active, Some(handle)) => Arc::clone(handle),
                _ => return Err(SessionError::NotConnected),
            }
        };

        if text.trim().is_empty() {
            return Err(SessionError::SendFailed("message is empty".to_string()));
        }

        match handle.chat(text) {
            Ok(()) => {
                let kind = if self.settings.is_command(text) {
                    "command"
                } else {
                    "message"
                };
                self.event_log
                    .info(LogCategory::Console, format!("Sent {kind}: {text}"));
                Ok(())
            }
            Err(e) => {
                self.event_log.log(
                    LogCategory::Error,
                    format!("Failed to send message: {e}"),
                    Severity::Error,
                );
                Err(SessionError::SendFailed(e.to_string()))
            }
        }
    }

    /// Current status.
    #[must_use]
    pub fn get_status(&self) -> StatusSnapshot {
        self.inner.lock().snapshot()
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// Delay the next unexpected drop would wait before reconnecting.
    #[must_use]
    pub fn next_reconnect_delay(&self) -> Duration {
        self.inner.lock().backoff.peek()
    }

    /// Whether an automatic reconnection is scheduled.
    #[must_use]
    pub fn reconnect_pending(&self) -> bool {
        self.inner.lock().reconnect.is_some()
    }

    /// Receive a snapshot on every state transition.
    #[must_use]
    pub fn subscribe_status(&self) -> broadcast::Receiver<StatusSnapshot> {
        self.status_tx.subscribe()
    }

    /// The log this controller writes to.
    #[must_use]
    pub const fn event_log(&self) -> &Arc<EventLog> {
        &self.event_log
    }

    /// Settings this controller was built with.
    #[must_use]
    pub const fn settings(&self) -> &ControllerSettings {
        &self.settings
    }

    /// Stop the session and end the dispatcher.
    pub fn shutdown(&self) {
        self.stop();
        if let Some(task) = self.dispatcher.lock().take() {
            task.abort();
        }
        tracing::debug!("session controller shut down");
    }

    async fn begin_attempt(&self, attempt: Attempt) -> Result<(), SessionError> {
        let from_reconnect = matches!(attempt, Attempt::Reconnect { .. });

        let mut fx = Effects::default();
        let (generation, config) = {
            let mut inner = self.inner.lock();
            let config = match attempt {
                Attempt::Caller(config) => {
                    if inner.state != SessionState::Idle {
                        return Err(SessionError::AlreadyActive);
                    }
                    config.validate()?;
                    inner.cancel_reconnect();
                    config
                }
                Attempt::Reconnect { epoch } => {
                    let config = match (&inner.config, inner.state) {
                        (Some(config), SessionState::Idle) if inner.generation == epoch => {
                            config.clone()
                        }
                        _ => {
                            tracing::debug!(epoch, "reconnect superseded, skipping");
                            return Ok(());
                        }
                    };
                    // Detach (not abort) our own timer handle.
                    inner.reconnect = None;
                    config
                }
            };

            // An error without a trailing end leaves the old handle behind.
            fx.disconnect = inner.handle.take();
            inner.stop_keep_alive();
            inner.generation += 1;
            inner.state = SessionState::Connecting;
            inner.config = Some(config.clone());
            inner.negotiated_version = None;
            inner.last_error = None;

            fx.log(
                LogCategory::Console,
                format!(
                    "Connecting to {} as {} (version: {})",
                    config.server_address(),
                    config.identity,
                    config.protocol_version
                ),
                Severity::Info,
            );
            fx.status = Some(inner.snapshot());
            (inner.generation, config)
        };
        self.apply(fx);

        tracing::info!(server = %config.server_address(), generation, "connect attempt started");
        let sink = EventSink::new(generation, self.events_tx.clone());
        let result = self.client.connect(&config, sink).await;

        let mut fx = Effects::default();
        let outcome = {
            let mut inner = self.inner.lock();
            let current = inner.generation == generation;
            match result {
                Ok(handle) if current && inner.state != SessionState::Idle => {
                    inner.handle = Some(handle);
                    Ok(())
                }
                Ok(handle) => {
                    // Stopped or retired while the client was connecting.
                    tracing::debug!(generation, "discarding handle from retired attempt");
                    fx.disconnect = Some(handle);
                    Ok(())
                }
                Err(e) if current && inner.state == SessionState::Connecting => {
                    inner.state = SessionState::Idle;
                    // Late events from the failed attempt are stale.
                    inner.generation += 1;
                    inner.last_error = Some(e.to_string());
                    fx.log(
                        LogCategory::Error,
                        format!("Failed to create session: {e}"),
                        Severity::Error,
                    );
                    if from_reconnect {
                        self.schedule_reconnect(&mut inner, &mut fx);
                    } else {
                        inner.config = None;
                    }
                    fx.status = Some(inner.snapshot());
                    Err(SessionError::ConnectFailed(e.to_string()))
                }
                Err(e) => {
                    tracing::debug!(generation, error = %e, "retired attempt failed to connect");
                    Ok(())
                }
            }
        };
        self.apply(fx);
        outcome
    }

    fn handle_event(&self, tagged: TaggedEvent) {
        let mut fx = Effects::default();
        {
            let mut inner = self.inner.lock();
            if tagged.generation != inner.generation {
                tracing::debug!(
                    generation = tagged.generation,
                    current = inner.generation,
                    event = ?tagged.event,
                    "ignoring event from retired attempt"
                );
                return;
            }

            match tagged.event {
                SessionEvent::Login => {
                    fx.log(LogCategory::Server, "Logged in to server", Severity::Success);
                }
                SessionEvent::Spawn { protocol_version } => {
                    self.on_spawn(&mut inner, protocol_version, &mut fx);
                }
                SessionEvent::End { reason } => self.on_end(&mut inner, reason, &mut fx),
                SessionEvent::Error { message } => self.on_error(&mut inner, message, &mut fx),
                SessionEvent::Kicked { reason } => {
                    fx.log(
                        LogCategory::Server,
                        format!("Kicked from server: {reason}"),
                        Severity::Warning,
                    );
                }
                SessionEvent::Message { text } => {
                    if is_chat_line(&text) {
                        fx.log(LogCategory::Chat, text, Severity::Info);
                    }
                }
                SessionEvent::AuthPrompt { text } => {
                    fx.log(LogCategory::Auth, text, Severity::Info);
                }
            }
        }
        self.apply(fx);
    }

    fn on_spawn(&self, inner: &mut Inner, protocol_version: Option<String>, fx: &mut Effects) {
        if inner.state != SessionState::Connecting {
            tracing::debug!(state = ?inner.state, "spawn outside of connecting ignored");
            return;
        }
        let Some(config) = inner.config.clone() else {
            return;
        };

        inner.state = SessionState::Active;
        inner.last_error = None;
        inner.negotiated_version = protocol_version
            .or_else(|| inner.handle.as_ref().and_then(|h| h.protocol_version()));
        inner.backoff.reset();

        inner.stop_keep_alive();
        inner.keep_alive = Some(keep_alive::spawn(
            self.self_ref.clone(),
            inner.generation,
            self.settings.keep_alive_interval(),
            self.settings.keep_alive_jitter,
        ));

        fx.log(
            LogCategory::Server,
            format!(
                "Spawned on {} (v{})",
                config.server_address(),
                inner.negotiated_version.as_deref().unwrap_or(UNKNOWN_VERSION)
            ),
            Severity::Success,
        );
        fx.status = Some(inner.snapshot());
    }

    fn on_end(&self, inner: &mut Inner, reason: Option<String>, fx: &mut Effects) {
        inner.state = SessionState::Idle;
        inner.handle = None;
        inner.negotiated_version = None;
        inner.stop_keep_alive();
        // The attempt is over; anything else it reports is stale.
        inner.generation += 1;

        let reason = reason
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| "Unknown reason".to_string());
        fx.log(
            LogCategory::Server,
            format!("Disconnected: {reason}"),
            Severity::Warning,
        );

        if inner.config.is_some() {
            self.schedule_reconnect(inner, fx);
        }
        fx.status = Some(inner.snapshot());
    }

    fn on_error(&self, inner: &mut Inner, message: String, fx: &mut Effects) {
        inner.state = SessionState::Idle;
        inner.stop_keep_alive();
        inner.last_error = Some(message.clone());
        fx.log(
            LogCategory::Error,
            format!("Session error: {message}"),
            Severity::Error,
        );

        if self.settings.reconnect_on_error {
            fx.disconnect = inner.handle.take();
            inner.negotiated_version = None;
            inner.generation += 1;
            if inner.config.is_some() {
                self.schedule_reconnect(inner, fx);
            }
        }
        fx.status = Some(inner.snapshot());
    }

    fn schedule_reconnect(&self, inner: &mut Inner, fx: &mut Effects) {
        inner.cancel_reconnect();

        let delay = inner.backoff.next_delay();
        let epoch = inner.generation;
        fx.log(
            LogCategory::Console,
            format!("Reconnecting in {}s...", delay.as_secs_f64()),
            Severity::Info,
        );
        tracing::info!(?delay, epoch, "reconnect scheduled");

        let controller = self.self_ref.clone();
        inner.reconnect = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(controller) = controller.upgrade() else {
                return;
            };
            if let Err(e) = controller.begin_attempt(Attempt::Reconnect { epoch }).await {
                controller.event_log.log(
                    LogCategory::Error,
                    format!("Reconnection failed: {e}"),
                    Severity::Error,
                );
            }
        }));
    }

    pub(crate) fn keep_alive_tick(&self, generation: Generation) -> KeepAliveTick {
        let inner = self.inner.lock();
        if inner.generation != generation {
            return KeepAliveTick::Done;
        }
        match (inner.state, &inner.handle) {
            (SessionState::Active, Some(handle)) => KeepAliveTick::Act(Arc::clone(handle)),
            (SessionState::Active | SessionState::Connecting, None) => KeepAliveTick::Skip,
            _ => KeepAliveTick::Done,
        }
    }

    fn apply(&self, fx: Effects) {
        if let Some(handle) = fx.disconnect {
            if let Err(e) = handle.disconnect() {
                tracing::warn!(error = %e, "client disconnect failed");
            }
        }
        for (category, message, severity) in fx.records {
            self.event_log.log(category, message, severity);
        }
        if let Some(status) = fx.status {
            let _ = self.status_tx.send(status);
        }
    }
}

impl Drop for SessionController {
    fn drop(&mut self) {
        let inner = self.inner.get_mut();
        inner.cancel_reconnect();
        inner.stop_keep_alive();
        if let Some(task) = self.dispatcher.get_mut().take() {
            task.abort();
        }
    }
}

async fn dispatch(
    controller: Weak<SessionController>,
    mut events: mpsc::UnboundedReceiver<TaggedEvent>,
) {
    while let Some(tagged) = events.recv().await {
        let Some(controller) = controller.upgrade() else {
            break;
        };
        controller.handle_event(tagged);
    }
}

/// Plain chat, or a decorated line explicitly tagged as chat.
fn is_chat_line(text: &str) -> bool {
    !text.contains(FORMAT_CODE) || text.contains(CHAT_TAG)
}

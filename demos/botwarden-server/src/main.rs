//! Observer server driving a simulated game session.
//!
//! Run with: cargo run -p botwarden-server
//!
//! Then open http://localhost:3000 in your browser.

use std::{
    net::SocketAddr,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use anyhow::Context as _;
use async_trait::async_trait;
use axum::{Router, response::Html, routing::get};
use botwarden_core::{
    ClientError, EventLog, EventSink, GameClient, GameHandle, SessionConfig, SessionEvent,
    event_log::DEFAULT_CAPACITY,
};
use botwarden_session::{ControllerSettings, SessionController};
use botwarden_transport::{ObserverState, websocket::create_observer_router};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SPAWN_DELAY: Duration = Duration::from_millis(750);
const SIMULATED_VERSION: &str = "1.20.4";

/// Stands in for a real game client: logs in, spawns after a short delay
/// and echoes chat back.
struct SimulatedClient;

#[async_trait]
impl GameClient for SimulatedClient {
    async fn connect(
        &self,
        config: &SessionConfig,
        events: EventSink,
    ) -> Result<Arc<dyn GameHandle>, ClientError> {
        let version = config
            .requested_version()
            .unwrap_or(SIMULATED_VERSION)
            .to_string();
        let handle = Arc::new(SimulatedHandle {
            identity: config.identity.clone(),
            version: version.clone(),
            open: AtomicBool::new(true),
            events: events.clone(),
        });

        tokio::spawn(async move {
            events.emit(SessionEvent::Login);
            tokio::time::sleep(SPAWN_DELAY).await;
            events.emit(SessionEvent::Spawn {
                protocol_version: Some(version),
            });
        });

        Ok(handle)
    }
}

struct SimulatedHandle {
    identity: String,
    version: String,
    open: AtomicBool,
    events: EventSink,
}

impl GameHandle for SimulatedHandle {
    fn chat(&self, text: &str) -> Result<(), ClientError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }
        self.events.emit(SessionEvent::Message {
            text: format!("<{}> {text}", self.identity),
        });
        Ok(())
    }

    fn disconnect(&self) -> Result<(), ClientError> {
        if self.open.swap(false, Ordering::AcqRel) {
            self.events.emit(SessionEvent::End {
                reason: Some("Client disconnected".to_string()),
            });
        }
        Ok(())
    }

    fn perform_keep_alive(&self, yaw: f32, pitch: f32) -> Result<(), ClientError> {
        if !self.open.load(Ordering::Acquire) {
            return Err(ClientError::Closed);
        }
        tracing::trace!(yaw, pitch, "simulated look");
        Ok(())
    }

    fn protocol_version(&self) -> Option<String> {
        Some(self.version.clone())
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn load_settings() -> anyhow::Result<ControllerSettings> {
    env_var("BOTWARDEN_SETTINGS").map_or_else(
        || Ok(ControllerSettings::default()),
        |raw| serde_json::from_str(&raw).context("BOTWARDEN_SETTINGS is not valid JSON"),
    )
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .init();

    let addr: SocketAddr = env_var("BOTWARDEN_ADDR")
        .as_deref()
        .unwrap_or("127.0.0.1:3000")
        .parse()
        .context("BOTWARDEN_ADDR must be host:port")?;
    let capacity = env_var("BOTWARDEN_LOG_CAPACITY")
        .map(|raw| raw.parse::<usize>())
        .transpose()
        .context("BOTWARDEN_LOG_CAPACITY must be a number")?
        .unwrap_or(DEFAULT_CAPACITY);
    let settings = load_settings()?;

    let event_log = Arc::new(EventLog::with_capacity(capacity));
    let controller = SessionController::new(Arc::new(SimulatedClient), event_log, settings);

    let mut state = ObserverState::new(Arc::clone(&controller));
    if let Some(token) = env_var("BOTWARDEN_ADMIN_TOKEN") {
        state = state.with_admin_token(token);
    } else {
        tracing::warn!("BOTWARDEN_ADMIN_TOKEN not set, observers are unauthenticated");
    }

    // Build router
    let app = Router::new()
        .route("/", get(index_handler))
        .merge(create_observer_router(state))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    // Start server
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!("Server listening on http://{addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    controller.shutdown();
    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for Ctrl-C: {e}");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown requested");
}

async fn index_handler() -> Html<&'static str> {
    Html(INDEX_HTML)
}

const INDEX_HTML: &str = r#"<!DOCTYPE html>
<html>
<head>
    <title>Botwarden</title>
    <style>
        body { margin: 0; padding: 20px; background: #1e1e1e; color: #d4d4d4; font-family: system-ui, sans-serif; }
        h1 { color: #fff; margin-bottom: 10px; }
        #log { height: calc(100vh - 220px); overflow-y: auto; font-family: Menlo, Monaco, monospace; font-size: 13px; background: #111; padding: 8px; }
        .status { color: #888; font-size: 14px; margin-bottom: 10px; }
        .connected { color: #4a4; }
        .success { color: #4a4; }
        .warning { color: #cc4; }
        .error { color: #e55; }
        form { margin: 10px 0; }
        input { background: #2a2a2a; color: #ddd; border: 1px solid #444; padding: 4px; }
    </style>
</head>
<body>
    <h1>Botwarden</h1>
    <div class="status" id="status">Connecting...</div>
    <form id="start">
        <input id="host" placeholder="host" value="localhost" />
        <input id="port" placeholder="port" value="25565" size="6" />
        <input id="identity" placeholder="identity" value="warden" />
        <button>Start</button>
        <button type="button" id="stop">Stop</button>
        <button type="button" id="clear">Clear</button>
    </form>
    <div id="log"></div>
    <form id="chat"><input id="text" size="80" placeholder="message or /command" /></form>

    <script>
        const token = new URLSearchParams(window.location.search).get('token');
        const statusEl = document.getElementById('status');
        const logEl = document.getElementById('log');
        let ws;

        function append(record) {
            const line = document.createElement('div');
            line.className = record.severity;
            const time = new Date(record.timestamp).toLocaleTimeString();
            line.textContent = `[${time}] [${record.category}] ${record.message}`;
            logEl.appendChild(line);
            logEl.scrollTop = logEl.scrollHeight;
        }

        function send(type, data) {
            if (ws && ws.readyState === WebSocket.OPEN) {
                ws.send(JSON.stringify(data === undefined ? { type } : { type, data }));
            }
        }

        function connect() {
            const protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
            const query = token ? `?token=${encodeURIComponent(token)}` : '';
            ws = new WebSocket(`${protocol}//${window.location.host}/ws${query}`);

            ws.onclose = (event) => {
                statusEl.textContent = `Observer disconnected (${event.reason || event.code}) - reconnecting...`;
                statusEl.className = 'status';
                setTimeout(connect, 2000);
            };

            ws.onmessage = (event) => {
                const msg = JSON.parse(event.data);
                switch (msg.type) {
                    case 'backlog': logEl.innerHTML = ''; msg.data.forEach(append); break;
                    case 'log': append(msg.data); break;
                    case 'clear': logEl.innerHTML = ''; break;
                    case 'status': {
                        const s = msg.data;
                        const state = s.connected ? 'Connected' : s.connecting ? 'Connecting' : 'Idle';
                        statusEl.textContent = `${state} ${s.server || ''} ${s.identity || ''} (v${s.protocolVersion})`;
                        statusEl.className = s.connected ? 'status connected' : 'status';
                        break;
                    }
                    case 'error': append({ timestamp: Date.now(), category: 'error', severity: 'error', message: msg.data }); break;
                }
            };
        }

        document.getElementById('start').onsubmit = (e) => {
            e.preventDefault();
            send('start', {
                host: document.getElementById('host').value,
                port: Number(document.getElementById('port').value),
                identity: document.getElementById('identity').value,
            });
        };
        document.getElementById('stop').onclick = () => send('stop');
        document.getElementById('clear').onclick = () => send('clear');
        document.getElementById('chat').onsubmit = (e) => {
            e.preventDefault();
            const input = document.getElementById('text');
            send('send', input.value);
            input.value = '';
        };

        connect();
    </script>
</body>
</html>
"#;

//! WebSocket transport for remote observers.

use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{CloseFrame, Message, WebSocket, close_code},
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    feed::{ObserverFeed, ObserverState},
    protocol::{ClientMessage, ServerMessage},
};

/// Query parameters accepted on upgrade.
#[derive(Debug, Default, Deserialize)]
pub struct WsParams {
    /// Admin token, required when the server has one configured.
    pub token: Option<String>,
}

/// WebSocket upgrade handler.
///
/// Use this as an Axum route handler.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<ObserverState>,
) -> impl IntoResponse {
    let authorized = state.is_authorized(params.token.as_deref());
    ws.on_upgrade(move |socket| async move {
        if authorized {
            handle_socket(socket, state).await;
        } else {
            reject(socket).await;
        }
    })
}

async fn reject(mut socket: WebSocket) {
    tracing::warn!("observer rejected: invalid token");
    let _ = socket
        .send(Message::Close(Some(CloseFrame {
            code: close_code::POLICY,
            reason: "Unauthorized".into(),
        })))
        .await;
}

fn encode(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            tracing::error!("Failed to serialize message: {e}");
            None
        }
    }
}

async fn handle_socket(socket: WebSocket, state: ObserverState) {
    let observer = Uuid::new_v4();
    tracing::info!(%observer, "observer connected");

    let (mut sender, mut receiver) = socket.split();

    // Channel for sending messages to the client
    let (tx, mut rx) = mpsc::unbounded_channel::<ServerMessage>();
    let (feed, initial) = ObserverFeed::attach(&state, tx.clone());

    // Backlog and status go out before anything queued on the channel
    let send_task = tokio::spawn(async move {
        for msg in initial {
            let Some(frame) = encode(&msg) else {
                continue;
            };
            if sender.send(frame).await.is_err() {
                return;
            }
        }
        while let Some(msg) = rx.recv().await {
            let Some(frame) = encode(&msg) else {
                continue;
            };
            if sender.send(frame).await.is_err() {
                break;
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        let msg = match msg {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(s) => s,
                Err(_) => continue,
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => continue,
            Err(e) => {
                tracing::error!(%observer, "WebSocket error: {e}");
                break;
            }
        };

        let reply = match serde_json::from_str::<ClientMessage>(&msg) {
            Ok(client_msg) => state.handle_client_message(client_msg).await,
            Err(e) => {
                tracing::warn!(%observer, "Invalid client message: {e}");
                ServerMessage::Error(format!("Invalid message: {e}"))
            }
        };
        if tx.send(reply).is_err() {
            break;
        }
    }

    drop(feed);
    send_task.abort();
    tracing::info!(%observer, "observer disconnected");
}

/// Create the observer router, serving `/ws`.
///
/// # Example
/// ```ignore
/// let app = Router::new()
///     .merge(create_observer_router(ObserverState::new(controller)));
/// ```
#[must_use]
pub fn create_observer_router(state: ObserverState) -> axum::Router {
    axum::Router::new()
        .route("/ws", axum::routing::get(ws_handler))
        .with_state(state)
}

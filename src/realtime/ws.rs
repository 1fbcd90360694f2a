//! Websocket endpoint for the realtime rooms.
//!
//! Handshake carries `session_id` (client-generated, stable across
//! reconnects) and an optional `token` as query parameters. After upgrade
//! the client drives membership with `join_event` / `leave_event` messages;
//! the server forwards room traffic plus targeted session pushes.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::realtime::{event_room, session_room, ClientMessage, RealtimeMessage};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub session_id: Option<String>,
    #[allow(dead_code)]
    pub token: Option<String>,
}

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    Query(params): Query<WsParams>,
    State(state): State<AppState>,
) -> Response {
    let session_id = match params.session_id.filter(|s| !s.is_empty()) {
        Some(sid) => sid,
        None => {
            return (StatusCode::BAD_REQUEST, "session_id query parameter is required")
                .into_response()
        }
    };
    ws.on_upgrade(move |socket| handle_socket(socket, session_id, state))
}

async fn handle_socket(socket: WebSocket, session_id: String, state: AppState) {
    info!(session_id = %session_id, "websocket connected");

    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<RealtimeMessage>();

    // Single writer to the sink; everything funnels through out_tx.
    let send_task = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(json) => json,
                Err(e) => {
                    warn!("failed to serialize realtime message: {}", e);
                    continue;
                }
            };
            if sink.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    // Targeted pushes (hold_expiring_soon) arrive on the session room.
    let session_rx = state.rooms.subscribe(&session_room(&session_id)).await;
    let session_forward = forward_room(session_rx, out_tx.clone());

    // event_id -> forward task for each joined room.
    let mut joined: HashMap<String, JoinHandle<()>> = HashMap::new();

    while let Some(Ok(msg)) = stream.next().await {
        match msg {
            Message::Text(text) => {
                let parsed: Result<ClientMessage, _> = serde_json::from_str(&text);
                match parsed {
                    Ok(ClientMessage::JoinEvent { event_id }) => {
                        if joined.contains_key(&event_id) {
                            continue;
                        }
                        let rx = state.rooms.subscribe(&event_room(&event_id)).await;
                        joined.insert(event_id.clone(), forward_room(rx, out_tx.clone()));
                        state.rooms.join(&event_id).await;
                        let _ = out_tx.send(RealtimeMessage::JoinedEvent {
                            message: format!("Joined event {}", event_id),
                            event_id,
                        });
                    }
                    Ok(ClientMessage::LeaveEvent { event_id }) => {
                        if let Some(task) = joined.remove(&event_id) {
                            task.abort();
                            state.rooms.leave(&event_id).await;
                        }
                    }
                    Ok(ClientMessage::Ping) => {
                        debug!(session_id = %session_id, "client ping");
                    }
                    Err(_) => {
                        let _ = out_tx.send(RealtimeMessage::Error {
                            message: "Unrecognized message".to_string(),
                        });
                    }
                }
            }
            Message::Close(_) => break,
            // Protocol-level ping/pong is handled by the transport.
            _ => {}
        }
    }

    for (event_id, task) in joined {
        task.abort();
        state.rooms.leave(&event_id).await;
    }
    session_forward.abort();
    send_task.abort();
    info!(session_id = %session_id, "websocket disconnected");
}

/// Forward a room subscription into the connection's outbound channel.
/// Lagged receivers skip ahead; clients recover by re-polling availability.
fn forward_room(
    mut rx: broadcast::Receiver<RealtimeMessage>,
    out_tx: mpsc::UnboundedSender<RealtimeMessage>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(msg) => {
                    if out_tx.send(msg).is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!(skipped, "room subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

// WebSocket handlers streaming overlay events and chat messages.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use tokio::sync::broadcast;

use crate::metrics;

use super::AppState;

/// Overlay feed: spawnDino, addFighter, addBoss, attackFighter, clearFighters.
pub async fn ws_overlay(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.game_server.subscribe_overlay();
    ws.on_upgrade(move |socket| forward(socket, rx))
}

/// Chat feed: template keys plus substitution values.
pub async fn ws_chat(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    let rx = state.game_server.subscribe_chat();
    ws.on_upgrade(move |socket| forward(socket, rx))
}

async fn forward(mut socket: WebSocket, mut rx: broadcast::Receiver<String>) {
    metrics::CONNECTED_WEBSOCKETS.inc();

    // Forward all broadcast messages to the WebSocket client.
    // When the client disconnects or the broadcast channel closes, we stop.
    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(msg) => {
                        if socket.send(Message::Text(msg.into())).await.is_err() {
                            break;
                        }
                        metrics::WEBSOCKET_MESSAGES_SENT_TOTAL.inc();
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        tracing::warn!("WebSocket client lagged, skipped {n} messages");
                    }
                }
            }
            // Clients only listen; watch for disconnects
            result = socket.recv() => {
                match result {
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }

    metrics::CONNECTED_WEBSOCKETS.dec();
}

//! WebSocket upgrade and per-connection handler. Every published snapshot is
//! forwarded as a Text frame; a `get_stats` request is answered from cache.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tracing::debug;

use crate::sampler::current_snapshot;
use crate::state::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    // Registered for as long as this function runs; dropping it unsubscribes.
    let mut sub = state.broadcaster.subscribe_channel();
    let id = sub.id();
    debug!(%id, "websocket client connected");
    let (mut tx, mut rx) = socket.split();

    loop {
        tokio::select! {
            pushed = sub.recv() => {
                // None: the broadcaster dropped us for falling behind
                let Some(json) = pushed else { break };
                if tx.send(Message::Text(json.to_string())).await.is_err() {
                    break;
                }
            }
            incoming = rx.next() => match incoming {
                Some(Ok(Message::Text(text))) if text == "get_stats" => {
                    let snapshot = current_snapshot(&state).await;
                    if let Ok(js) = serde_json::to_string(&*snapshot) {
                        if tx.send(Message::Text(js)).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            }
        }
    }
    debug!(%id, "websocket client gone");
}

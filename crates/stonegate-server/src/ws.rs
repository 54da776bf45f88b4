use std::sync::Arc;

use axum::extract::ws::{Message as WsMessage, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::dispatch;
use crate::state::AppState;
use stonegate_core::descriptor_protocol::build_descriptor_message;

pub async fn ws_handler(State(state): State<Arc<AppState>>, ws: WebSocketUpgrade) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

/// `Accepted -> HandshakeOK -> ReadingFrames -> Closed`. The descriptor
/// snapshot is the first frame on entering `ReadingFrames`; any read error
/// closes and removes the session.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let session_id = Uuid::new_v4();
    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<WsMessage>();

    state.register_session(session_id, tx.clone());
    info!(%session_id, "session accepted");

    let writer = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    let descriptor = build_descriptor_message(&state.registry);
    let payload = serde_json::to_string(&descriptor).unwrap_or_default();
    let _ = tx.send(WsMessage::Text(payload.into()));

    while let Some(Ok(msg)) = stream.next().await {
        let WsMessage::Text(text) = msg else {
            continue;
        };
        if let Some(reply) = dispatch::handle_message(&state, text.as_str()).await {
            let _ = tx.send(WsMessage::Text(reply.into()));
        }
    }

    debug!(%session_id, "session closed");
    state.remove_session(session_id);
    writer.abort();
}

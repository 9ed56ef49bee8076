//! Bidirectional chat surface — GET /chat/ws/{session_id}.
//!
//! Outbound frames follow the `ClientFrame` grammar; inbound frames are
//! either `{"message": "..."}` or raw text. The connection is registered
//! with the `ConnectionManager` so operator replies can be pushed to the
//! user from outside this task.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::app::AppState;
use crate::frames::ClientFrame;
use crate::pipeline::{begin_turn, spawn_stream, Turn, TurnEvent, HUMAN_HOLDING_MESSAGE};

/// Outbound frame buffer per connection.
const FRAME_BUFFER: usize = 64;

/// Axum handler — upgrades HTTP to WebSocket.
pub async fn ws_handler(
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_connection(socket, state, session_id))
}

/// Per-connection task — lives for the entire WS session lifetime.
async fn handle_connection(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    info!(session = %session_id, "websocket connected");

    let (mut sink, mut stream) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ClientFrame>(FRAME_BUFFER);
    state.connections.register(&session_id, tx.clone());

    // Writer task: turn output and proactive operator frames both funnel
    // through this one sender.
    let writer = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            if sink
                .send(Message::Text(frame.to_json().into()))
                .await
                .is_err()
            {
                break;
            }
        }
    });

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                let user_text = parse_inbound(&text);
                if user_text.is_empty() {
                    continue;
                }
                handle_turn(&state, &session_id, &user_text, &tx).await;
            }
            Ok(Message::Close(_)) | Err(_) => break,
            _ => {}
        }
    }

    state.connections.unregister(&session_id);
    writer.abort();
    info!(session = %session_id, "websocket disconnected");
}

/// Run one user turn and forward its events as frames.
async fn handle_turn(
    state: &Arc<AppState>,
    session_id: &str,
    user_text: &str,
    tx: &mpsc::Sender<ClientFrame>,
) {
    match begin_turn(state, session_id, user_text).await {
        Ok(Turn::Human) => {
            let _ = tx
                .send(ClientFrame::system(HUMAN_HOLDING_MESSAGE, Some("HUMAN_MODE")))
                .await;
        }

        Ok(Turn::Ai { anonymized, guard }) => {
            let mut events = spawn_stream(
                Arc::clone(state),
                session_id.to_string(),
                anonymized,
                guard,
            );
            while let Some(event) = events.recv().await {
                let frame = match event {
                    TurnEvent::Chunk(text) => ClientFrame::chunk(text),
                    TurnEvent::System { text, status } => {
                        ClientFrame::system(text, status.as_deref())
                    }
                    TurnEvent::Done => {
                        let _ = tx.send(ClientFrame::done()).await;
                        break;
                    }
                };
                if tx.send(frame).await.is_err() {
                    // Connection is gone; the stream task finishes its raw
                    // path on its own.
                    break;
                }
            }
        }

        Err(e) => {
            warn!(session = session_id, error = %e, "turn failed");
            let _ = tx.send(ClientFrame::error(e.to_string())).await;
        }
    }
}

/// Inbound frames are JSON `{"message": "..."}` from the reference client,
/// but plain text is accepted too.
fn parse_inbound(text: &str) -> String {
    #[derive(serde::Deserialize)]
    struct Inbound {
        #[serde(default)]
        message: String,
    }

    match serde_json::from_str::<Inbound>(text) {
        Ok(inbound) => inbound.message,
        Err(_) => text.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_inbound() {
        assert_eq!(parse_inbound(r#"{"message": "Hallo"}"#), "Hallo");
    }

    #[test]
    fn falls_back_to_raw_text() {
        assert_eq!(parse_inbound("Hallo"), "Hallo");
    }

    #[test]
    fn json_without_message_field_is_empty() {
        assert_eq!(parse_inbound(r#"{"type": "ping"}"#), "");
    }
}

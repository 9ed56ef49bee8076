//! Request/stream chat surface — POST /chat/message.
//!
//! Request:  `{"session_id": "sess_42", "message": "Hallo"}`
//! Response: streamed `text/plain` body with the restored reply, or a JSON
//! holding response while a human owns the session.

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::convert::Infallible;
use std::sync::Arc;
use tracing::warn;

use veil_core::error::GatewayError;

use crate::app::AppState;
use crate::pipeline::{begin_turn, spawn_stream, Turn, TurnEvent, HUMAN_HOLDING_MESSAGE};

#[derive(Deserialize)]
pub struct UserMessage {
    pub session_id: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct BotResponse {
    pub session_id: String,
    pub response: String,
    pub status: String,
}

/// POST /chat/message — full pipeline, reply streamed as plain text.
pub async fn message_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UserMessage>,
) -> Response {
    if req.message.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "detail": "message cannot be empty" })),
        )
            .into_response();
    }

    match begin_turn(&state, &req.session_id, &req.message).await {
        Ok(Turn::Human) => Json(BotResponse {
            session_id: req.session_id,
            response: HUMAN_HOLDING_MESSAGE.to_string(),
            status: "HUMAN_MODE".to_string(),
        })
        .into_response(),

        Ok(Turn::Ai { anonymized, guard }) => {
            let mut rx = spawn_stream(state, req.session_id, anonymized, guard);

            let body_stream = async_stream::stream! {
                while let Some(event) = rx.recv().await {
                    match event {
                        TurnEvent::Chunk(text) => {
                            yield Ok::<Bytes, Infallible>(Bytes::from(text));
                        }
                        TurnEvent::System { text, .. } => {
                            yield Ok(Bytes::from(format!("\n\n⚠️ {text}")));
                        }
                        TurnEvent::Done => break,
                    }
                }
            };

            (
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                Body::from_stream(body_stream),
            )
                .into_response()
        }

        Err(e) => {
            warn!(error = %e, "chat turn rejected");
            error_response(&e)
        }
    }
}

/// Only `StoreUnavailable` and `FilterFailed` reach a user; both are
/// 500-class: the gateway must not answer with un-filtered state.
fn error_response(e: &GatewayError) -> Response {
    let detail = match e {
        GatewayError::FilterFailed(_) => "Filter service failed.".to_string(),
        other => other.to_string(),
    };
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": detail, "code": e.code() })),
    )
        .into_response()
}

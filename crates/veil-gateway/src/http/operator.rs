//! Operator ingress — POST /api/messages.
//!
//! Accepts bot-framework activity envelopes from the operator chat surface.
//! `connect <session-id>` binds the conversation to a user session; any
//! other message in a bound conversation is forwarded to the user verbatim.

use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
};
use std::sync::Arc;
use tracing::{info, warn};

use veil_operator::{parse_connect, Activity, OperatorError, HELP_TEXT};

use crate::app::AppState;
use crate::frames::ClientFrame;

/// POST /api/messages.
///
/// 415 on a non-JSON content type, 401 on auth failure, 200 on success,
/// 500 when forwarding into the operator conversation fails.
pub async fn messages_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> StatusCode {
    let json_content = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .map(|v| v.contains("application/json"))
        .unwrap_or(false);
    if !json_content {
        return StatusCode::UNSUPPORTED_MEDIA_TYPE;
    }

    if !check_auth(&state, &headers) {
        warn!("operator ingress rejected: bad credentials");
        return StatusCode::UNAUTHORIZED;
    }

    let activity: Activity = match serde_json::from_slice(&body) {
        Ok(a) => a,
        Err(e) => {
            warn!(error = %e, "malformed operator activity");
            return StatusCode::BAD_REQUEST;
        }
    };

    match handle_activity(&state, activity).await {
        Ok(()) => StatusCode::OK,
        Err(e) => {
            warn!(error = %e, "operator activity processing failed");
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

/// Static bearer secret. Full connector JWT validation belongs to the bot
/// adapter in front of this service; an unset password disables the check
/// for local runs.
fn check_auth(state: &AppState, headers: &HeaderMap) -> bool {
    let expected = &state.config.operator.app_password;
    if expected.is_empty() {
        return true;
    }
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(|token| token == expected)
        .unwrap_or(false)
}

async fn handle_activity(state: &Arc<AppState>, activity: Activity) -> Result<(), OperatorError> {
    if !activity.is_message() {
        // conversationUpdate and friends need no reaction
        return Ok(());
    }

    let text = activity.text.clone().unwrap_or_default().trim().to_string();

    // `connect <session-id>` binds this conversation to the user session.
    if let Some(session_id) = parse_connect(&text) {
        let Some(reference) = activity.conversation_reference() else {
            warn!("connect command without a service URL, ignoring");
            return Ok(());
        };

        state.operator.bind(&session_id, reference.clone());
        state
            .operator
            .reply(
                &reference,
                &format!("✅ Verbunden mit Session: {session_id}. Sie können jetzt chatten."),
            )
            .await?;

        state
            .connections
            .send_to(
                &session_id,
                ClientFrame::system("Ein Mitarbeiter ist dem Chat beigetreten.", None),
            )
            .await;
        return Ok(());
    }

    // Bound conversation: forward to the user transport verbatim.
    if let Some(session_id) = state
        .operator
        .session_for_conversation(&activity.conversation.id)
    {
        info!(session = %session_id, "operator message forwarded to user");
        state
            .connections
            .send_to(&session_id, ClientFrame::agent_message(text))
            .await;
        return Ok(());
    }

    // Unbound conversation: explain how to connect.
    if let Some(reference) = activity.conversation_reference() {
        state.operator.reply(&reference, HELP_TEXT).await?;
    }
    Ok(())
}

//! Review/training backend — /admin/*.
//!
//! Serves the persisted conversation log for later review. Every route is
//! gated on the admin toggle and answers 403 while disabled.

use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

use veil_audit::AuditError;

use crate::app::AppState;

#[derive(Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub skip: usize,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    20
}

#[derive(Deserialize)]
pub struct NoteUpdate {
    pub notes: String,
}

/// GET /admin/sessions — newest sessions first.
pub async fn list_sessions(
    State(state): State<Arc<AppState>>,
    Query(page): Query<Pagination>,
) -> Response {
    if let Some(denied) = guard(&state) {
        return denied;
    }
    match state.audit.list_sessions(page.skip, page.limit).await {
        Ok(sessions) => Json(sessions).into_response(),
        Err(e) => internal_error(e),
    }
}

/// GET /admin/sessions/{session_id} — session with its messages.
pub async fn session_detail(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
) -> Response {
    if let Some(denied) = guard(&state) {
        return denied;
    }
    match state.audit.session_detail(&session_id).await {
        Ok(Some(detail)) => Json(detail).into_response(),
        Ok(None) => not_found(),
        Err(e) => internal_error(e),
    }
}

/// POST /admin/sessions/{session_id}/note — update review notes.
pub async fn update_note(
    State(state): State<Arc<AppState>>,
    Path(session_id): Path<String>,
    Json(update): Json<NoteUpdate>,
) -> Response {
    if let Some(denied) = guard(&state) {
        return denied;
    }
    match state.audit.update_note(&session_id, &update.notes).await {
        Ok(()) => match state.audit.session_detail(&session_id).await {
            Ok(Some(detail)) => Json(detail).into_response(),
            Ok(None) => not_found(),
            Err(e) => internal_error(e),
        },
        Err(AuditError::NotFound { .. }) => not_found(),
        Err(e) => internal_error(e),
    }
}

/// GET /admin/export — all sessions and messages as CSV.
pub async fn export_csv(State(state): State<Arc<AppState>>) -> Response {
    if let Some(denied) = guard(&state) {
        return denied;
    }
    match state.audit.export_csv().await {
        Ok(csv) => (
            [
                (header::CONTENT_TYPE, "text/csv"),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=training_data.csv",
                ),
            ],
            csv,
        )
            .into_response(),
        Err(e) => internal_error(e),
    }
}

fn guard(state: &AppState) -> Option<Response> {
    if state.config.admin.enabled {
        None
    } else {
        Some(
            (
                StatusCode::FORBIDDEN,
                Json(json!({ "detail": "Admin backend disabled" })),
            )
                .into_response(),
        )
    }
}

fn not_found() -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "detail": "Session not found" })),
    )
        .into_response()
}

fn internal_error(e: AuditError) -> Response {
    warn!(error = %e, "admin query failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "detail": "internal error" })),
    )
        .into_response()
}

use axum::{
    routing::{get, post},
    Router,
};
use dashmap::DashMap;
use std::sync::Arc;

use veil_assistant::AssistantClient;
use veil_audit::AuditLog;
use veil_core::config::VeilConfig;
use veil_operator::{EscalationNotifier, OperatorBridge};
use veil_scanner::Scanner;
use veil_vault::Vault;

use crate::connections::ConnectionManager;

/// Central shared state — passed as Arc<AppState> to all Axum handlers.
pub struct AppState {
    pub config: VeilConfig,
    pub vault: Arc<Vault>,
    pub scanner: Scanner,
    pub assistant: AssistantClient,
    pub audit: AuditLog,
    pub operator: OperatorBridge,
    pub notifier: EscalationNotifier,
    pub connections: ConnectionManager,
    /// Per-session turn serialization: one user turn at a time.
    pub turn_locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
}

impl AppState {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: VeilConfig,
        vault: Arc<Vault>,
        scanner: Scanner,
        assistant: AssistantClient,
        audit: AuditLog,
        operator: OperatorBridge,
        notifier: EscalationNotifier,
    ) -> Self {
        Self {
            config,
            vault,
            scanner,
            assistant,
            audit,
            operator,
            notifier,
            connections: ConnectionManager::new(),
            turn_locks: DashMap::new(),
        }
    }
}

/// Assemble the full Axum router.
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route("/chat/message", post(crate::http::chat::message_handler))
        .route("/chat/ws/{session_id}", get(crate::ws::chat::ws_handler))
        .route(
            "/api/messages",
            post(crate::http::operator::messages_handler),
        )
        .route("/admin/sessions", get(crate::http::admin::list_sessions))
        .route(
            "/admin/sessions/{session_id}",
            get(crate::http::admin::session_detail),
        )
        .route(
            "/admin/sessions/{session_id}/note",
            post(crate::http::admin::update_note),
        )
        .route("/admin/export", get(crate::http::admin::export_csv))
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

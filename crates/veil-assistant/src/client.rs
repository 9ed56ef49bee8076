use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{mpsc, Mutex};
use tracing::{info, warn};

use crate::backend::{AssistantBackend, BackendError, CallMetadata};
use crate::stream::StreamEvent;

/// Per-session facade over the LLM backend.
///
/// Conversation handles live in-process for the lifetime of the gateway;
/// they are not persisted across restarts. Creation is guarded by a
/// per-session mutex so two concurrent first messages never open two
/// backend threads for the same session.
pub struct AssistantClient {
    backend: Box<dyn AssistantBackend>,
    threads: DashMap<String, String>,
    creating: DashMap<String, Arc<Mutex<()>>>,
}

impl AssistantClient {
    pub fn new(backend: Box<dyn AssistantBackend>) -> Self {
        Self {
            backend,
            threads: DashMap::new(),
            creating: DashMap::new(),
        }
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    async fn thread_for(&self, session_id: &str) -> Result<String, BackendError> {
        if let Some(thread) = self.threads.get(session_id) {
            return Ok(thread.clone());
        }

        let lock = self
            .creating
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let _guard = lock.lock().await;

        // Double-check under the lock: a racing turn may have won.
        if let Some(thread) = self.threads.get(session_id) {
            return Ok(thread.clone());
        }

        let meta = CallMetadata::for_session(session_id);
        let thread = self.backend.create_thread(&meta).await?;
        info!(session = session_id, thread = %thread, "conversation thread created");
        self.threads.insert(session_id.to_string(), thread.clone());
        Ok(thread)
    }

    /// Post the (already anonymized) prompt and stream the reply's text
    /// deltas through `tx`.
    pub async fn stream(
        &self,
        session_id: &str,
        prompt: &str,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), BackendError> {
        let thread = self.thread_for(session_id).await?;
        let meta = CallMetadata::for_session(session_id);

        info!(
            session = session_id,
            backend = self.backend.name(),
            prompt_len = prompt.len(),
            "starting assistant run"
        );

        self.backend.post_message(&thread, prompt, &meta).await?;
        self.backend.stream_run(&thread, &meta, tx).await
    }

    /// Labeled conversation history for escalation payloads. Empty on any
    /// error; a missing transcript must never block the handoff itself.
    pub async fn history(&self, session_id: &str) -> Vec<String> {
        let Some(thread) = self.threads.get(session_id).map(|t| t.clone()) else {
            return Vec::new();
        };

        match self.backend.list_messages(&thread).await {
            Ok(messages) => messages
                .into_iter()
                .map(|m| format!("{}: {}", capitalize(&m.role), m.text))
                .collect(),
            Err(e) => {
                warn!(session = session_id, error = %e, "failed to fetch thread history");
                Vec::new()
            }
        }
    }
}

fn capitalize(role: &str) -> String {
    let mut chars = role.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

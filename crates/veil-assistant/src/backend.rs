use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;

use crate::stream::StreamEvent;

/// Correlation metadata attached to every backend call so requests can be
/// traced per session in the backend's audit surface.
#[derive(Debug, Clone, Serialize)]
pub struct CallMetadata {
    pub session_id: String,
    pub app: String,
}

impl CallMetadata {
    pub fn for_session(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            app: "veil-gateway".to_string(),
        }
    }
}

/// One message of a backend conversation, in chronological order.
#[derive(Debug, Clone)]
pub struct ThreadMessage {
    pub role: String,
    pub text: String,
}

/// Common interface to the conversational LLM backend.
#[async_trait]
pub trait AssistantBackend: Send + Sync {
    /// Backend name for logging and error messages.
    fn name(&self) -> &str;

    /// Create a new conversation thread; returns its opaque id.
    async fn create_thread(&self, meta: &CallMetadata) -> Result<String, BackendError>;

    /// Append a user message to a thread.
    async fn post_message(
        &self,
        thread_id: &str,
        text: &str,
        meta: &CallMetadata,
    ) -> Result<(), BackendError>;

    /// Start a streaming run on the thread and forward text deltas through
    /// `tx`. Dropping the receiver cancels the run read; implementations
    /// must return instead of blocking on a closed channel.
    async fn stream_run(
        &self,
        thread_id: &str,
        meta: &CallMetadata,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), BackendError>;

    /// Full ordered conversation, oldest first.
    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, BackendError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Rate limited, retry after {retry_after_ms}ms")]
    RateLimited { retry_after_ms: u64 },

    #[error("Backend unavailable: {0}")]
    Unavailable(String),
}

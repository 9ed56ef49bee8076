use async_trait::async_trait;

use crate::activity::ConversationReference;
use crate::error::OperatorError;

/// Transport that can deliver a text message into an operator conversation.
///
/// Implementations must be `Send + Sync` so the bridge can be shared across
/// Tokio tasks. The production implementation speaks the Bot Connector REST
/// API; tests substitute an in-memory recorder.
#[async_trait]
pub trait OperatorChannel: Send + Sync {
    /// Stable lowercase identifier for this transport (e.g. `"botframework"`).
    fn name(&self) -> &str;

    /// Deliver `text` into the conversation identified by `reference`.
    async fn send(
        &self,
        reference: &ConversationReference,
        text: &str,
    ) -> Result<(), OperatorError>;
}

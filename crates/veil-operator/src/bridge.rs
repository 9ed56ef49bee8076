use dashmap::DashMap;
use tracing::{info, warn};

use crate::activity::ConversationReference;
use crate::channel::OperatorChannel;
use crate::error::OperatorError;

/// Links user sessions to operator conversations and forwards messages in
/// both directions. Bindings are in-process only; an operator reconnects
/// with `connect <session-id>` after a gateway restart.
pub struct OperatorBridge {
    channel: Box<dyn OperatorChannel>,
    bindings: DashMap<String, ConversationReference>,
    by_conversation: DashMap<String, String>,
}

impl OperatorBridge {
    pub fn new(channel: Box<dyn OperatorChannel>) -> Self {
        Self {
            channel,
            bindings: DashMap::new(),
            by_conversation: DashMap::new(),
        }
    }

    /// Bind an operator conversation to a user session. Re-binding replaces
    /// the previous operator.
    pub fn bind(&self, session_id: &str, reference: ConversationReference) {
        info!(
            session = session_id,
            conversation = %reference.conversation.id,
            channel = self.channel.name(),
            "operator bound to session"
        );
        self.by_conversation
            .insert(reference.conversation.id.clone(), session_id.to_string());
        self.bindings.insert(session_id.to_string(), reference);
    }

    pub fn is_bound(&self, session_id: &str) -> bool {
        self.bindings.contains_key(session_id)
    }

    /// Which user session does this operator conversation belong to?
    pub fn session_for_conversation(&self, conversation_id: &str) -> Option<String> {
        self.by_conversation
            .get(conversation_id)
            .map(|s| s.clone())
    }

    /// Forward a message to the operator bound to `session_id`.
    pub async fn send_to_operator(
        &self,
        session_id: &str,
        text: &str,
    ) -> Result<(), OperatorError> {
        let reference = self
            .bindings
            .get(session_id)
            .map(|r| r.clone())
            .ok_or_else(|| OperatorError::Unbound {
                session: session_id.to_string(),
            })?;
        self.channel.send(&reference, text).await
    }

    /// Mirror a conversation turn into the bound operator conversation,
    /// tagged with its origin. No binding means nothing to do; delivery
    /// failures are logged and absorbed; the user-facing flow never
    /// depends on the mirror.
    pub async fn mirror(&self, session_id: &str, tag: &str, text: &str) {
        if !self.is_bound(session_id) {
            return;
        }
        if let Err(e) = self
            .send_to_operator(session_id, &format!("{tag} {text}"))
            .await
        {
            warn!(session = session_id, error = %e, "operator mirror failed");
        }
    }

    /// Reply directly into an operator conversation (acks, help text).
    pub async fn reply(
        &self,
        reference: &ConversationReference,
        text: &str,
    ) -> Result<(), OperatorError> {
        self.channel.send(reference, text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::ConversationAccount;
    use async_trait::async_trait;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingChannel {
        sent: Mutex<Vec<(String, String)>>,
    }

    #[async_trait]
    impl OperatorChannel for RecordingChannel {
        fn name(&self) -> &str {
            "recording"
        }

        async fn send(
            &self,
            reference: &ConversationReference,
            text: &str,
        ) -> Result<(), OperatorError> {
            self.sent
                .lock()
                .unwrap()
                .push((reference.conversation.id.clone(), text.to_string()));
            Ok(())
        }
    }

    fn reference(conversation_id: &str) -> ConversationReference {
        ConversationReference {
            conversation: ConversationAccount {
                id: conversation_id.to_string(),
            },
            service_url: "https://smba.example.com/".to_string(),
            bot: None,
            user: None,
        }
    }

    #[tokio::test]
    async fn bind_and_forward() {
        let bridge = OperatorBridge::new(Box::<RecordingChannel>::default());
        assert!(!bridge.is_bound("sess_1"));

        bridge.bind("sess_1", reference("conv-1"));
        assert!(bridge.is_bound("sess_1"));
        assert_eq!(
            bridge.session_for_conversation("conv-1"),
            Some("sess_1".to_string())
        );

        bridge.send_to_operator("sess_1", "Hallo?").await.unwrap();
    }

    #[tokio::test]
    async fn unbound_send_fails() {
        let bridge = OperatorBridge::new(Box::<RecordingChannel>::default());
        let err = bridge.send_to_operator("sess_9", "hi").await.unwrap_err();
        assert!(matches!(err, OperatorError::Unbound { .. }));
    }

    #[tokio::test]
    async fn mirror_tags_and_skips_unbound() {
        let channel = Box::<RecordingChannel>::default();
        let bridge = OperatorBridge::new(channel);

        // no binding, silently skipped
        bridge.mirror("sess_1", "[USER]", "Hallo").await;

        bridge.bind("sess_1", reference("conv-1"));
        bridge.mirror("sess_1", "[USER]", "Hallo").await;
        bridge.mirror("sess_1", "[BOT]", "Guten Tag!").await;
    }

    #[tokio::test]
    async fn rebinding_replaces_operator() {
        let bridge = OperatorBridge::new(Box::<RecordingChannel>::default());
        bridge.bind("sess_1", reference("conv-1"));
        bridge.bind("sess_1", reference("conv-2"));

        assert_eq!(
            bridge.session_for_conversation("conv-2"),
            Some("sess_1".to_string())
        );
    }
}

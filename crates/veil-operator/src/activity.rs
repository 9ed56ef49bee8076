//! Bot-framework activity envelope — only the fields this gateway consumes.

use serde::{Deserialize, Serialize};

/// Inbound/outbound activity.
/// Wire: `{ "type": "message", "text": "...", "conversation": {"id": "..."}, ... }`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Activity {
    #[serde(rename = "type")]
    pub activity_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<ChannelAccount>,
    pub conversation: ConversationAccount,
    #[serde(rename = "serviceUrl", default, skip_serializing_if = "Option::is_none")]
    pub service_url: Option<String>,
    #[serde(rename = "channelId", default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    #[serde(rename = "replyToId", default, skip_serializing_if = "Option::is_none")]
    pub reply_to_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelAccount {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationAccount {
    pub id: String,
}

/// Everything needed to continue a conversation proactively later.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationReference {
    pub conversation: ConversationAccount,
    pub service_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bot: Option<ChannelAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<ChannelAccount>,
}

impl Activity {
    pub fn is_message(&self) -> bool {
        self.activity_type == "message"
    }

    /// Capture the reference for proactive replies. The service URL is
    /// mandatory — without it there is no way back into the conversation.
    pub fn conversation_reference(&self) -> Option<ConversationReference> {
        let service_url = self.service_url.clone()?;
        Some(ConversationReference {
            conversation: self.conversation.clone(),
            service_url,
            // From the bot's perspective, the activity's recipient is the
            // bot itself and `from` is the operator.
            bot: self.recipient.clone(),
            user: self.from.clone(),
        })
    }

    /// Build an outbound message activity for a known reference.
    pub fn message_for(reference: &ConversationReference, text: &str) -> Self {
        Self {
            activity_type: "message".to_string(),
            text: Some(text.to_string()),
            from: reference.bot.clone(),
            recipient: reference.user.clone(),
            conversation: reference.conversation.clone(),
            service_url: Some(reference.service_url.clone()),
            channel_id: None,
            reply_to_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"{
        "type": "message",
        "id": "act-1",
        "text": "connect sess_42",
        "from": {"id": "op-1", "name": "Alex"},
        "recipient": {"id": "bot-1", "name": "veil"},
        "conversation": {"id": "conv-99"},
        "serviceUrl": "https://smba.example.com/emea/",
        "channelId": "msteams"
    }"#;

    #[test]
    fn deserializes_operator_message() {
        let activity: Activity = serde_json::from_str(SAMPLE).unwrap();
        assert!(activity.is_message());
        assert_eq!(activity.text.as_deref(), Some("connect sess_42"));
        assert_eq!(activity.conversation.id, "conv-99");
    }

    #[test]
    fn reference_swaps_bot_and_user() {
        let activity: Activity = serde_json::from_str(SAMPLE).unwrap();
        let reference = activity.conversation_reference().unwrap();
        assert_eq!(reference.service_url, "https://smba.example.com/emea/");
        assert_eq!(reference.bot.unwrap().id, "bot-1");
        assert_eq!(reference.user.unwrap().id, "op-1");
    }

    #[test]
    fn reference_requires_service_url() {
        let activity = Activity {
            activity_type: "message".to_string(),
            text: None,
            from: None,
            recipient: None,
            conversation: ConversationAccount { id: "c".into() },
            service_url: None,
            channel_id: None,
            reply_to_id: None,
        };
        assert!(activity.conversation_reference().is_none());
    }

    #[test]
    fn outbound_message_shape() {
        let activity: Activity = serde_json::from_str(SAMPLE).unwrap();
        let reference = activity.conversation_reference().unwrap();
        let out = Activity::message_for(&reference, "Hallo Operator");

        let json = serde_json::to_string(&out).unwrap();
        assert!(json.contains(r#""type":"message""#));
        assert!(json.contains(r#""text":"Hallo Operator""#));
        assert!(json.contains(r#""conversation":{"id":"conv-99"}"#));
    }

    #[test]
    fn non_message_activities_are_recognized() {
        let json = r#"{"type": "conversationUpdate", "conversation": {"id": "c1"}}"#;
        let activity: Activity = serde_json::from_str(json).unwrap();
        assert!(!activity.is_message());
    }
}

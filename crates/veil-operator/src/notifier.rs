//! One-way escalation webhook: posts an Adaptive Card with the session id
//! and the anonymized transcript so an operator can pick up the chat.

use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::OperatorError;

pub struct EscalationNotifier {
    client: reqwest::Client,
    webhook_url: String,
}

impl EscalationNotifier {
    pub fn new(webhook_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }

    /// Post the escalation card. A missing webhook URL makes this a no-op
    /// so local setups without an operator channel keep working.
    pub async fn notify_escalation(
        &self,
        session_id: &str,
        chat_history: &[String],
    ) -> Result<(), OperatorError> {
        if self.webhook_url.is_empty() {
            debug!(session = session_id, "no webhook configured, skipping escalation notice");
            return Ok(());
        }

        let payload = escalation_card(session_id, chat_history);
        let resp = self
            .client
            .post(&self.webhook_url)
            .json(&payload)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            warn!(session = session_id, status, "escalation webhook rejected");
            return Err(OperatorError::Delivery(format!(
                "webhook returned status {status}"
            )));
        }

        Ok(())
    }
}

fn escalation_card(session_id: &str, chat_history: &[String]) -> Value {
    json!({
        "type": "message",
        "attachments": [{
            "contentType": "application/vnd.microsoft.card.adaptive",
            "contentUrl": null,
            "content": {
                "$schema": "http://adaptivecards.io/schemas/adaptive-card.json",
                "type": "AdaptiveCard",
                "version": "1.4",
                "body": [
                    {
                        "type": "TextBlock",
                        "size": "Large",
                        "weight": "Bolder",
                        "text": "Eskalation erforderlich"
                    },
                    {
                        "type": "TextBlock",
                        "text": format!("Session ID: {session_id}"),
                        "wrap": true
                    },
                    { "type": "TextBlock", "text": "Verlauf:", "wrap": true },
                    {
                        "type": "TextBlock",
                        "text": chat_history.join("\n"),
                        "wrap": true
                    }
                ]
            }
        }]
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn card_carries_session_and_history() {
        let card = escalation_card(
            "sess_42",
            &["User: Hallo".to_string(), "Assistant: Hi".to_string()],
        );

        let body = &card["attachments"][0]["content"]["body"];
        assert_eq!(body[0]["text"], "Eskalation erforderlich");
        assert_eq!(body[1]["text"], "Session ID: sess_42");
        assert_eq!(body[3]["text"], "User: Hallo\nAssistant: Hi");
    }

    #[tokio::test]
    async fn missing_webhook_is_a_noop() {
        let notifier = EscalationNotifier::new(String::new());
        notifier
            .notify_escalation("sess_1", &["User: Hallo".to_string()])
            .await
            .unwrap();
    }
}

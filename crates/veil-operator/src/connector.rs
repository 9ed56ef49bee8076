//! Bot Connector REST transport with client-credentials authentication.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::activity::{Activity, ConversationReference};
use crate::channel::OperatorChannel;
use crate::error::OperatorError;

const LOGIN_URL: &str = "https://login.microsoftonline.com/botframework.com/oauth2/v2.0/token";
const TOKEN_SCOPE: &str = "https://api.botframework.com/.default";
/// Refresh slack so a token is never used right at its expiry edge.
const TOKEN_SLACK_SECS: u64 = 60;

struct CachedToken {
    access_token: String,
    expires_at: Instant,
}

/// Sends activities into operator conversations via
/// `POST {service_url}/v3/conversations/{id}/activities`.
///
/// Tokens are fetched with the app-id/app-password client-credentials grant
/// and cached until shortly before expiry. With no app-id configured the
/// request goes out unauthenticated — the local emulator accepts that.
pub struct BotConnectorChannel {
    client: reqwest::Client,
    app_id: String,
    app_password: String,
    token: Mutex<Option<CachedToken>>,
}

impl BotConnectorChannel {
    pub fn new(app_id: String, app_password: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            app_id,
            app_password,
            token: Mutex::new(None),
        }
    }

    async fn bearer_token(&self) -> Result<Option<String>, OperatorError> {
        if self.app_id.is_empty() {
            return Ok(None);
        }

        let mut cached = self.token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at > Instant::now() {
                return Ok(Some(token.access_token.clone()));
            }
        }

        debug!("fetching bot connector token");
        let resp = self
            .client
            .post(LOGIN_URL)
            .form(&[
                ("grant_type", "client_credentials"),
                ("client_id", self.app_id.as_str()),
                ("client_secret", self.app_password.as_str()),
                ("scope", TOKEN_SCOPE),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            warn!(status, body = %body, "token request rejected");
            return Err(OperatorError::Auth(format!("status {status}")));
        }

        let token: TokenResponse = resp
            .json()
            .await
            .map_err(|e| OperatorError::Auth(e.to_string()))?;

        let lifetime = token.expires_in.saturating_sub(TOKEN_SLACK_SECS);
        *cached = Some(CachedToken {
            access_token: token.access_token.clone(),
            expires_at: Instant::now() + Duration::from_secs(lifetime),
        });
        Ok(Some(token.access_token))
    }
}

#[derive(Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[async_trait]
impl OperatorChannel for BotConnectorChannel {
    fn name(&self) -> &str {
        "botframework"
    }

    async fn send(
        &self,
        reference: &ConversationReference,
        text: &str,
    ) -> Result<(), OperatorError> {
        let url = format!(
            "{}/v3/conversations/{}/activities",
            reference.service_url.trim_end_matches('/'),
            reference.conversation.id
        );

        let activity = Activity::message_for(reference, text);
        let mut request = self.client.post(&url).json(&activity);
        if let Some(token) = self.bearer_token().await? {
            request = request.bearer_auth(token);
        }

        let resp = request.send().await?;
        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(OperatorError::Delivery(format!("status {status}: {body}")));
        }

        debug!(conversation = %reference.conversation.id, "activity delivered");
        Ok(())
    }
}

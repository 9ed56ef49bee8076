//! OpenAI Assistants v2 backend: one thread per gateway session, streaming
//! runs consumed as SSE.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::backend::{AssistantBackend, BackendError, CallMetadata, ThreadMessage};
use crate::stream::{parse_sse_line, SseParsed, StreamEvent};

pub struct OpenAiAssistantBackend {
    client: reqwest::Client,
    api_key: String,
    assistant_id: String,
    base_url: String,
}

impl OpenAiAssistantBackend {
    pub fn new(api_key: String, assistant_id: String, base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            assistant_id,
            base_url,
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
            .header("content-type", "application/json")
    }

    fn get(&self, path: &str) -> reqwest::RequestBuilder {
        self.client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("OpenAI-Beta", "assistants=v2")
    }
}

async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response, BackendError> {
    let status = resp.status().as_u16();
    if status == 429 {
        let retry = resp
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok())
            .map(|s| s * 1000)
            .unwrap_or(5000);
        return Err(BackendError::RateLimited {
            retry_after_ms: retry,
        });
    }
    if !resp.status().is_success() {
        let message = resp.text().await.unwrap_or_default();
        warn!(status, body = %message, "assistant API error");
        return Err(BackendError::Api { status, message });
    }
    Ok(resp)
}

#[async_trait]
impl AssistantBackend for OpenAiAssistantBackend {
    fn name(&self) -> &str {
        "openai-assistants"
    }

    async fn create_thread(&self, meta: &CallMetadata) -> Result<String, BackendError> {
        let resp = self
            .post("/v1/threads")
            .json(&json!({ "metadata": meta }))
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let created: CreatedObject = resp
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;
        debug!(thread = %created.id, "thread created");
        Ok(created.id)
    }

    async fn post_message(
        &self,
        thread_id: &str,
        text: &str,
        meta: &CallMetadata,
    ) -> Result<(), BackendError> {
        let resp = self
            .post(&format!("/v1/threads/{thread_id}/messages"))
            .json(&json!({
                "role": "user",
                "content": text,
                "metadata": meta,
            }))
            .send()
            .await?;
        check_status(resp).await?;
        Ok(())
    }

    async fn stream_run(
        &self,
        thread_id: &str,
        meta: &CallMetadata,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), BackendError> {
        let resp = self
            .post(&format!("/v1/threads/{thread_id}/runs"))
            .json(&json!({
                "assistant_id": self.assistant_id,
                "stream": true,
                "metadata": meta,
            }))
            .send()
            .await?;
        let resp = check_status(resp).await?;

        process_run_stream(resp, tx).await;
        Ok(())
    }

    async fn list_messages(&self, thread_id: &str) -> Result<Vec<ThreadMessage>, BackendError> {
        let resp = self
            .get(&format!(
                "/v1/threads/{thread_id}/messages?order=asc&limit=100"
            ))
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let list: MessageList = resp
            .json()
            .await
            .map_err(|e| BackendError::Parse(e.to_string()))?;

        Ok(list
            .data
            .into_iter()
            .filter_map(|m| {
                let text = m.first_text()?;
                Some(ThreadMessage { role: m.role, text })
            })
            .collect())
    }
}

/// Parse the run's SSE response and forward text deltas. Returns when the
/// run finishes, the HTTP stream ends, or the receiver is dropped.
async fn process_run_stream(resp: reqwest::Response, tx: mpsc::Sender<StreamEvent>) {
    use futures_util::StreamExt;

    let mut current_event = String::new();
    let mut line_buf = String::new();
    let mut byte_stream = resp.bytes_stream();

    while let Some(chunk) = byte_stream.next().await {
        let chunk = match chunk {
            Ok(c) => c,
            Err(e) => {
                let _ = tx
                    .send(StreamEvent::Error {
                        message: e.to_string(),
                    })
                    .await;
                return;
            }
        };

        let text = match std::str::from_utf8(&chunk) {
            Ok(t) => t,
            Err(_) => continue,
        };

        // SSE arrives as lines split by newlines; keep the incomplete last
        // line in the buffer.
        line_buf.push_str(text);
        let lines: Vec<&str> = line_buf.split('\n').collect();
        let (complete, remainder) = lines.split_at(lines.len() - 1);
        let remainder = remainder.first().unwrap_or(&"").to_string();

        for line in complete {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }

            match parse_sse_line(line) {
                Some(SseParsed::Event(ev)) => current_event = ev,
                Some(SseParsed::Data(data)) => {
                    if data == "[DONE]" {
                        let _ = tx.send(StreamEvent::Done).await;
                        return;
                    }
                    if let Some(event) = parse_data_block(&current_event, &data) {
                        let terminal = !matches!(event, StreamEvent::TextDelta { .. });
                        if tx.send(event).await.is_err() {
                            return; // receiver dropped, stop reading the run
                        }
                        if terminal {
                            return;
                        }
                    }
                }
                None => {}
            }
        }

        line_buf = remainder;
    }

    let _ = tx.send(StreamEvent::Done).await;
}

fn parse_data_block(event_type: &str, data: &str) -> Option<StreamEvent> {
    match event_type {
        "thread.message.delta" => {
            let delta: MessageDeltaData = serde_json::from_str(data).ok()?;
            let text: String = delta
                .delta
                .content
                .into_iter()
                .filter_map(|c| c.text.and_then(|t| t.value))
                .collect();
            if text.is_empty() {
                None
            } else {
                Some(StreamEvent::TextDelta { text })
            }
        }

        "thread.run.completed" => Some(StreamEvent::Done),

        "thread.run.failed" | "thread.run.expired" | "error" => {
            let message = serde_json::from_str::<RunFailedData>(data)
                .ok()
                .and_then(|d| d.last_error)
                .map(|e| e.message)
                .unwrap_or_else(|| data.to_string());
            warn!(event = event_type, %message, "assistant run failed");
            Some(StreamEvent::Error { message })
        }

        // thread.run.created, step events, message.created need no action
        _ => None,
    }
}

// OpenAI SSE / REST data types (private, deserialization only)

#[derive(Deserialize)]
struct CreatedObject {
    id: String,
}

#[derive(Deserialize)]
struct MessageDeltaData {
    delta: MessageDeltaInner,
}

#[derive(Deserialize)]
struct MessageDeltaInner {
    #[serde(default)]
    content: Vec<DeltaContent>,
}

#[derive(Deserialize)]
struct DeltaContent {
    /// Populated for `text` content parts.
    text: Option<TextValue>,
}

#[derive(Deserialize)]
struct TextValue {
    value: Option<String>,
}

#[derive(Deserialize)]
struct RunFailedData {
    last_error: Option<LastError>,
}

#[derive(Deserialize)]
struct LastError {
    message: String,
}

#[derive(Deserialize)]
struct MessageList {
    data: Vec<ApiMessage>,
}

#[derive(Deserialize)]
struct ApiMessage {
    role: String,
    #[serde(default)]
    content: Vec<ApiContent>,
}

impl ApiMessage {
    fn first_text(&self) -> Option<String> {
        self.content
            .iter()
            .find_map(|c| c.text.as_ref().and_then(|t| t.value.clone()))
    }
}

#[derive(Deserialize)]
struct ApiContent {
    text: Option<TextValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_delta_extracts_text() {
        let data = r#"{"id":"msg_1","delta":{"content":[{"index":0,"type":"text","text":{"value":"Hallo"}}]}}"#;
        match parse_data_block("thread.message.delta", data) {
            Some(StreamEvent::TextDelta { text }) => assert_eq!(text, "Hallo"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn run_completed_is_done() {
        assert!(matches!(
            parse_data_block("thread.run.completed", "{}"),
            Some(StreamEvent::Done)
        ));
    }

    #[test]
    fn run_failed_carries_message() {
        let data = r#"{"last_error":{"code":"server_error","message":"boom"}}"#;
        match parse_data_block("thread.run.failed", data) {
            Some(StreamEvent::Error { message }) => assert_eq!(message, "boom"),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn unrelated_events_are_ignored() {
        assert!(parse_data_block("thread.run.created", "{}").is_none());
        assert!(parse_data_block("thread.run.step.delta", "{}").is_none());
    }
}

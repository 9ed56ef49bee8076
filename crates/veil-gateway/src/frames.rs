use serde::{Deserialize, Serialize};

/// Server → client WebSocket frame.
/// Wire: `{ "type": "chunk", "text": "...", "status": "...", "sender": "..." }`
/// with `type ∈ {chunk, done, system, agent_message, error}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientFrame {
    #[serde(rename = "type")]
    pub frame_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender: Option<String>,
}

impl ClientFrame {
    pub fn chunk(text: impl Into<String>) -> Self {
        Self {
            frame_type: "chunk".to_string(),
            text: Some(text.into()),
            status: None,
            sender: None,
        }
    }

    pub fn done() -> Self {
        Self {
            frame_type: "done".to_string(),
            text: None,
            status: None,
            sender: None,
        }
    }

    pub fn system(text: impl Into<String>, status: Option<&str>) -> Self {
        Self {
            frame_type: "system".to_string(),
            text: Some(text.into()),
            status: status.map(String::from),
            sender: None,
        }
    }

    pub fn agent_message(text: impl Into<String>) -> Self {
        Self {
            frame_type: "agent_message".to_string(),
            text: Some(text.into()),
            status: None,
            sender: Some("Agent".to_string()),
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            frame_type: "error".to_string(),
            text: Some(text.into()),
            status: None,
            sender: None,
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_wire_shape() {
        let json = ClientFrame::chunk("Hallo").to_json();
        assert!(json.contains(r#""type":"chunk""#));
        assert!(json.contains(r#""text":"Hallo""#));
        // unset fields stay off the wire
        assert!(!json.contains("status"));
        assert!(!json.contains("sender"));
    }

    #[test]
    fn system_frame_carries_status() {
        let json = ClientFrame::system("Ein Mitarbeiter übernimmt.", Some("ESKALATION")).to_json();
        assert!(json.contains(r#""type":"system""#));
        assert!(json.contains(r#""status":"ESKALATION""#));
    }

    #[test]
    fn agent_message_is_tagged() {
        let frame = ClientFrame::agent_message("Guten Tag!");
        assert_eq!(frame.sender.as_deref(), Some("Agent"));
    }
}

/// Events emitted while streaming a model reply.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// Incremental text content from the model.
    TextDelta { text: String },

    /// Stream completed successfully.
    Done,

    /// Error during streaming.
    Error { message: String },
}

/// Parse a single SSE line from the backend's streaming API.
/// SSE format: `event: <type>\ndata: <json>\n\n`
pub fn parse_sse_line(line: &str) -> Option<SseParsed> {
    if let Some(event_type) = line.strip_prefix("event: ") {
        Some(SseParsed::Event(event_type.to_string()))
    } else {
        line.strip_prefix("data: ")
            .map(|data| SseParsed::Data(data.to_string()))
    }
}

#[derive(Debug)]
pub enum SseParsed {
    Event(String),
    Data(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_event_and_data_lines() {
        match parse_sse_line("event: thread.message.delta") {
            Some(SseParsed::Event(e)) => assert_eq!(e, "thread.message.delta"),
            other => panic!("unexpected: {other:?}"),
        }
        match parse_sse_line("data: {\"id\":\"msg_1\"}") {
            Some(SseParsed::Data(d)) => assert_eq!(d, "{\"id\":\"msg_1\"}"),
            other => panic!("unexpected: {other:?}"),
        }
        assert!(parse_sse_line(": keep-alive").is_none());
    }
}

use std::sync::LazyLock;

use regex::Regex;

/// `connect <session-id>`, case-insensitive. Session ids are opaque
/// `sess_` tokens handed out by the user transport.
static CONNECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)connect\s+(sess_[A-Za-z0-9]+)").expect("invalid regex"));

/// Reply for messages in a conversation with no bound session.
pub const HELP_TEXT: &str =
    "⚠️ Nicht verbunden. Bitte antworten Sie mit 'connect <session_id>', um einen Chat zu übernehmen.";

/// Extract the session id from a connect command, if the text contains one.
pub fn parse_connect(text: &str) -> Option<String> {
    CONNECT_RE
        .captures(text)
        .map(|caps| caps[1].to_string())
}

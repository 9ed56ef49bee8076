use serde::{Deserialize, Serialize};
use std::fmt;

/// Handling mode of a session. Absence in the store means AI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionMode {
    #[default]
    Ai,
    Human,
}

impl SessionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionMode::Ai => "AI",
            SessionMode::Human => "HUMAN",
        }
    }
}

impl fmt::Display for SessionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "AI" => Ok(SessionMode::Ai),
            "HUMAN" => Ok(SessionMode::Human),
            other => Err(format!("unknown session mode: {}", other)),
        }
    }
}

/// Author of an audit record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn mode_round_trip() {
        assert_eq!(SessionMode::from_str("AI").unwrap(), SessionMode::Ai);
        assert_eq!(SessionMode::from_str("HUMAN").unwrap(), SessionMode::Human);
        assert_eq!(SessionMode::Human.to_string(), "HUMAN");
        assert!(SessionMode::from_str("robot").is_err());
    }

    #[test]
    fn mode_defaults_to_ai() {
        assert_eq!(SessionMode::default(), SessionMode::Ai);
    }
}

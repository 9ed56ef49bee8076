//! Placeholder grammar: `<LABEL_xxxxxxxx>` — uppercase entity kind plus an
//! 8-char lowercase-hex suffix. The exact shape is a wire contract shared
//! with the stream restorer and operator tooling.

use std::sync::LazyLock;

use regex::Regex;
use uuid::Uuid;

/// Matches any placeholder substring inside a larger text.
pub static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<[A-Z]+_[0-9a-f]+>").expect("invalid regex"));

static EXACT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^<[A-Z]+_[0-9a-f]+>$").expect("invalid regex"));

const SUFFIX_LEN: usize = 8;

/// Mint a fresh placeholder for `label`. The suffix comes from a v4 UUID,
/// so the randomness is CSPRNG-backed.
pub fn mint(label: &str) -> String {
    let hex = Uuid::new_v4().simple().to_string();
    format!("<{}_{}>", label.to_uppercase(), &hex[..SUFFIX_LEN])
}

/// True when `s` is exactly one placeholder, nothing more.
pub fn is_placeholder(s: &str) -> bool {
    EXACT_RE.is_match(s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn minted_placeholder_matches_grammar() {
        let p = mint("person");
        assert!(is_placeholder(&p), "bad placeholder: {p}");
        assert!(p.starts_with("<PERSON_"));
        assert_eq!(p.len(), "<PERSON_>".len() + SUFFIX_LEN);
    }

    #[test]
    fn labels_are_uppercased() {
        assert!(mint("organization").starts_with("<ORGANIZATION_"));
        assert!(mint("EMAIL").starts_with("<EMAIL_"));
    }

    #[test]
    fn exact_match_rejects_noise() {
        assert!(is_placeholder("<EMAIL_abc12345>"));
        assert!(!is_placeholder("x<EMAIL_abc12345>"));
        assert!(!is_placeholder("<EMAIL_abc12345> "));
        assert!(!is_placeholder("<email_abc12345>"));
        assert!(!is_placeholder("<EMAIL_ABC12345>"));
        assert!(!is_placeholder("<br>"));
        assert!(!is_placeholder("<EMAIL>"));
    }

    #[test]
    fn find_inside_text() {
        let text = "Hallo <PERSON_0a1b2c3d>, alles klar?";
        let m = PLACEHOLDER_RE.find(text).unwrap();
        assert_eq!(m.as_str(), "<PERSON_0a1b2c3d>");
    }
}

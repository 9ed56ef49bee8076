use std::ops::Range;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, instrument};

use veil_vault::placeholder::PLACEHOLDER_RE;
use veil_vault::Vault;

use crate::detector::EntityDetector;
use crate::error::ScanError;

/// Entity kinds requested from the detector.
pub const DETECTOR_LABELS: [&str; 3] = ["person", "organization", "city"];

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("invalid regex")
});

/// Loose international phone pattern, tuned for recall over precision.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\+?\d{1,3}[\s\-]?)?(?:\(?\d{2,5}\)?[\s\-]?)?\d[\d\s\-]{5,}\d")
        .expect("invalid regex")
});

/// De-identification pipeline: regex phase for well-shaped PII (emails,
/// phone numbers), detector phase for named entities. Every redacted span
/// is stored in the vault and replaced by its placeholder.
pub struct Scanner {
    vault: Arc<Vault>,
    detector: Arc<dyn EntityDetector>,
    score_threshold: f32,
}

impl Scanner {
    pub fn new(vault: Arc<Vault>, detector: Arc<dyn EntityDetector>, score_threshold: f32) -> Self {
        Self {
            vault,
            detector,
            score_threshold,
        }
    }

    /// Replace all detected PII in `text` with vault placeholders.
    ///
    /// Every `<LABEL_hex>` substring in the returned text resolves via the
    /// vault. A vault failure aborts the whole clean; the caller must not
    /// forward the partially-redacted text anywhere.
    #[instrument(skip(self, text), fields(len = text.len()))]
    pub async fn clean(&self, text: &str) -> Result<String, ScanError> {
        // Phase 1: regex. Emails first so the phone pattern never fires on
        // digits inside an address.
        let text = self.substitute_matches(text, &EMAIL_RE, "EMAIL").await?;
        let text = self.substitute_matches(&text, &PHONE_RE, "PHONE").await?;

        // Phase 2: detector entities over the already regex-cleaned text.
        let entities = self
            .detector
            .predict(&text, &DETECTOR_LABELS)
            .await
            .map_err(|e| ScanError::Detector(e.to_string()))?;

        debug!(count = entities.len(), "detector returned entities");

        let mut chars: Vec<char> = text.chars().collect();
        let regions = placeholder_regions(&text);

        let mut kept: Vec<_> = entities
            .into_iter()
            .filter(|e| e.score >= self.score_threshold)
            .filter(|e| e.start < e.end && e.end <= chars.len())
            .collect();
        // Substitute back-to-front so earlier offsets stay valid.
        kept.sort_by(|a, b| b.start.cmp(&a.start));

        for entity in kept {
            // A span intersecting an already-placed placeholder is dropped.
            // Placeholders are opaque and must never be re-vaulted or nested.
            if regions
                .iter()
                .any(|r| entity.start < r.end && r.start < entity.end)
            {
                debug!(label = %entity.label, "dropping entity overlapping a placeholder");
                continue;
            }

            let original: String = chars[entity.start..entity.end].iter().collect();
            let placeholder = self.vault.store(&original, &entity.label).await?;
            chars.splice(entity.start..entity.end, placeholder.chars());
        }

        Ok(chars.into_iter().collect())
    }

    /// Store every match of `re` under `label` and splice in the
    /// placeholders, back-to-front. Matches are collected up front because
    /// vault writes are awaited inside the loop.
    ///
    /// Matches intersecting a placeholder from an earlier pass are skipped:
    /// a digit-heavy suffix would otherwise trip the phone pattern and nest
    /// placeholders.
    async fn substitute_matches(
        &self,
        text: &str,
        re: &Regex,
        label: &str,
    ) -> Result<String, ScanError> {
        let taken: Vec<Range<usize>> = PLACEHOLDER_RE.find_iter(text).map(|m| m.range()).collect();
        let matches: Vec<(Range<usize>, String)> = re
            .find_iter(text)
            .filter(|m| {
                !taken
                    .iter()
                    .any(|r| m.start() < r.end && r.start < m.end())
            })
            .map(|m| (m.range(), m.as_str().to_string()))
            .collect();

        let mut out = text.to_string();
        for (range, original) in matches.into_iter().rev() {
            let placeholder = self.vault.store(&original, label).await?;
            out.replace_range(range, &placeholder);
        }
        Ok(out)
    }
}

/// Character ranges of placeholders already present in `text`.
fn placeholder_regions(text: &str) -> Vec<Range<usize>> {
    PLACEHOLDER_RE
        .find_iter(text)
        .map(|m| {
            let start = text[..m.start()].chars().count();
            // Placeholders are pure ASCII, so the char length equals the
            // byte length of the match.
            start..start + m.len()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detector::{Entity, NoopDetector, StaticDetector};
    use veil_vault::{MemoryStore, Vault};

    fn vault() -> Arc<Vault> {
        Arc::new(Vault::new(Arc::new(MemoryStore::new()), 3600, 86_400))
    }

    fn scanner_with(detector: Arc<dyn EntityDetector>) -> (Scanner, Arc<Vault>) {
        let v = vault();
        (Scanner::new(v.clone(), detector, 0.7), v)
    }

    #[tokio::test]
    async fn email_is_redacted_and_resolvable() {
        let (scanner, vault) = scanner_with(Arc::new(NoopDetector));
        let out = scanner
            .clean("Meine Email ist peter@example.com, danke!")
            .await
            .unwrap();

        assert!(!out.contains("peter@example.com"));
        assert!(out.contains("<EMAIL_"));

        let m = PLACEHOLDER_RE.find(&out).unwrap();
        assert_eq!(vault.get(m.as_str()).await, "peter@example.com");
    }

    #[tokio::test]
    async fn phone_is_redacted() {
        let (scanner, _) = scanner_with(Arc::new(NoopDetector));
        let out = scanner
            .clean("Rufen Sie mich an: +49 170 1234567")
            .await
            .unwrap();
        assert!(!out.contains("1234567"));
        assert!(out.contains("<PHONE_"));
    }

    #[tokio::test]
    async fn detector_entity_is_redacted() {
        let detector = StaticDetector::new(vec![Entity {
            start: 14,
            end: 26,
            label: "person".to_string(),
            score: 0.95,
        }]);
        let (scanner, vault) = scanner_with(Arc::new(detector));
        // offsets 14..26 = "Peter Müller" (char offsets)
        let out = scanner.clean("Mein Name ist Peter Müller.").await.unwrap();

        assert!(!out.contains("Peter"));
        assert!(out.contains("<PERSON_"));
        let m = PLACEHOLDER_RE.find(&out).unwrap();
        assert_eq!(vault.get(m.as_str()).await, "Peter Müller");
    }

    #[tokio::test]
    async fn low_score_entities_are_kept_verbatim() {
        let detector = StaticDetector::new(vec![Entity {
            start: 0,
            end: 5,
            label: "person".to_string(),
            score: 0.42,
        }]);
        let (scanner, _) = scanner_with(Arc::new(detector));
        let out = scanner.clean("Peter war hier").await.unwrap();
        assert_eq!(out, "Peter war hier");
    }

    #[tokio::test]
    async fn out_of_bounds_entities_are_dropped() {
        let detector = StaticDetector::new(vec![Entity {
            start: 2,
            end: 999,
            label: "city".to_string(),
            score: 0.99,
        }]);
        let (scanner, _) = scanner_with(Arc::new(detector));
        let out = scanner.clean("in Berlin").await.unwrap();
        assert_eq!(out, "in Berlin");
    }

    #[tokio::test]
    async fn multiple_entities_substituted_back_to_front() {
        // "Peter trifft Anna": person spans at 0..5 and 13..17.
        let detector = StaticDetector::new(vec![
            Entity {
                start: 0,
                end: 5,
                label: "person".to_string(),
                score: 0.9,
            },
            Entity {
                start: 13,
                end: 17,
                label: "person".to_string(),
                score: 0.9,
            },
        ]);
        let (scanner, vault) = scanner_with(Arc::new(detector));
        let out = scanner.clean("Peter trifft Anna").await.unwrap();

        let placeholders: Vec<&str> = PLACEHOLDER_RE.find_iter(&out).map(|m| m.as_str()).collect();
        assert_eq!(placeholders.len(), 2);
        assert_eq!(vault.get(placeholders[0]).await, "Peter");
        assert_eq!(vault.get(placeholders[1]).await, "Anna");
        assert!(out.contains(" trifft "));
    }

    #[tokio::test]
    async fn entity_overlapping_placeholder_is_dropped() {
        // The email becomes a placeholder in phase 1; a detector span that
        // intersects it must be ignored.
        let detector = StaticDetector::new(vec![Entity {
            start: 0,
            end: 12,
            label: "person".to_string(),
            score: 0.99,
        }]);
        let (scanner, _) = scanner_with(Arc::new(detector));
        let out = scanner.clean("a@example.com").await.unwrap();

        let placeholders: Vec<&str> = PLACEHOLDER_RE.find_iter(&out).map(|m| m.as_str()).collect();
        assert_eq!(placeholders.len(), 1);
        assert!(placeholders[0].starts_with("<EMAIL_"));
    }

    #[tokio::test]
    async fn no_redaction_pattern_survives_clean() {
        let (scanner, _) = scanner_with(Arc::new(NoopDetector));
        let out = scanner
            .clean("Kontakt: max.mustermann@firma.de oder 030 12345678")
            .await
            .unwrap();
        assert!(!out.contains("max.mustermann@firma.de"));
        assert!(!out.contains("12345678"));
        assert!(EMAIL_RE.find(&out).is_none());
    }

    #[tokio::test]
    async fn regex_phases_never_nest_placeholders() {
        let (scanner, _) = scanner_with(Arc::new(NoopDetector));
        let out = scanner.clean("a@b.de und 0170 5551234").await.unwrap();
        for m in PLACEHOLDER_RE.find_iter(&out) {
            assert!(
                !m.as_str()[1..].contains('<'),
                "nested placeholder in {out}"
            );
        }
        assert_eq!(PLACEHOLDER_RE.find_iter(&out).count(), 2);
    }
}

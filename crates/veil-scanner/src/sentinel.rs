//! Escalation sentinel handling. The backend prompt instructs the model to
//! emit a literal marker when it cannot help; the gateway reacts to it and
//! keeps it out of the user-visible stream.

/// Literal marker embedded in model output to request human handoff.
pub const ESCALATION_SENTINEL: &str = "ESKALATION_NOETIG";

/// Detects the sentinel in the raw (anonymized) model stream, even when it
/// is split across fragments. Carries at most `len(sentinel) - 1` trailing
/// characters between fragments.
pub struct EscalationDetector {
    carry: String,
    fired: bool,
}

impl EscalationDetector {
    pub fn new() -> Self {
        Self {
            carry: String::new(),
            fired: false,
        }
    }

    /// Scan one fragment. Returns true exactly once — the first time the
    /// concatenated stream is known to contain the sentinel.
    pub fn scan(&mut self, fragment: &str) -> bool {
        if self.fired {
            return false;
        }

        let mut window = std::mem::take(&mut self.carry);
        window.push_str(fragment);

        if window.contains(ESCALATION_SENTINEL) {
            self.fired = true;
            return true;
        }

        let keep = ESCALATION_SENTINEL.len() - 1;
        let tail_start = window
            .char_indices()
            .rev()
            .nth(keep - 1)
            .map(|(i, _)| i)
            .unwrap_or(0);
        self.carry = window.split_off(tail_start);
        false
    }

    pub fn fired(&self) -> bool {
        self.fired
    }
}

impl Default for EscalationDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// Strips the sentinel from the user-visible stream. A trailing proper
/// prefix of the sentinel is withheld until the next fragment decides
/// whether it completes the marker; anything else flows through untouched.
pub struct SentinelFilter {
    held: String,
}

impl SentinelFilter {
    pub fn new() -> Self {
        Self {
            held: String::new(),
        }
    }

    /// Feed one fragment; returns the text safe to show the user.
    pub fn push(&mut self, fragment: &str) -> String {
        let mut text = std::mem::take(&mut self.held);
        text.push_str(fragment);

        // Removing one occurrence can join the halves of another.
        while text.contains(ESCALATION_SENTINEL) {
            text = text.replace(ESCALATION_SENTINEL, "");
        }

        for k in (1..ESCALATION_SENTINEL.len()).rev() {
            if text.ends_with(&ESCALATION_SENTINEL[..k]) {
                self.held = text.split_off(text.len() - k);
                break;
            }
        }
        text
    }

    /// End of stream: a withheld prefix that never completed is real text.
    pub fn finish(&mut self) -> String {
        std::mem::take(&mut self.held)
    }
}

impl Default for SentinelFilter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_sentinel_in_single_fragment() {
        let mut detector = EscalationDetector::new();
        assert!(detector.scan("Ich kann nicht helfen. ESKALATION_NOETIG"));
        assert!(detector.fired());
    }

    #[test]
    fn detects_sentinel_split_across_fragments() {
        let mut detector = EscalationDetector::new();
        assert!(!detector.scan("Ich kann nicht helfen. ESKALA"));
        assert!(detector.scan("TION_NOETIG"));
    }

    #[test]
    fn fires_exactly_once() {
        let mut detector = EscalationDetector::new();
        assert!(detector.scan("ESKALATION_NOETIG"));
        assert!(!detector.scan("ESKALATION_NOETIG"));
        assert!(detector.fired());
    }

    #[test]
    fn char_by_char_detection() {
        let mut detector = EscalationDetector::new();
        let mut fired = false;
        for c in "bitte ESKALATION_NOETIG danke".chars() {
            fired |= detector.scan(&c.to_string());
        }
        assert!(fired);
    }

    #[test]
    fn no_false_positive_on_similar_text() {
        let mut detector = EscalationDetector::new();
        assert!(!detector.scan("ESKALATION_"));
        assert!(!detector.scan("VIELLEICHT"));
        assert!(!detector.fired());
    }

    #[test]
    fn filter_strips_whole_sentinel() {
        let mut filter = SentinelFilter::new();
        let mut out = filter.push("Tut mir leid. ESKALATION_NOETIG Ende");
        out.push_str(&filter.finish());
        assert_eq!(out, "Tut mir leid.  Ende");
    }

    #[test]
    fn filter_strips_split_sentinel() {
        let mut filter = SentinelFilter::new();
        let mut out = String::new();
        out.push_str(&filter.push("Ich kann nicht helfen. ESKALA"));
        out.push_str(&filter.push("TION_NOETIG"));
        out.push_str(&filter.finish());
        assert_eq!(out, "Ich kann nicht helfen. ");
    }

    #[test]
    fn withheld_prefix_flushes_when_not_sentinel() {
        let mut filter = SentinelFilter::new();
        let mut out = String::new();
        out.push_str(&filter.push("Projekt ESKA"));
        out.push_str(&filter.push("PADE läuft"));
        out.push_str(&filter.finish());
        assert_eq!(out, "Projekt ESKAPADE läuft");
    }

    #[test]
    fn residual_prefix_emitted_at_end_of_stream() {
        let mut filter = SentinelFilter::new();
        let mut out = String::new();
        out.push_str(&filter.push("Abbruch bei ESKALATION_NOE"));
        out.push_str(&filter.finish());
        assert_eq!(out, "Abbruch bei ESKALATION_NOE");
    }

    #[test]
    fn overlapping_halves_do_not_leak() {
        // removing the inner occurrence joins an outer one
        let mut filter = SentinelFilter::new();
        let text = format!(
            "{}{}{}",
            "ESKALATION_", ESCALATION_SENTINEL, "NOETIG"
        );
        let mut out = filter.push(&text);
        out.push_str(&filter.finish());
        assert!(!out.contains(ESCALATION_SENTINEL));
    }
}

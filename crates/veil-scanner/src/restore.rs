//! Streaming re-personalization: replaces vault placeholders in a token
//! stream with their originals without ever emitting a partial placeholder.

use std::sync::Arc;

use futures_util::{Stream, StreamExt};

use veil_vault::placeholder;
use veil_vault::Vault;

/// Buffered state machine over the model's text deltas.
///
/// A placeholder may be split across arbitrarily many fragments, so a `<`
/// with no closing `>` yet is held back — but only for as long as it could
/// still open a placeholder. The moment the character after `<` is known
/// and is not an uppercase letter, the `<` is flushed. Benign `<...>`
/// content (`<br>`, `< 5 ms`) passes through verbatim.
pub struct StreamRestorer {
    vault: Arc<Vault>,
    buffer: String,
}

impl StreamRestorer {
    pub fn new(vault: Arc<Vault>) -> Self {
        Self {
            vault,
            buffer: String::new(),
        }
    }

    /// Feed one fragment; returns the text that can be emitted now.
    pub async fn push(&mut self, fragment: &str) -> String {
        self.buffer.push_str(fragment);
        let mut out = String::new();

        loop {
            let Some(i) = self.buffer.find('<') else {
                out.push_str(&self.buffer);
                self.buffer.clear();
                break;
            };
            if i > 0 {
                out.push_str(&self.buffer[..i]);
                self.buffer.drain(..i);
            }

            // buffer now starts with '<'
            match self.buffer.find('>') {
                Some(j) => {
                    let candidate = &self.buffer[..=j];
                    if placeholder::is_placeholder(candidate) {
                        out.push_str(&self.vault.get(candidate).await);
                    } else {
                        out.push_str(candidate);
                    }
                    self.buffer.drain(..=j);
                }
                None => {
                    // No '>' yet. Flush the '<' as soon as it provably
                    // cannot start a placeholder.
                    match self.buffer.chars().nth(1) {
                        Some(c) if !c.is_ascii_uppercase() => {
                            out.push('<');
                            self.buffer.drain(..1);
                        }
                        _ => break, // wait for more input
                    }
                }
            }
        }

        out
    }

    /// End of stream: emit any residue as-is. An unterminated suspected
    /// placeholder is shown rather than swallowed — best-effort visibility
    /// over data loss.
    pub fn finish(&mut self) -> String {
        std::mem::take(&mut self.buffer)
    }
}

/// Adapt a fragment stream into its restored counterpart.
pub fn restore_stream<S>(vault: Arc<Vault>, input: S) -> impl Stream<Item = String>
where
    S: Stream<Item = String> + Send + 'static,
{
    async_stream::stream! {
        let mut restorer = StreamRestorer::new(vault);
        futures_util::pin_mut!(input);
        while let Some(fragment) = input.next().await {
            let out = restorer.push(&fragment).await;
            if !out.is_empty() {
                yield out;
            }
        }
        let residue = restorer.finish();
        if !residue.is_empty() {
            yield residue;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_vault::{KvStore, MemoryStore, Vault};

    async fn vault_with(entries: &[(&str, &str)]) -> Arc<Vault> {
        let store = MemoryStore::new();
        for (k, v) in entries {
            store.set_ex(k, v, 3600).await.unwrap();
        }
        Arc::new(Vault::new(Arc::new(store), 3600, 86_400))
    }

    async fn run(vault: Arc<Vault>, fragments: &[&str]) -> Vec<String> {
        let mut restorer = StreamRestorer::new(vault);
        let mut emitted = Vec::new();
        for f in fragments {
            let out = restorer.push(f).await;
            if !out.is_empty() {
                emitted.push(out);
            }
        }
        let residue = restorer.finish();
        if !residue.is_empty() {
            emitted.push(residue);
        }
        emitted
    }

    #[tokio::test]
    async fn placeholder_split_across_fragments() {
        let vault = vault_with(&[("<PERSON_abc12345>", "Peter")]).await;
        let out = run(
            vault,
            &["Hallo ", "<PERSO", "N_abc12345> ", "wie geht", " es dir?"],
        )
        .await;
        assert_eq!(out.concat(), "Hallo Peter wie geht es dir?");
    }

    #[tokio::test]
    async fn benign_angle_brackets_pass_through() {
        let vault = vault_with(&[]).await;
        let out = run(vault, &["Nutze ", "<br>", " hier"]).await;
        assert_eq!(out.concat(), "Nutze <br> hier");
    }

    #[tokio::test]
    async fn lone_angle_is_flushed_promptly() {
        let vault = vault_with(&[]).await;
        let mut restorer = StreamRestorer::new(vault);
        // '< 5' cannot be a placeholder once the space is visible
        assert_eq!(restorer.push("Latenz < 5").await, "Latenz < 5");
        assert_eq!(restorer.push(" ms").await, " ms");
        assert_eq!(restorer.finish(), "");
    }

    #[tokio::test]
    async fn no_partial_placeholder_is_ever_emitted() {
        let vault = vault_with(&[("<EMAIL_00ff00ff>", "a@b.de")]).await;
        let mut restorer = StreamRestorer::new(vault);
        assert_eq!(restorer.push("Schreib an <EMA").await, "Schreib an ");
        assert_eq!(restorer.push("IL_00ff").await, "");
        assert_eq!(restorer.push("00ff>").await, "a@b.de");
    }

    #[tokio::test]
    async fn unknown_placeholder_passes_through() {
        let vault = vault_with(&[]).await;
        let out = run(vault, &["Hi <PERSON_deadbeef>!"]).await;
        assert_eq!(out.concat(), "Hi <PERSON_deadbeef>!");
    }

    #[tokio::test]
    async fn unterminated_residue_is_emitted_at_end() {
        let vault = vault_with(&[]).await;
        let out = run(vault, &["kaputt <PERSON_ab"]).await;
        assert_eq!(out.concat(), "kaputt <PERSON_ab");
    }

    #[tokio::test]
    async fn refragmentation_invariance() {
        let vault = vault_with(&[
            ("<PERSON_abc12345>", "Peter"),
            ("<CITY_00112233>", "Berlin"),
        ])
        .await;
        let full = "Hallo <PERSON_abc12345>, <b>wie</b> ist <CITY_00112233> bei < 5 Grad?";
        let expected = "Hallo Peter, <b>wie</b> ist Berlin bei < 5 Grad?";

        // whole text as one fragment
        let out = run(vault.clone(), &[full]).await;
        assert_eq!(out.concat(), expected);

        // char-by-char
        let chars: Vec<String> = full.chars().map(|c| c.to_string()).collect();
        let frags: Vec<&str> = chars.iter().map(|s| s.as_str()).collect();
        let out = run(vault.clone(), &frags).await;
        assert_eq!(out.concat(), expected);

        // odd chunking
        let bytes: Vec<char> = full.chars().collect();
        let mut frags = Vec::new();
        for chunk in bytes.chunks(3) {
            frags.push(chunk.iter().collect::<String>());
        }
        let frag_refs: Vec<&str> = frags.iter().map(|s| s.as_str()).collect();
        let out = run(vault, &frag_refs).await;
        assert_eq!(out.concat(), expected);
    }

    #[tokio::test]
    async fn restore_stream_adapter_matches_manual_loop() {
        let vault = vault_with(&[("<PERSON_abc12345>", "Peter")]).await;
        let input = tokio_stream::iter(vec![
            "Hi ".to_string(),
            "<PERSON_".to_string(),
            "abc12345>".to_string(),
        ]);
        let restored: Vec<String> = restore_stream(vault, input).collect().await;
        assert_eq!(restored.concat(), "Hi Peter");
    }
}

use std::sync::Arc;

use tracing::{debug, warn};

use veil_core::types::SessionMode;

use crate::error::{Result, VaultError};
use crate::placeholder;
use crate::store::KvStore;

/// Bounded retry when a freshly minted suffix is already live.
const MINT_ATTEMPTS: usize = 4;

/// Reversible PII vault plus the session-mode map, both living on the same
/// external store.
pub struct Vault {
    store: Arc<dyn KvStore>,
    entry_ttl_secs: u64,
    status_ttl_secs: u64,
}

impl Vault {
    pub fn new(store: Arc<dyn KvStore>, entry_ttl_secs: u64, status_ttl_secs: u64) -> Self {
        Self {
            store,
            entry_ttl_secs,
            status_ttl_secs,
        }
    }

    /// Mint a placeholder for `original` under `label` and persist the
    /// mapping with the entry TTL. `SET NX` guards against suffix
    /// collisions; a handful of retries covers the astronomically unlikely
    /// repeat.
    pub async fn store(&self, original: &str, label: &str) -> Result<String> {
        for _ in 0..MINT_ATTEMPTS {
            let placeholder = placeholder::mint(label);
            if self
                .store
                .set_nx_ex(&placeholder, original, self.entry_ttl_secs)
                .await?
            {
                debug!(placeholder = %placeholder, label, "vault entry stored");
                return Ok(placeholder);
            }
            warn!(placeholder = %placeholder, "placeholder collision, re-minting");
        }
        Err(VaultError::Exhausted {
            label: label.to_string(),
        })
    }

    /// Resolve a placeholder back to its original. On a miss — or when the
    /// store is unreachable — the placeholder itself is returned: leaking
    /// an opaque token to the user is safer than dropping their reply, and
    /// it makes restoration idempotent on already-restored text.
    pub async fn get(&self, placeholder: &str) -> String {
        match self.store.get(placeholder).await {
            Ok(Some(original)) => original,
            Ok(None) => placeholder.to_string(),
            Err(e) => {
                warn!(error = %e, placeholder = %placeholder, "vault lookup failed, passing through");
                placeholder.to_string()
            }
        }
    }

    pub async fn set_mode(&self, session_id: &str, mode: SessionMode) -> Result<()> {
        self.store
            .set_ex(&status_key(session_id), mode.as_str(), self.status_ttl_secs)
            .await
    }

    /// Current mode of a session. Absence (or an unparseable value) means AI.
    pub async fn mode(&self, session_id: &str) -> Result<SessionMode> {
        let value = self.store.get(&status_key(session_id)).await?;
        Ok(value
            .and_then(|v| v.parse().ok())
            .unwrap_or(SessionMode::Ai))
    }

    pub async fn ping(&self) -> Result<()> {
        self.store.ping().await
    }
}

fn status_key(session_id: &str) -> String {
    format!("status:{session_id}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn vault() -> Vault {
        Vault::new(Arc::new(MemoryStore::new()), 3600, 86_400)
    }

    #[tokio::test]
    async fn store_and_resolve() {
        let vault = vault();
        let placeholder = vault.store("peter@example.com", "email").await.unwrap();
        assert!(placeholder::is_placeholder(&placeholder));
        assert!(placeholder.starts_with("<EMAIL_"));
        assert_eq!(vault.get(&placeholder).await, "peter@example.com");
    }

    #[tokio::test]
    async fn get_on_miss_is_identity() {
        let vault = vault();
        assert_eq!(vault.get("<PERSON_deadbeef>").await, "<PERSON_deadbeef>");
    }

    #[tokio::test]
    async fn mode_defaults_to_ai() {
        let vault = vault();
        assert_eq!(vault.mode("sess_1").await.unwrap(), SessionMode::Ai);
    }

    #[tokio::test]
    async fn mode_round_trip() {
        let vault = vault();
        vault.set_mode("sess_1", SessionMode::Human).await.unwrap();
        assert_eq!(vault.mode("sess_1").await.unwrap(), SessionMode::Human);
        // other sessions stay untouched
        assert_eq!(vault.mode("sess_2").await.unwrap(), SessionMode::Ai);
    }

    #[tokio::test]
    async fn distinct_placeholders_per_store() {
        let vault = vault();
        let a = vault.store("Peter", "person").await.unwrap();
        let b = vault.store("Peter", "person").await.unwrap();
        assert_ne!(a, b);
        assert_eq!(vault.get(&a).await, "Peter");
        assert_eq!(vault.get(&b).await, "Peter");
    }
}

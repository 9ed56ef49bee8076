use thiserror::Error;

use veil_vault::VaultError;

/// Errors raised while de-identifying a user message.
#[derive(Debug, Error)]
pub enum ScanError {
    /// The vault could not persist a placeholder. The turn must abort —
    /// sending un-vaulted PII downstream is never acceptable.
    #[error("PII store unavailable: {0}")]
    Store(#[from] VaultError),

    /// The entity detector failed or returned garbage.
    #[error("entity detector failed: {0}")]
    Detector(String),
}

use thiserror::Error;

/// Errors that can occur during vault operations.
#[derive(Debug, Error)]
pub enum VaultError {
    /// The backing PII store could not be reached.
    #[error("PII store unavailable: {0}")]
    Unavailable(String),

    /// Minting kept colliding with live placeholders. With an 8-hex suffix
    /// this means the store is effectively full for the label.
    #[error("placeholder space exhausted for label {label}")]
    Exhausted { label: String },
}

pub type Result<T> = std::result::Result<T, VaultError>;

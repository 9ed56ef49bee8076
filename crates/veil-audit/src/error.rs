use thiserror::Error;

/// Errors that can occur during audit-store operations.
#[derive(Debug, Error)]
pub enum AuditError {
    /// A SQLite operation failed.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// The requested session does not exist.
    #[error("session not found: {id}")]
    NotFound { id: String },

    /// The blocking worker running the write was cancelled.
    #[error("worker task failed: {0}")]
    Worker(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AuditError>;

use thiserror::Error;

/// Errors raised by the operator bridge and its transports.
#[derive(Debug, Error)]
pub enum OperatorError {
    /// No operator conversation is bound to the session.
    #[error("no operator bound for session {session}")]
    Unbound { session: String },

    /// Token acquisition against the connector's login endpoint failed.
    #[error("connector authentication failed: {0}")]
    Auth(String),

    /// Delivering an activity into the operator conversation failed.
    #[error("operator delivery failed: {0}")]
    Delivery(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

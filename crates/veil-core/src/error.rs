use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    /// The PII store could not be reached. A de-identification step that
    /// cannot persist its placeholders must abort the turn.
    #[error("PII store unavailable: {0}")]
    StoreUnavailable(String),

    /// Detector or scanner crashed while cleaning the user message.
    #[error("Filter service failed")]
    FilterFailed(String),

    #[error("LLM stream ended abnormally: {0}")]
    LlmStreamFailed(String),

    #[error("Audit log write failed: {0}")]
    AuditFailed(String),

    #[error("Operator delivery failed: {0}")]
    OperatorDeliveryFailed(String),

    #[error("No operator bound for session {session}")]
    OperatorUnbound { session: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Short error code string sent to clients in error frames.
    pub fn code(&self) -> &'static str {
        match self {
            GatewayError::Config(_) => "CONFIG_ERROR",
            GatewayError::StoreUnavailable(_) => "STORE_UNAVAILABLE",
            GatewayError::FilterFailed(_) => "FILTER_FAILED",
            GatewayError::LlmStreamFailed(_) => "LLM_STREAM_FAILED",
            GatewayError::AuditFailed(_) => "AUDIT_FAILED",
            GatewayError::OperatorDeliveryFailed(_) => "OPERATOR_DELIVERY_FAILED",
            GatewayError::OperatorUnbound { .. } => "OPERATOR_UNBOUND",
            GatewayError::Serialization(_) => "SERIALIZATION_ERROR",
            GatewayError::Io(_) => "IO_ERROR",
            GatewayError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Only data-protection failures surface to the end user; everything
    /// else is absorbed by the router.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            GatewayError::StoreUnavailable(_) | GatewayError::FilterFailed(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

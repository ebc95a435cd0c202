use thiserror::Error;

/// Top-level error type for pipeline operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    // --- Hard dependency errors (the process cannot make progress) ---
    #[error("database error: {0}")]
    Database(String),

    #[error("browser library error: {0}")]
    Browser(String),

    #[error("AI validation endpoint error: {0}")]
    AiValidation(String),

    // --- Domain errors ---
    #[error("illegal state transition for articulum {articulum}: {from} -> {to}")]
    IllegalTransition {
        articulum: String,
        from: String,
        to: String,
    },

    #[error("lost race: row was claimed or transitioned by another worker")]
    LostRace,

    #[error("no proxy available")]
    ProxyExhausted,

    #[error("not found: {0}")]
    NotFound(String),

    // --- Operational errors ---
    #[error("configuration error: {0}")]
    Config(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl PipelineError {
    /// Whether this error is from a hard dependency and warrants the caller
    /// retrying later rather than treating the unit of work as failed.
    pub fn is_hard_dependency(&self) -> bool {
        matches!(self, Self::Database(_) | Self::Browser(_) | Self::AiValidation(_))
    }

    /// Whether a transport-level retry (with backoff) is appropriate, as
    /// opposed to a permanent failure that should be recorded and moved past.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::AiValidation(_))
    }
}

impl From<sqlx::Error> for PipelineError {
    fn from(e: sqlx::Error) -> Self {
        Self::Database(e.to_string())
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

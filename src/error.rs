//! Error types for the sales compensation agent

use std::time::Duration;
use thiserror::Error;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, OrchestrationError>;

#[derive(Error, Debug)]
pub enum OrchestrationError {

    // =============================
    // Pipeline Errors
    // =============================

    /// Classification oracle unreachable or returned a malformed label.
    /// Recovered by the orchestrator as a `clarify` classification.
    #[error("Classification error: {0}")]
    ClassificationError(String),

    /// A handler's oracle call failed; surfaced to the user as an apology.
    /// `cause` is the `kind()` of the underlying failure.
    #[error("Handler {handler} unavailable: {reason}")]
    HandlerUnavailable {
        handler: String,
        cause: &'static str,
        reason: String,
    },

    /// The router rejected a label outside the category set.
    #[error("Invalid category: {0}")]
    InvalidCategory(String),

    // =============================
    // Oracle Errors
    // =============================

    #[error("LLM error: {0}")]
    LlmError(String),

    #[error("Retrieval error: {0}")]
    RetrievalError(String),

    #[error("Oracle call timed out after {0:?}")]
    OracleTimeout(Duration),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("UUID parse error: {0}")]
    UuidError(#[from] uuid::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl OrchestrationError {
    /// Wrap any failure as a `HandlerUnavailable` for the named handler.
    /// An error that already is `HandlerUnavailable` passes through unchanged.
    pub fn unavailable(handler: &str, cause: OrchestrationError) -> Self {
        match cause {
            OrchestrationError::HandlerUnavailable { .. } => cause,
            other => OrchestrationError::HandlerUnavailable {
                handler: handler.to_string(),
                cause: other.kind(),
                reason: other.to_string(),
            },
        }
    }

    /// Stable, message-free name of the failure
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestrationError::ClassificationError(_) => "classification",
            OrchestrationError::HandlerUnavailable { .. } => "handler_unavailable",
            OrchestrationError::InvalidCategory(_) => "invalid_category",
            OrchestrationError::LlmError(_) => "llm",
            OrchestrationError::RetrievalError(_) => "retrieval",
            OrchestrationError::OracleTimeout(_) => "timeout",
            OrchestrationError::ConfigError(_) => "config",
            OrchestrationError::SerializationError(_) => "serialization",
            OrchestrationError::HttpError(_) => "http",
            OrchestrationError::UuidError(_) => "uuid",
            OrchestrationError::IoError(_) => "io",
        }
    }

    /// Summary safe to store in the turn trace and serve over the API.
    /// Never includes upstream messages, which may echo request URLs or
    /// credentials.
    pub fn trace_summary(&self) -> String {
        match self {
            OrchestrationError::HandlerUnavailable { handler, cause, .. } => {
                format!("{} unavailable ({})", handler, cause)
            }
            other => other.kind().to_string(),
        }
    }
}

//! Error types for the CardGenius advisor

use thiserror::Error;

/// Result type alias for advisor operations
pub type Result<T> = std::result::Result<T, AdvisorError>;

#[derive(Error, Debug)]
pub enum AdvisorError {

    // =============================
    // Turn Pipeline Errors
    // =============================

    /// Completion output could not be read as the extraction JSON shape.
    #[error("Extraction format error: {0}")]
    ExtractionFormat(String),

    #[error("{service} timed out after {seconds}s")]
    ExternalServiceTimeout { service: &'static str, seconds: u64 },

    /// Recommendation service answered with a non-success status.
    #[error("Recommendation gateway returned {status}: {body}")]
    Gateway { status: u16, body: String },

    #[error("Completion service error: {0}")]
    Completion(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    Config(String),

    // =============================
    // External Library Conversions
    // =============================

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("HTTP client error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl AdvisorError {
    /// Whether the client may simply resend the same turn.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AdvisorError::ExternalServiceTimeout { .. }
                | AdvisorError::ExtractionFormat(_)
                | AdvisorError::Completion(_)
                | AdvisorError::HttpError(_)
        )
    }
}

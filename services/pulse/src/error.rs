//! Error types for the pulse service

/// Errors that can occur in the pulse service
#[derive(Debug, thiserror::Error)]
pub enum PulseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Delivery failed: {0}")]
    Delivery(String),

    #[error("Status API error: {0}")]
    Status(String),
}

/// Result type alias for pulse operations
pub type Result<T> = std::result::Result<T, PulseError>;

//! Error types for kbase.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Malformed options, rejected before any work starts.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An embedding, search or LLM collaborator failed.
    #[error("{service} failed: {message}")]
    Dependency { service: String, message: String },

    #[error("{operation} timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },

    #[error("Vector dimension mismatch: {left} vs {right}")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn dependency(service: impl Into<String>, message: impl ToString) -> Self {
        Self::Dependency {
            service: service.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error came from a collaborator rather than local logic.
    pub fn is_external(&self) -> bool {
        matches!(self, Self::Dependency { .. } | Self::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;

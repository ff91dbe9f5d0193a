//! Error types for the change feed service.

use thiserror::Error;

/// Main error type for service operations.
///
/// The first four variants are client errors and map onto HTTP status
/// codes in [`crate::http`]. `Io` and `Config` only surface during
/// process startup.
#[derive(Debug, Error)]
pub enum ServiceError {
    /// Request body could not be read or is not valid JSON.
    #[error("{0}")]
    MalformedBody(String),

    /// Body parsed, but a required field is missing or has the wrong type.
    #[error("{0}")]
    ValidationFailure(String),

    #[error("{0}")]
    NotFound(String),

    /// A query parameter could not be interpreted.
    #[error("{0}")]
    InvalidParameter(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ServiceError {
    pub fn item_not_found(key: &str) -> Self {
        ServiceError::NotFound(format!("No talk '{key}' found"))
    }

    /// True for errors caused by the request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ServiceError::MalformedBody(_)
                | ServiceError::ValidationFailure(_)
                | ServiceError::NotFound(_)
                | ServiceError::InvalidParameter(_)
        )
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(e: serde_json::Error) -> Self {
        ServiceError::MalformedBody(e.to_string())
    }
}

impl From<toml::de::Error> for ServiceError {
    fn from(e: toml::de::Error) -> Self {
        ServiceError::Config(e.to_string())
    }
}

/// Result type for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;

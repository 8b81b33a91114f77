//! Error types for the spacegate-services crate

use thiserror::Error;

/// Result type alias using `ServiceError`
pub type Result<T> = std::result::Result<T, ServiceError>;

/// Transport-level failures talking to a collaborator service.
///
/// Domain failures (not found, permission denied, ...) are not errors at this
/// layer; they travel in the `status` of the response.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// No client is registered for the address
    #[error("no {kind} service at address {address}")]
    UnknownAddress { kind: &'static str, address: String },

    /// Invalid service address or URL
    #[error("invalid address: {0}")]
    InvalidAddress(String),

    /// Connection error
    #[error("connection error: {0}")]
    Connection(String),

    /// Timeout error
    #[error("operation timed out")]
    Timeout,

    /// HTTP error
    #[error("http error: {0}")]
    Http(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ServiceError::Timeout
        } else if err.is_connect() {
            ServiceError::Connection(err.to_string())
        } else if err.is_decode() {
            ServiceError::Serialization(err.to_string())
        } else {
            ServiceError::Http(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for ServiceError {
    fn from(err: url::ParseError) -> Self {
        ServiceError::InvalidAddress(err.to_string())
    }
}

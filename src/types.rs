//! Error types for Colloquy

use thiserror::Error;

/// Crate-wide error type
#[derive(Debug, Error)]
pub enum ColloquyError {
    /// Unknown session or agent id — caller-correctable
    #[error("Not found: {0}")]
    NotFound(String),

    /// Malformed request body or invalid configuration
    #[error("Validation error: {0}")]
    Validation(String),

    /// Payment credential could not be decoded
    #[error("Invalid payment credential: {0}")]
    InvalidCredential(String),

    /// Wallet collaborator rejected the claim; the request was not served
    #[error("Payment failed: {0}")]
    PaymentFailed(String),

    /// Reasoning or transport collaborator errored or timed out
    #[error("Collaborator failure: {0}")]
    Collaborator(String),

    /// Best-effort persistence failed; logged, never fatal
    #[error("Persistence failure: {0}")]
    Persistence(String),

    /// Tunnel transport error
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialize(String),
}

impl From<serde_json::Error> for ColloquyError {
    fn from(e: serde_json::Error) -> Self {
        ColloquyError::Serialize(e.to_string())
    }
}

impl From<serde_yaml::Error> for ColloquyError {
    fn from(e: serde_yaml::Error) -> Self {
        ColloquyError::Serialize(e.to_string())
    }
}

/// Convenience result type
pub type Result<T> = std::result::Result<T, ColloquyError>;

//! Protocol error types.

use thiserror::Error;

/// Errors from event construction, signing, and wire parsing.
#[derive(Debug, Error)]
pub enum ProtoError {
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Invalid signature: {0}")]
    InvalidSignature(String),

    #[error("Event id mismatch: expected {expected}, got {actual}")]
    IdMismatch { expected: String, actual: String },

    #[error("Malformed relay message: {0}")]
    MalformedMessage(String),

    #[error("Kind {0} is not in the job request range")]
    NotARequestKind(u16),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

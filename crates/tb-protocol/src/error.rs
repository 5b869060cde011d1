//! Protocol-level error types.

use thiserror::Error;

/// Errors raised while decoding inbound payloads or encoding outbound ones.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed JSON: {0}")]
    Json(String),

    #[error("missing required field '{0}'")]
    MissingField(&'static str),

    #[error("expected a JSON object")]
    NotAnObject,

    #[error("payload of {size} bytes exceeds capacity of {capacity} bytes")]
    PayloadTooLarge { size: usize, capacity: usize },

    #[error("invalid topic: {0}")]
    InvalidTopic(String),
}

impl From<serde_json::Error> for ProtocolError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e.to_string())
    }
}

/// Convenience alias for protocol results.
pub type ProtocolResult<T> = Result<T, ProtocolError>;

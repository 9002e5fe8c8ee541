//! Protocol-level error type.

use thiserror::Error;

/// Errors raised while building payloads or encoding/decoding frames.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// A caller-supplied argument was rejected at construction time.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The payload cannot be sent (bad device token, etc.).
    #[error("invalid payload: {0}")]
    PayloadInvalid(String),

    /// Building the outbound frame failed.
    #[error("frame encoding failed: {0}")]
    Encoding(String),

    /// Inbound bytes do not form a valid frame.
    #[error("malformed frame: {0}")]
    MalformedFrame(String),
}

impl ProtocolError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    pub fn payload_invalid(message: impl Into<String>) -> Self {
        Self::PayloadInvalid(message.into())
    }

    pub fn encoding(message: impl Into<String>) -> Self {
        Self::Encoding(message.into())
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedFrame(message.into())
    }
}

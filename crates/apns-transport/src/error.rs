//! Transport error type.

use apns_protocol::ProtocolError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    /// TCP connect to the gateway failed.
    #[error("connection to {endpoint} failed: {source}")]
    Connect {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// TLS handshake with the gateway failed.
    #[error("TLS handshake with {endpoint} failed: {source}")]
    Handshake {
        endpoint: String,
        #[source]
        source: std::io::Error,
    },

    /// The PKCS#12 bundle could not be used as a client identity.
    #[error("client certificate error: {0}")]
    Certificate(String),

    #[error("TLS configuration error: {0}")]
    Tls(#[from] rustls::Error),

    #[error("not connected")]
    NotConnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// The feedback stream could not be drained completely.
    #[error("feedback stream error: {0}")]
    Feedback(String),
}

impl TransportError {
    pub fn certificate(message: impl Into<String>) -> Self {
        Self::Certificate(message.into())
    }

    /// True for failures establishing the session (TCP or TLS).
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Self::Connect { .. } | Self::Handshake { .. })
    }
}

impl From<openssl::error::ErrorStack> for TransportError {
    fn from(e: openssl::error::ErrorStack) -> Self {
        Self::Certificate(e.to_string())
    }
}

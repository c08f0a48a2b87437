//! Error types for the boundary ports.

use thiserror::Error;

/// Failures raised by a transport implementation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),
    #[error("request failed with status {status}: {message}")]
    Http { status: u16, message: String },
    #[error("unauthorized: {0}")]
    Unauthorized(String),
    #[error("invalid response: {0}")]
    Decode(String),
    #[error("request cancelled")]
    Cancelled,
}

impl TransportError {
    /// Whether retrying the same request can reasonably succeed.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Network(_) | Self::Cancelled => true,
            Self::Http { status, .. } => *status == 408 || *status == 429 || *status >= 500,
            Self::Unauthorized(_) | Self::Decode(_) => false,
        }
    }
}

/// Convenience result type for transport calls.
pub type TransportResult<T> = Result<T, TransportError>;

/// Failures raised by a connection implementation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ConnectionError {
    #[error("subscribe failed for channel {channel}: {reason}")]
    SubscribeFailed { channel: String, reason: String },
    #[error("connection closed")]
    Closed,
}

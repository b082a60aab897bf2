//! Server error types.

use std::io;
use std::net::SocketAddr;

use polyws::WsError;
use polyws_config::ConfigError;
use polyws_telemetry::TelemetryError;
use thiserror::Error;

/// Errors raised by the server and its connection tasks.
#[derive(Debug, Error)]
pub enum ServerError {
    /// A listen address did not parse.
    #[error("invalid address '{addr}': {reason}")]
    InvalidAddress {
        /// The offending address.
        addr: String,
        /// Parser message.
        reason: String,
    },

    /// Binding a listener failed.
    #[error("failed to bind to {addr}")]
    Bind {
        /// Address that could not be bound.
        addr: SocketAddr,
        /// Underlying error.
        #[source]
        source: io::Error,
    },

    /// Socket I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The peer broke the framing or handshake rules.
    #[error(transparent)]
    Protocol(#[from] WsError),

    /// The peer did not finish its handshake in time.
    #[error("handshake not completed within {0:?}")]
    HandshakeTimeout(std::time::Duration),

    /// The peer stopped reading and the write queue hit its limit.
    #[error("outbound queue exceeded {limit} bytes")]
    OutboundOverflow {
        /// Configured queue limit.
        limit: usize,
    },

    /// The connection was refused by limits or shutdown.
    #[error("connection rejected: {0}")]
    Rejected(String),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Logging or metrics could not be initialised.
    #[error(transparent)]
    Telemetry(#[from] TelemetryError),
}

impl ServerError {
    /// Create a rejection error.
    pub fn rejected(reason: impl Into<String>) -> Self {
        Self::Rejected(reason.into())
    }
}

/// Result alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outbound_overflow_display() {
        let err = ServerError::OutboundOverflow { limit: 1024 };
        assert_eq!(err.to_string(), "outbound queue exceeded 1024 bytes");
    }

    #[test]
    fn test_rejected_display() {
        let err = ServerError::rejected("maximum connections (2) reached");
        assert_eq!(
            err.to_string(),
            "connection rejected: maximum connections (2) reached"
        );
    }

    #[test]
    fn test_protocol_error_is_transparent() {
        let err = ServerError::from(WsError::HandshakeTooLarge { limit: 16 });
        assert_eq!(
            err.to_string(),
            WsError::HandshakeTooLarge { limit: 16 }.to_string()
        );
    }
}

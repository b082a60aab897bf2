//! Error types for WebSocket protocol operations.
//!
//! Handshake and header handling are lenient and never fail; the errors here
//! come from frame decoding and message assembly, where a peer can send bytes
//! that cannot be processed.

use std::fmt;
use thiserror::Error;

/// Result type for WebSocket operations.
pub type WsResult<T> = Result<T, WsError>;

/// Errors that can occur while processing an inbound byte stream.
#[derive(Debug, Error)]
pub enum WsError {
    /// A single frame declared a payload larger than the configured limit.
    #[error("frame too large: {size} bytes exceeds limit of {limit}")]
    FrameTooLarge {
        /// Declared payload length.
        size: u64,
        /// Configured maximum frame payload.
        limit: usize,
    },

    /// An assembled message grew beyond the configured limit.
    #[error("message too large: {size} bytes exceeds limit of {limit}")]
    MessageTooLarge {
        /// Accumulated payload length.
        size: usize,
        /// Configured maximum message payload.
        limit: usize,
    },

    /// A fragmented message was split into more frames than allowed.
    #[error("too many fragments: message exceeds {limit} frames")]
    TooManyFragments {
        /// Configured maximum fragments per message.
        limit: usize,
    },

    /// The 64-bit extended length had its most significant bit set.
    #[error("invalid payload length: {0}")]
    InvalidLength(u64),

    /// The peer violated the framing rules.
    #[error("protocol error: {0}")]
    ProtocolError(String),

    /// The handshake could not be read within the configured bound.
    #[error("handshake too large: more than {limit} bytes without a terminator")]
    HandshakeTooLarge {
        /// Configured maximum handshake size.
        limit: usize,
    },

    /// The message payload could not be decoded.
    #[error("failed to decode message: {0}")]
    DecodeFailed(String),

    /// The message payload could not be encoded.
    #[error("failed to encode message: {0}")]
    EncodeFailed(String),
}

impl WsError {
    /// Create a new protocol error.
    pub fn protocol_error(reason: impl Into<String>) -> Self {
        Self::ProtocolError(reason.into())
    }

    /// The close code a server should send when failing a connection
    /// because of this error.
    pub fn close_code(&self) -> CloseCode {
        match self {
            Self::FrameTooLarge { .. }
            | Self::MessageTooLarge { .. }
            | Self::TooManyFragments { .. } => CloseCode::MessageTooBig,
            Self::DecodeFailed(_) => CloseCode::InvalidPayload,
            Self::EncodeFailed(_) => CloseCode::InternalError,
            Self::InvalidLength(_) | Self::ProtocolError(_) | Self::HandshakeTooLarge { .. } => {
                CloseCode::Protocol
            }
        }
    }
}

/// Close code for WebSocket connections.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum CloseCode {
    /// Normal closure (1000).
    Normal = 1000,
    /// Going away (1001).
    GoingAway = 1001,
    /// Protocol error (1002).
    Protocol = 1002,
    /// Unsupported data (1003).
    Unsupported = 1003,
    /// No status received (1005).
    NoStatus = 1005,
    /// Abnormal closure (1006).
    Abnormal = 1006,
    /// Invalid payload data (1007).
    InvalidPayload = 1007,
    /// Policy violation (1008).
    PolicyViolation = 1008,
    /// Message too big (1009).
    MessageTooBig = 1009,
    /// Extension required (1010).
    ExtensionRequired = 1010,
    /// Internal error (1011).
    InternalError = 1011,
    /// Service restart (1012).
    ServiceRestart = 1012,
    /// Try again later (1013).
    TryAgainLater = 1013,
    /// Bad gateway (1014).
    BadGateway = 1014,
    /// TLS handshake failure (1015).
    TlsHandshake = 1015,
}

impl CloseCode {
    /// Convert from a u16 code.
    pub fn from_u16(code: u16) -> Option<Self> {
        match code {
            1000 => Some(Self::Normal),
            1001 => Some(Self::GoingAway),
            1002 => Some(Self::Protocol),
            1003 => Some(Self::Unsupported),
            1005 => Some(Self::NoStatus),
            1006 => Some(Self::Abnormal),
            1007 => Some(Self::InvalidPayload),
            1008 => Some(Self::PolicyViolation),
            1009 => Some(Self::MessageTooBig),
            1010 => Some(Self::ExtensionRequired),
            1011 => Some(Self::InternalError),
            1012 => Some(Self::ServiceRestart),
            1013 => Some(Self::TryAgainLater),
            1014 => Some(Self::BadGateway),
            1015 => Some(Self::TlsHandshake),
            _ => None,
        }
    }

    /// Get the u16 value of this close code.
    pub fn as_u16(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for CloseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Normal => "Normal",
            Self::GoingAway => "GoingAway",
            Self::Protocol => "Protocol",
            Self::Unsupported => "Unsupported",
            Self::NoStatus => "NoStatus",
            Self::Abnormal => "Abnormal",
            Self::InvalidPayload => "InvalidPayload",
            Self::PolicyViolation => "PolicyViolation",
            Self::MessageTooBig => "MessageTooBig",
            Self::ExtensionRequired => "ExtensionRequired",
            Self::InternalError => "InternalError",
            Self::ServiceRestart => "ServiceRestart",
            Self::TryAgainLater => "TryAgainLater",
            Self::BadGateway => "BadGateway",
            Self::TlsHandshake => "TlsHandshake",
        };
        write!(f, "{} ({})", name, self.as_u16())
    }
}

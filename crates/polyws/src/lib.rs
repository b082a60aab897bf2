//! Multi-dialect WebSocket protocol core.
//!
//! This crate implements the server side of the WebSocket wire protocol in
//! the three dialects still found in the wild:
//!
//! - **Hybi**: the modern `Sec-WebSocket-Key` handshake and binary framing,
//!   with ping/pong, the close handshake and fragmented messages
//! - **Hixie**: the legacy two-key handshake with `0x00 … 0xFF` text units
//! - **Flash**: the `<policy-file-request/>` cross-domain policy exchange
//!
//! The crate performs no I/O. A [`Transport`] supplied by the caller owns
//! the socket; connections write to it and raise callbacks on it.
//!
//! # Example
//!
//! ```ignore
//! use polyws::{factory, ProtocolConfig, WebSocketConnection};
//!
//! // `raw` holds the bytes read up to `factory::handshake_boundary(&raw)`
//! let mut conn = factory::accept(transport, &raw, &ProtocolConfig::default());
//!
//! // Feed every later chunk; complete messages arrive on
//! // `Transport::on_message`
//! conn.read_frame(&chunk)?;
//! conn.send_string("hello");
//! conn.disconnect();
//! ```
//!
//! # Architecture
//!
//! ```text
//! raw bytes ──► factory::classify ──► Connection::{Flash, Hixie, Hybi}
//!                                            │ handshake response
//!                                            ▼
//!                                        Transport
//!
//! Hybi:  read_frame ──► FrameReader ──┬─► ControlStateMachine (close/ping/pong)
//!                                     └─► MessageAssembler ──► on_message
//! ```

pub mod assembler;
pub mod config;
pub mod connection;
pub mod control;
pub mod error;
pub mod factory;
pub mod frame;
pub mod handshake;
pub mod headers;
pub mod message;
pub mod transport;

// Re-exports for convenience
pub use assembler::MessageAssembler;
pub use config::ProtocolConfig;
pub use connection::{
    Connection, ConnectionBase, Dialect, FlashConnection, HixieConnection, HybiConnection,
    WebSocketConnection,
};
pub use control::{ConnectionState, ControlAction, ControlStateMachine};
pub use error::{CloseCode, WsError, WsResult};
pub use factory::{accept, accept_with_headers, classify, handshake_boundary};
pub use frame::{Frame, FrameReader, Opcode};
pub use headers::{Cookies, HeaderValue, Headers};
pub use message::Message;
pub use transport::{ConnectionId, Transport};

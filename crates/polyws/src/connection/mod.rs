//! Connection variants.
//!
//! A [`Connection`] is one of three dialects, each implementing the
//! [`WebSocketConnection`] capability set. Every variant writes its
//! handshake response to the transport as part of construction, before any
//! frame is processed.

mod flash;
mod hixie;
mod hybi;

use std::fmt;

use tracing::Span;

pub use flash::FlashConnection;
pub use hixie::HixieConnection;
pub use hybi::HybiConnection;

use crate::control::ConnectionState;
use crate::error::WsResult;
use crate::frame::Frame;
use crate::headers::{names, Cookies, Headers};
use crate::message::Message;
use crate::transport::{ConnectionId, Transport};

/// The protocol dialect a peer speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Dialect {
    /// Cross-domain policy request from a plugin client.
    Flash,
    /// Legacy two-key handshake with 0x00/0xFF framing.
    Hixie,
    /// Modern accept-key handshake with binary framing.
    Hybi,
}

impl Dialect {
    /// Lowercase name, used as a log and metric label.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Flash => "flash",
            Self::Hixie => "hixie",
            Self::Hybi => "hybi",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations every dialect supports.
///
/// Writes report failure as `false` and never disconnect on their own.
pub trait WebSocketConnection {
    /// Write the dialect's handshake response.
    fn send_handshake_response(&mut self) -> bool;

    /// Feed bytes received from the transport. Partial frames stay buffered
    /// until the next call.
    fn read_frame(&mut self, data: &[u8]) -> WsResult<()>;

    /// Write a single frame.
    fn send_frame(&mut self, frame: &Frame) -> bool;

    /// Write every frame of a message, stopping at the first failure.
    fn send_message(&mut self, message: &Message) -> bool;

    /// Write a text payload.
    fn send_string(&mut self, text: &str) -> bool;

    /// Close the connection locally. Safe to call more than once.
    fn disconnect(&mut self);
}

/// State shared by every dialect: the transport and what the handshake
/// carried.
#[derive(Debug)]
pub struct ConnectionBase<T> {
    transport: T,
    headers: Headers,
    cookies: Cookies,
    span: Span,
}

impl<T: Transport> ConnectionBase<T> {
    fn new(transport: T, headers: Headers, dialect: Dialect) -> Self {
        let cookies = Cookies::from_headers(&headers);
        let span = tracing::info_span!(
            "ws_connection",
            connection_id = %transport.id(),
            dialect = %dialect,
            peer_addr = tracing::field::Empty,
        );
        Self {
            transport,
            headers,
            cookies,
            span,
        }
    }

    /// The transport handle.
    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Mutable access to the transport handle.
    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Handshake headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Cookies sent with the handshake.
    pub fn cookies(&self) -> &Cookies {
        &self.cookies
    }

    /// The span protocol events are recorded in.
    pub fn span(&self) -> &Span {
        &self.span
    }

    fn into_transport(self) -> T {
        self.transport
    }
}

/// A connection in one of the supported dialects.
#[derive(Debug)]
pub enum Connection<T: Transport> {
    /// Policy request responder.
    Flash(FlashConnection<T>),
    /// Legacy dialect.
    Hixie(HixieConnection<T>),
    /// Modern dialect.
    Hybi(HybiConnection<T>),
}

impl<T: Transport> Connection<T> {
    fn base(&self) -> &ConnectionBase<T> {
        match self {
            Self::Flash(conn) => conn.base(),
            Self::Hixie(conn) => conn.base(),
            Self::Hybi(conn) => conn.base(),
        }
    }

    fn base_mut(&mut self) -> &mut ConnectionBase<T> {
        match self {
            Self::Flash(conn) => conn.base_mut(),
            Self::Hixie(conn) => conn.base_mut(),
            Self::Hybi(conn) => conn.base_mut(),
        }
    }

    fn as_dyn(&mut self) -> &mut dyn WebSocketConnection {
        match self {
            Self::Flash(conn) => conn,
            Self::Hixie(conn) => conn,
            Self::Hybi(conn) => conn,
        }
    }

    /// Transport identifier.
    pub fn id(&self) -> ConnectionId {
        self.base().transport.id()
    }

    /// Which dialect this connection speaks.
    pub fn dialect(&self) -> Dialect {
        match self {
            Self::Flash(_) => Dialect::Flash,
            Self::Hixie(_) => Dialect::Hixie,
            Self::Hybi(_) => Dialect::Hybi,
        }
    }

    /// Handshake headers.
    pub fn headers(&self) -> &Headers {
        self.base().headers()
    }

    /// Cookies sent with the handshake.
    pub fn cookies(&self) -> &Cookies {
        self.base().cookies()
    }

    /// The requested path, from the request line.
    pub fn uri_requested(&self) -> Option<&str> {
        self.headers().get_str(names::GET)
    }

    /// The `Origin` header.
    pub fn origin(&self) -> Option<&str> {
        self.headers().get_str(names::ORIGIN)
    }

    /// The `Host` header.
    pub fn host(&self) -> Option<&str> {
        self.headers().get_str(names::HOST)
    }

    /// The `Admin-Key` header, exposed raw for the application to check.
    pub fn admin_key(&self) -> Option<&str> {
        self.headers().get_str(names::ADMIN_KEY)
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        match self {
            Self::Flash(conn) => conn.state(),
            Self::Hixie(conn) => conn.state(),
            Self::Hybi(conn) => conn.state(),
        }
    }

    /// Whether the connection is closed.
    pub fn is_closed(&self) -> bool {
        self.state() == ConnectionState::Closed
    }

    /// The span this connection's events are recorded in. `peer_addr` is
    /// left empty for the transport owner to fill in.
    pub fn span(&self) -> &Span {
        self.base().span()
    }

    /// The transport handle.
    pub fn transport(&self) -> &T {
        self.base().transport()
    }

    /// Mutable access to the transport handle.
    pub fn transport_mut(&mut self) -> &mut T {
        self.base_mut().transport_mut()
    }

    /// Consume the connection, returning the transport.
    pub fn into_transport(self) -> T {
        match self {
            Self::Flash(conn) => conn.into_base().into_transport(),
            Self::Hixie(conn) => conn.into_base().into_transport(),
            Self::Hybi(conn) => conn.into_base().into_transport(),
        }
    }
}

impl<T: Transport> WebSocketConnection for Connection<T> {
    fn send_handshake_response(&mut self) -> bool {
        self.as_dyn().send_handshake_response()
    }

    fn read_frame(&mut self, data: &[u8]) -> WsResult<()> {
        self.as_dyn().read_frame(data)
    }

    fn send_frame(&mut self, frame: &Frame) -> bool {
        self.as_dyn().send_frame(frame)
    }

    fn send_message(&mut self, message: &Message) -> bool {
        self.as_dyn().send_message(message)
    }

    fn send_string(&mut self, text: &str) -> bool {
        self.as_dyn().send_string(text)
    }

    fn disconnect(&mut self) {
        self.as_dyn().disconnect();
    }
}

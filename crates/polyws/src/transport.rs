//! The transport contract a connection drives.
//!
//! A [`Transport`] is whatever owns the socket: it accepts bytes to write,
//! can be closed, and receives the callbacks a connection raises outward.
//! Connections never perform I/O themselves.

use uuid::Uuid;

use crate::message::Message;

/// A unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Create a new time-ordered connection ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for ConnectionId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<ConnectionId> for Uuid {
    fn from(id: ConnectionId) -> Self {
        id.0
    }
}

/// The collaborator a connection writes to and reports to.
///
/// Every method is called from the single task that owns the connection;
/// implementations need no internal locking for the protocol's sake.
pub trait Transport {
    /// Stable identifier of the underlying socket.
    fn id(&self) -> ConnectionId;

    /// Queue bytes for the peer. Returns `false` if the bytes cannot be
    /// delivered; the caller decides whether to disconnect.
    fn write(&mut self, bytes: &[u8]) -> bool;

    /// Close the socket. Must tolerate being called more than once.
    fn close(&mut self);

    /// A complete application message arrived.
    fn on_message(&mut self, message: Message);

    /// The peer asked for a cross-domain policy document.
    fn on_flash_policy_request(&mut self);

    /// Tear down after a peer-initiated close.
    fn disconnect(&mut self) {
        self.close();
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn id(&self) -> ConnectionId {
        (**self).id()
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        (**self).write(bytes)
    }

    fn close(&mut self) {
        (**self).close();
    }

    fn on_message(&mut self, message: Message) {
        (**self).on_message(message);
    }

    fn on_flash_policy_request(&mut self) {
        (**self).on_flash_policy_request();
    }

    fn disconnect(&mut self) {
        (**self).disconnect();
    }
}

//! Application hooks.
//!
//! A [`MessageHandler`] sees each connection open, every complete message
//! it receives, and its close. Replies returned from
//! [`on_message`](MessageHandler::on_message) are framed in the
//! connection's own dialect.

use polyws::Message;
use tracing::debug;

use crate::manager::ConnectionInfo;

/// Application callbacks for accepted connections.
///
/// Flash policy connections never reach the handler.
///
/// # Example
///
/// ```
/// use polyws::Message;
/// use polyws_server::{ConnectionInfo, MessageHandler};
///
/// struct Shout;
///
/// impl MessageHandler for Shout {
///     fn on_message(&self, _conn: &ConnectionInfo, message: Message) -> Option<Message> {
///         let text = message.to_text().ok()?;
///         Some(Message::text(text.to_uppercase()))
///     }
/// }
/// ```
pub trait MessageHandler: Send + Sync + 'static {
    /// The handshake completed.
    fn on_open(&self, conn: &ConnectionInfo) {
        let _ = conn;
    }

    /// A complete message arrived. A returned message is sent back.
    fn on_message(&self, conn: &ConnectionInfo, message: Message) -> Option<Message>;

    /// The connection ended, for any reason.
    fn on_close(&self, conn: &ConnectionInfo) {
        let _ = conn;
    }
}

/// Sends every message back unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct EchoHandler;

impl MessageHandler for EchoHandler {
    fn on_open(&self, conn: &ConnectionInfo) {
        debug!(connection_id = %conn.id, dialect = %conn.dialect, "echo session opened");
    }

    fn on_message(&self, _conn: &ConnectionInfo, message: Message) -> Option<Message> {
        Some(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyws::{ConnectionId, Dialect};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn conn() -> ConnectionInfo {
        ConnectionInfo::new(ConnectionId::new(), Dialect::Hybi, "127.0.0.1:1".parse().unwrap())
    }

    #[test]
    fn test_echo_returns_message() {
        let reply = EchoHandler.on_message(&conn(), Message::text("ping")).unwrap();
        assert_eq!(reply.to_text().unwrap(), "ping");
    }

    #[test]
    fn test_default_hooks_are_noops() {
        struct Counter(AtomicUsize);

        impl MessageHandler for Counter {
            fn on_message(&self, _conn: &ConnectionInfo, _message: Message) -> Option<Message> {
                self.0.fetch_add(1, Ordering::SeqCst);
                None
            }
        }

        let handler = Counter(AtomicUsize::new(0));
        let info = conn();
        handler.on_open(&info);
        assert!(handler.on_message(&info, Message::binary(vec![1, 2])).is_none());
        handler.on_close(&info);
        assert_eq!(handler.0.load(Ordering::SeqCst), 1);
    }
}

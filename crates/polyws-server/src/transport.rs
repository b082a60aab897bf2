//! Channel-backed transport.
//!
//! The protocol core writes synchronously; sockets write asynchronously.
//! [`ChannelTransport`] bridges the two: every write is queued on a channel
//! that a writer task drains into the socket half. Queued bytes are counted
//! against a budget so a peer that stops reading cannot grow the queue
//! without bound.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use polyws::{ConnectionId, Message, Transport};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

/// Command consumed by the writer task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    /// Bytes to write.
    Data(Bytes),
    /// Flush and shut the socket down.
    Close,
}

/// [`Transport`] that queues writes for a writer task.
///
/// Messages assembled by the connection are held in an inbox until the
/// connection task drains them with [`take_messages`](Self::take_messages).
#[derive(Debug)]
pub struct ChannelTransport {
    id: ConnectionId,
    tx: mpsc::UnboundedSender<Outbound>,
    queued: Arc<AtomicUsize>,
    max_queued: usize,
    policy: Option<Bytes>,
    inbox: Vec<Message>,
    closed: bool,
    overflowed: bool,
    policy_requested: bool,
}

impl ChannelTransport {
    /// Create a transport and the queue its writer task drains.
    ///
    /// `policy` is the document served to policy requests; `None` refuses
    /// them by closing. `max_queued` bounds the bytes waiting for the
    /// writer; a single write larger than the budget is still accepted
    /// when the queue is empty.
    pub fn channel(
        id: ConnectionId,
        policy: Option<&str>,
        max_queued: usize,
    ) -> (Self, OutboundQueue) {
        let (tx, rx) = mpsc::unbounded_channel();
        let queued = Arc::new(AtomicUsize::new(0));
        let transport = Self {
            id,
            tx,
            queued: Arc::clone(&queued),
            max_queued,
            policy: policy.map(|p| Bytes::copy_from_slice(p.as_bytes())),
            inbox: Vec::new(),
            closed: false,
            overflowed: false,
            policy_requested: false,
        };
        (transport, OutboundQueue { rx, queued })
    }

    /// Whether `close` has run.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Whether a write was refused because the peer is not draining the
    /// queue.
    pub fn is_overflowed(&self) -> bool {
        self.overflowed
    }

    /// Bytes queued and not yet taken by the writer.
    pub fn queued_bytes(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    /// Whether the peer sent a policy request.
    pub fn policy_requested(&self) -> bool {
        self.policy_requested
    }

    /// Drain the messages delivered since the last call.
    pub fn take_messages(&mut self) -> Vec<Message> {
        std::mem::take(&mut self.inbox)
    }

    fn enqueue(&self, bytes: Bytes) -> bool {
        let len = bytes.len();
        self.queued.fetch_add(len, Ordering::AcqRel);
        if self.tx.send(Outbound::Data(bytes)).is_ok() {
            true
        } else {
            self.queued.fetch_sub(len, Ordering::AcqRel);
            false
        }
    }
}

impl Transport for ChannelTransport {
    fn id(&self) -> ConnectionId {
        self.id
    }

    fn write(&mut self, bytes: &[u8]) -> bool {
        if self.closed || self.overflowed {
            return false;
        }
        let queued = self.queued_bytes();
        if queued > 0 && queued.saturating_add(bytes.len()) > self.max_queued {
            warn!(
                connection_id = %self.id,
                queued,
                limit = self.max_queued,
                "outbound queue full, peer is not reading"
            );
            self.overflowed = true;
            return false;
        }
        self.enqueue(Bytes::copy_from_slice(bytes))
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        let _ = self.tx.send(Outbound::Close);
        debug!(connection_id = %self.id, "transport closed");
    }

    fn on_message(&mut self, message: Message) {
        trace!(connection_id = %self.id, len = message.len(), "message queued");
        self.inbox.push(message);
    }

    fn on_flash_policy_request(&mut self) {
        self.policy_requested = true;
        if let Some(policy) = self.policy.clone() {
            self.enqueue(policy);
            self.enqueue(Bytes::from_static(b"\0"));
        }
        self.close();
    }
}

/// Receiving end of a [`ChannelTransport`], drained by [`write_loop`].
#[derive(Debug)]
pub struct OutboundQueue {
    rx: mpsc::UnboundedReceiver<Outbound>,
    queued: Arc<AtomicUsize>,
}

impl OutboundQueue {
    /// Wait for the next command. Returns `None` once every sender is gone.
    pub async fn recv(&mut self) -> Option<Outbound> {
        let command = self.rx.recv().await?;
        Some(self.release(command))
    }

    /// Take the next command if one is ready.
    pub fn try_recv(&mut self) -> Option<Outbound> {
        let command = self.rx.try_recv().ok()?;
        Some(self.release(command))
    }

    /// Bytes still waiting in the queue.
    pub fn queued_bytes(&self) -> usize {
        self.queued.load(Ordering::Acquire)
    }

    fn release(&self, command: Outbound) -> Outbound {
        if let Outbound::Data(bytes) = &command {
            self.queued.fetch_sub(bytes.len(), Ordering::AcqRel);
        }
        command
    }
}

/// Drain `queue` into `writer` until a close command, a write error, or
/// every sender is gone. The writer is shut down on exit.
pub async fn write_loop<W>(mut writer: W, mut queue: OutboundQueue)
where
    W: AsyncWrite + Unpin,
{
    while let Some(command) = queue.recv().await {
        match command {
            Outbound::Data(bytes) => {
                if let Err(e) = writer.write_all(&bytes).await {
                    debug!(error = %e, "socket write failed");
                    break;
                }
            }
            Outbound::Close => break,
        }
    }
    queue.rx.close();
    let _ = writer.flush().await;
    let _ = writer.shutdown().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use polyws::Frame;

    const BUDGET: usize = 1024;

    fn drain(queue: &mut OutboundQueue) -> Vec<Outbound> {
        let mut out = Vec::new();
        while let Some(cmd) = queue.try_recv() {
            out.push(cmd);
        }
        out
    }

    #[test]
    fn test_write_enqueues() {
        let (mut transport, mut queue) = ChannelTransport::channel(ConnectionId::new(), None, BUDGET);
        assert!(transport.write(b"abc"));
        assert_eq!(drain(&mut queue), vec![Outbound::Data(Bytes::from_static(b"abc"))]);
    }

    #[test]
    fn test_write_fails_once_writer_is_gone() {
        let (mut transport, queue) = ChannelTransport::channel(ConnectionId::new(), None, BUDGET);
        drop(queue);
        assert!(!transport.write(b"abc"));
    }

    #[test]
    fn test_close_is_idempotent() {
        let (mut transport, mut queue) = ChannelTransport::channel(ConnectionId::new(), None, BUDGET);
        transport.close();
        transport.disconnect();
        transport.close();
        assert!(transport.is_closed());
        assert_eq!(drain(&mut queue), vec![Outbound::Close]);
        assert!(!transport.write(b"late"));
    }

    #[test]
    fn test_policy_request_writes_policy_then_closes() {
        let policy = "<cross-domain-policy/>";
        let (mut transport, mut queue) = ChannelTransport::channel(ConnectionId::new(), Some(policy), BUDGET);
        transport.on_flash_policy_request();

        assert!(transport.policy_requested());
        assert_eq!(
            drain(&mut queue),
            vec![
                Outbound::Data(Bytes::from_static(policy.as_bytes())),
                Outbound::Data(Bytes::from_static(b"\0")),
                Outbound::Close,
            ]
        );
    }

    #[test]
    fn test_policy_request_refused() {
        let (mut transport, mut queue) = ChannelTransport::channel(ConnectionId::new(), None, BUDGET);
        transport.on_flash_policy_request();
        assert_eq!(drain(&mut queue), vec![Outbound::Close]);
    }

    #[test]
    fn test_inbox_drains() {
        let (mut transport, _rx) = ChannelTransport::channel(ConnectionId::new(), None, BUDGET);
        transport.on_message(Message::from_frame(Frame::text("hi")));
        transport.on_message(Message::from_frame(Frame::text("there")));
        assert_eq!(transport.take_messages().len(), 2);
        assert!(transport.take_messages().is_empty());
    }

    #[test]
    fn test_write_refused_once_budget_is_spent() {
        let (mut transport, mut queue) = ChannelTransport::channel(ConnectionId::new(), None, 8);
        assert!(transport.write(b"12345"));
        assert!(transport.write(b"678"));
        assert_eq!(transport.queued_bytes(), 8);

        assert!(!transport.write(b"9"));
        assert!(transport.is_overflowed());
        assert_eq!(queue.queued_bytes(), 8);

        // Draining does not reopen an overflowed transport.
        assert_eq!(drain(&mut queue).len(), 2);
        assert_eq!(transport.queued_bytes(), 0);
        assert!(!transport.write(b"9"));
    }

    #[test]
    fn test_large_write_allowed_into_empty_queue() {
        let (mut transport, mut queue) = ChannelTransport::channel(ConnectionId::new(), None, 4);
        assert!(transport.write(b"larger than the budget"));
        assert!(!transport.is_overflowed());
        assert_eq!(drain(&mut queue).len(), 1);
        assert!(transport.write(b"next"));
    }

    #[test]
    fn test_unread_pings_stop_queueing_pongs() {
        use polyws::{accept, WebSocketConnection};

        let (transport, queue) = ChannelTransport::channel(ConnectionId::new(), None, 4096);
        let request = b"GET / HTTP/1.1\r\nSec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\r\n";
        let mut conn = accept(transport, request, &polyws::ProtocolConfig::default());

        let ping = Frame::ping(vec![b'p'; 125]).encode_masked([1, 2, 3, 4]);
        for _ in 0..10_000 {
            let _ = conn.read_frame(&ping);
        }

        assert!(conn.transport().is_overflowed());
        assert!(conn.transport().queued_bytes() <= 4096);
        assert!(queue.queued_bytes() <= 4096);
    }

    #[tokio::test]
    async fn test_write_loop_stops_on_close() {
        let (mut transport, queue) = ChannelTransport::channel(ConnectionId::new(), None, BUDGET);
        transport.write(b"one ");
        transport.write(b"two");
        transport.close();

        let mut sink = Vec::new();
        write_loop(&mut sink, queue).await;
        assert_eq!(sink, b"one two");
    }
}

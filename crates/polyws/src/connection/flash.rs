use tracing::debug;

use super::{ConnectionBase, Dialect, WebSocketConnection};
use crate::control::ConnectionState;
use crate::error::WsResult;
use crate::frame::Frame;
use crate::headers::Headers;
use crate::message::Message;
use crate::transport::Transport;

/// Answers a `<policy-file-request/>`.
///
/// There is no framing in this dialect. The transport is told about the
/// request on construction and is responsible for writing the policy
/// document.
#[derive(Debug)]
pub struct FlashConnection<T> {
    base: ConnectionBase<T>,
    closed: bool,
}

impl<T: Transport> FlashConnection<T> {
    /// Create the connection and notify the transport.
    pub fn new(transport: T, headers: Headers) -> Self {
        let mut conn = Self {
            base: ConnectionBase::new(transport, headers, Dialect::Flash),
            closed: false,
        };
        conn.send_handshake_response();
        conn
    }

    /// Shared connection state.
    pub fn base(&self) -> &ConnectionBase<T> {
        &self.base
    }

    pub(super) fn base_mut(&mut self) -> &mut ConnectionBase<T> {
        &mut self.base
    }

    pub(super) fn into_base(self) -> ConnectionBase<T> {
        self.base
    }

    /// `Open` until disconnected.
    pub fn state(&self) -> ConnectionState {
        if self.closed {
            ConnectionState::Closed
        } else {
            ConnectionState::Open
        }
    }
}

impl<T: Transport> WebSocketConnection for FlashConnection<T> {
    fn send_handshake_response(&mut self) -> bool {
        let _enter = self.base.span.enter();
        debug!("policy file requested");
        self.base.transport.on_flash_policy_request();
        true
    }

    fn read_frame(&mut self, _data: &[u8]) -> WsResult<()> {
        Ok(())
    }

    fn send_frame(&mut self, _frame: &Frame) -> bool {
        false
    }

    fn send_message(&mut self, _message: &Message) -> bool {
        false
    }

    fn send_string(&mut self, text: &str) -> bool {
        if self.closed {
            return false;
        }
        self.base.transport.write(text.as_bytes())
    }

    fn disconnect(&mut self) {
        if !self.closed {
            self.closed = true;
            self.base.transport.close();
        }
    }
}

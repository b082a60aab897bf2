use tracing::{debug, trace, warn};

use super::{ConnectionBase, Dialect, WebSocketConnection};
use crate::assembler::MessageAssembler;
use crate::config::ProtocolConfig;
use crate::control::{ConnectionState, ControlAction, ControlStateMachine};
use crate::error::{CloseCode, WsResult};
use crate::frame::{Frame, FrameReader};
use crate::handshake::{hybi_accept, hybi_response};
use crate::headers::{names, Headers};
use crate::message::Message;
use crate::transport::Transport;

/// Modern dialect.
///
/// Inbound bytes pass through a [`FrameReader`]; control frames drive the
/// [`ControlStateMachine`] and data frames feed the [`MessageAssembler`].
#[derive(Debug)]
pub struct HybiConnection<T> {
    base: ConnectionBase<T>,
    reader: FrameReader,
    assembler: MessageAssembler,
    control: ControlStateMachine,
}

impl<T: Transport> HybiConnection<T> {
    /// Create the connection and write the handshake response.
    pub fn new(transport: T, headers: Headers, config: &ProtocolConfig) -> Self {
        let mut conn = Self {
            base: ConnectionBase::new(transport, headers, Dialect::Hybi),
            reader: FrameReader::new(config.max_frame_size),
            assembler: MessageAssembler::new(config),
            control: ControlStateMachine::new(),
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

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        self.control.state()
    }

    /// Send a Ping frame.
    pub fn ping(&mut self, payload: &[u8]) -> bool {
        self.send_frame(&Frame::ping(payload.to_vec()))
    }

    /// Close with an explicit status code and reason.
    ///
    /// Writes a Close frame, closes the transport and moves to `Closed`.
    /// Does nothing if the connection is already closing or closed.
    pub fn close(&mut self, code: CloseCode, reason: &str) {
        if !self.control.begin_close() {
            return;
        }
        let _enter = self.base.span.enter();
        debug!(code = code.as_u16(), reason, "closing connection");
        let frame = Frame::close(code, reason);
        if !self.base.transport.write(&frame.encode()) {
            warn!("failed to write close frame");
        }
        self.base.transport.close();
        self.control.finish_close();
        self.assembler.reset();
        self.reader.clear();
    }

    fn process_control_frame(&mut self, frame: &Frame) {
        match self.control.on_frame(frame) {
            ControlAction::ReplyClose(reply) => {
                debug!(code = ?frame.close_code(), "close frame received");
                self.base.transport.write(&reply.encode());
                self.base.transport.disconnect();
                self.control.finish_close();
                self.assembler.reset();
                self.reader.clear();
            }
            ControlAction::ReplyPong(reply) => {
                trace!(len = frame.payload().len(), "ping received");
                self.base.transport.write(&reply.encode());
            }
            ControlAction::Ignore => {
                trace!(opcode = %frame.opcode(), "control frame ignored");
            }
        }
    }

    fn process_message_frame(&mut self, frame: Frame) -> WsResult<()> {
        if let Some(message) = self.assembler.push(frame)? {
            debug!(
                opcode = %message.opcode(),
                len = message.len(),
                fragments = message.frames().len(),
                "message received"
            );
            self.base.transport.on_message(message);
        }
        Ok(())
    }
}

impl<T: Transport> WebSocketConnection for HybiConnection<T> {
    fn send_handshake_response(&mut self) -> bool {
        let _enter = self.base.span.enter();
        let key = self
            .base
            .headers
            .get_str(names::SEC_WEBSOCKET_KEY)
            .unwrap_or_default();
        let response = hybi_response(&hybi_accept(key));
        let sent = self.base.transport.write(response.as_bytes());
        if sent {
            debug!("handshake response sent");
        } else {
            warn!("failed to write handshake response");
        }
        sent
    }

    fn read_frame(&mut self, data: &[u8]) -> WsResult<()> {
        if self.control.state() == ConnectionState::Closed {
            return Ok(());
        }
        let span = self.base.span.clone();
        let _enter = span.enter();

        self.reader.extend(data);
        while self.control.is_open() {
            let Some(frame) = self.reader.next_frame()? else {
                break;
            };
            let opcode = frame.opcode();
            if opcode.is_data() {
                self.process_message_frame(frame)?;
            } else if opcode.is_control() {
                self.process_control_frame(&frame);
            } else {
                debug!(%opcode, "ignoring frame with reserved opcode");
            }
        }
        Ok(())
    }

    fn send_frame(&mut self, frame: &Frame) -> bool {
        if !self.control.is_open() {
            return false;
        }
        self.base.transport.write(&frame.encode())
    }

    fn send_message(&mut self, message: &Message) -> bool {
        message.frames().iter().all(|frame| self.send_frame(frame))
    }

    fn send_string(&mut self, text: &str) -> bool {
        self.send_frame(&Frame::text(text.to_owned()))
    }

    fn disconnect(&mut self) {
        self.close(CloseCode::Normal, "");
    }
}

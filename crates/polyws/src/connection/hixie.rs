use bytes::{Buf, BufMut, Bytes, BytesMut};
use tracing::{debug, warn};

use super::{ConnectionBase, Dialect, WebSocketConnection};
use crate::config::ProtocolConfig;
use crate::control::ConnectionState;
use crate::error::{WsError, WsResult};
use crate::frame::{Frame, Opcode};
use crate::handshake::{hixie_digest, hixie_response};
use crate::headers::{names, Headers};
use crate::message::Message;
use crate::transport::Transport;

const TEXT_START: u8 = 0x00;
const TEXT_END: u8 = 0xFF;
const CLOSING_HANDSHAKE: [u8; 2] = [0xFF, 0x00];

/// Legacy two-key dialect.
///
/// Each inbound `0x00 <utf8> 0xFF` unit is one complete text message.
/// Length-prefixed units are skipped, and `0xFF 0x00` closes the
/// connection.
#[derive(Debug)]
pub struct HixieConnection<T> {
    base: ConnectionBase<T>,
    key3: Vec<u8>,
    buffer: BytesMut,
    state: ConnectionState,
    max_frame_size: usize,
    max_message_size: usize,
}

impl<T: Transport> HixieConnection<T> {
    /// Create the connection and write the handshake response.
    ///
    /// `client_handshake` is the raw handshake; its final 8 bytes are the
    /// key material hashed along with the two header keys.
    pub fn new(
        transport: T,
        headers: Headers,
        client_handshake: &[u8],
        config: &ProtocolConfig,
    ) -> Self {
        let key3 = client_handshake[client_handshake.len().saturating_sub(8)..].to_vec();
        let mut conn = Self {
            base: ConnectionBase::new(transport, headers, Dialect::Hixie),
            key3,
            buffer: BytesMut::new(),
            state: ConnectionState::Open,
            max_frame_size: config.max_frame_size,
            max_message_size: config.max_message_size,
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
        self.state
    }

    /// Write one `0x00 … 0xFF` unit. A payload containing the end marker
    /// cannot be framed and is refused.
    fn write_unit(&mut self, payload: &[u8]) -> bool {
        if self.state != ConnectionState::Open {
            return false;
        }
        if payload.contains(&TEXT_END) {
            debug!(len = payload.len(), "payload contains 0xFF, not sent");
            return false;
        }
        let mut unit = BytesMut::with_capacity(payload.len() + 2);
        unit.put_u8(TEXT_START);
        unit.put_slice(payload);
        unit.put_u8(TEXT_END);
        self.base.transport.write(&unit)
    }

    fn process_buffer(&mut self) -> WsResult<()> {
        while let Some(&kind) = self.buffer.first() {
            if kind & 0x80 == 0 {
                let Some(end) = self.buffer.iter().position(|b| *b == TEXT_END) else {
                    if self.buffer.len() > self.max_message_size {
                        return Err(WsError::MessageTooLarge {
                            size: self.buffer.len(),
                            limit: self.max_message_size,
                        });
                    }
                    break;
                };
                let mut unit = self.buffer.split_to(end + 1);
                unit.advance(1);
                unit.truncate(end - 1);
                if kind == TEXT_START {
                    let frame = Frame::text(Bytes::from(unit));
                    debug!(len = frame.payload().len(), "text unit received");
                    self.base.transport.on_message(Message::from_frame(frame));
                } else {
                    debug!(kind, "discarding unit with unknown type");
                }
                continue;
            }

            let Some((len, header_len)) = read_length(&self.buffer[1..]) else {
                break;
            };
            if kind == TEXT_END && len == 0 {
                self.close_from_peer();
                return Ok(());
            }
            if len > self.max_frame_size as u64 {
                return Err(WsError::FrameTooLarge {
                    size: len,
                    limit: self.max_frame_size,
                });
            }
            let total = 1 + header_len + len as usize;
            if self.buffer.len() < total {
                break;
            }
            debug!(kind, len, "skipping length-prefixed unit");
            self.buffer.advance(total);
        }
        Ok(())
    }

    fn close_from_peer(&mut self) {
        debug!("closing handshake received");
        self.base.transport.write(&CLOSING_HANDSHAKE);
        self.base.transport.disconnect();
        self.state = ConnectionState::Closed;
        self.buffer.clear();
    }
}

/// Decode a base-128 length. Returns the length and how many bytes it
/// occupied, or `None` if the terminating byte has not arrived.
fn read_length(src: &[u8]) -> Option<(u64, usize)> {
    let mut len: u64 = 0;
    for (i, byte) in src.iter().enumerate() {
        len = len.saturating_mul(128).saturating_add(u64::from(byte & 0x7F));
        if byte & 0x80 == 0 {
            return Some((len, i + 1));
        }
    }
    None
}

impl<T: Transport> WebSocketConnection for HixieConnection<T> {
    fn send_handshake_response(&mut self) -> bool {
        let _enter = self.base.span.enter();
        let headers = &self.base.headers;
        let key1 = headers.get_str(names::SEC_WEBSOCKET_KEY1).unwrap_or_default();
        let key2 = headers.get_str(names::SEC_WEBSOCKET_KEY2).unwrap_or_default();
        let origin = headers.get_str(names::ORIGIN).unwrap_or_default();
        let host = headers.get_str(names::HOST).unwrap_or_default();
        let path = headers.get_str(names::GET).unwrap_or_default();

        let digest = hixie_digest(key1, key2, &self.key3);
        let response = hixie_response(origin, host, path, &digest);
        let sent = self.base.transport.write(&response);
        if sent {
            debug!(path, "handshake response sent");
        } else {
            warn!("failed to write handshake response");
        }
        sent
    }

    fn read_frame(&mut self, data: &[u8]) -> WsResult<()> {
        if self.state == ConnectionState::Closed {
            return Ok(());
        }
        let span = self.base.span.clone();
        let _enter = span.enter();
        self.buffer.extend_from_slice(data);
        self.process_buffer()
    }

    fn send_frame(&mut self, frame: &Frame) -> bool {
        // Text only, and never a fragment.
        if frame.opcode() != Opcode::Text || !frame.fin() {
            return false;
        }
        self.write_unit(frame.payload())
    }

    fn send_message(&mut self, message: &Message) -> bool {
        if !message.is_text() {
            return false;
        }
        self.write_unit(&message.payload())
    }

    fn send_string(&mut self, text: &str) -> bool {
        self.write_unit(text.as_bytes())
    }

    fn disconnect(&mut self) {
        if self.state != ConnectionState::Closed {
            self.state = ConnectionState::Closed;
            self.buffer.clear();
            self.base.transport.close();
        }
    }
}

//! Reassembly of fragmented data frames.

use crate::config::ProtocolConfig;
use crate::error::{WsError, WsResult};
use crate::frame::{Frame, Opcode};
use crate::message::Message;

/// Accumulates data frames into complete messages.
///
/// At most one message is open at a time. In permissive mode any data frame
/// arriving while a message is open is appended to it, and any data frame
/// arriving while none is open starts a new one. Strict mode requires
/// Continuation frames exactly when a message is open.
#[derive(Debug)]
pub struct MessageAssembler {
    current: Option<Message>,
    size: usize,
    fragments: usize,
    max_message_size: usize,
    max_fragments: usize,
    strict: bool,
}

impl MessageAssembler {
    /// Create an assembler from the protocol configuration.
    pub fn new(config: &ProtocolConfig) -> Self {
        Self {
            current: None,
            size: 0,
            fragments: 0,
            max_message_size: config.max_message_size,
            max_fragments: config.max_fragments,
            strict: config.strict_continuation,
        }
    }

    /// Feed one data frame.
    ///
    /// Returns the message once its final fragment has been appended. The
    /// open slot is cleared at that point.
    pub fn push(&mut self, frame: Frame) -> WsResult<Option<Message>> {
        debug_assert!(frame.opcode().is_data());

        let open = self.current.is_some();
        if self.strict {
            match (open, frame.opcode()) {
                (true, Opcode::Text | Opcode::Binary) => {
                    self.reset();
                    return Err(WsError::protocol_error(
                        "new data frame while a fragmented message is open",
                    ));
                }
                (false, Opcode::Continuation) => {
                    return Err(WsError::protocol_error(
                        "continuation frame without an open message",
                    ));
                }
                _ => {}
            }
        }

        let size = self.size.saturating_add(frame.payload().len());
        if size > self.max_message_size {
            self.reset();
            return Err(WsError::MessageTooLarge {
                size,
                limit: self.max_message_size,
            });
        }
        if self.fragments >= self.max_fragments {
            self.reset();
            return Err(WsError::TooManyFragments {
                limit: self.max_fragments,
            });
        }
        self.size = size;
        self.fragments += 1;

        match self.current.as_mut() {
            Some(message) => message.append(frame),
            None => self.current = Some(Message::from_frame(frame)),
        }

        if self.current.as_ref().is_some_and(Message::is_finalized) {
            self.size = 0;
            self.fragments = 0;
            return Ok(self.current.take());
        }
        Ok(None)
    }

    /// Whether a fragmented message is waiting for more frames.
    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    /// Bytes accumulated in the open message.
    pub fn len(&self) -> usize {
        self.size
    }

    /// Frames accumulated in the open message.
    pub fn fragments(&self) -> usize {
        self.fragments
    }

    /// Whether no bytes are accumulated.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop the open message.
    pub fn reset(&mut self) {
        self.current = None;
        self.size = 0;
        self.fragments = 0;
    }
}

//! Hybi frame model and codec.
//!
//! # Frame Format
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-------+-+-------------+-------------------------------+
//! |F|R|R|R| opcode|M| Payload len |    Extended payload length    |
//! |I|S|S|S|  (4)  |A|     (7)     |             (16/64)           |
//! |N|V|V|V|       |S|             |   (if payload len==126/127)   |
//! | |1|2|3|       |K|             |                               |
//! +-+-+-+-+-------+-+-------------+ - - - - - - - - - - - - - - - +
//! |     Extended payload length continued, if payload len == 127  |
//! + - - - - - - - - - - - - - - - +-------------------------------+
//! |                               |Masking-key, if MASK set to 1  |
//! +-------------------------------+-------------------------------+
//! | Masking-key (continued)       |          Payload Data         |
//! +-------------------------------- - - - - - - - - - - - - - - - +
//! ```
//!
//! Reserved bits are ignored on decode and never set on encode. Frames held
//! in memory are always unmasked; the masking key is applied during decode
//! and discarded.

use std::fmt;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{CloseCode, WsError, WsResult};

/// Frame opcode (4 bits).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Continuation of a fragmented message (0x0).
    Continuation,
    /// Text data (0x1).
    Text,
    /// Binary data (0x2).
    Binary,
    /// Connection close (0x8).
    Close,
    /// Ping (0x9).
    Ping,
    /// Pong (0xA).
    Pong,
    /// Any value without an assigned meaning (0x3-0x7, 0xB-0xF).
    Reserved(u8),
}

impl Opcode {
    /// Parse the low nibble of a byte.
    pub fn from_u8(value: u8) -> Self {
        match value & 0x0F {
            0x0 => Self::Continuation,
            0x1 => Self::Text,
            0x2 => Self::Binary,
            0x8 => Self::Close,
            0x9 => Self::Ping,
            0xA => Self::Pong,
            other => Self::Reserved(other),
        }
    }

    /// The 4-bit wire value.
    pub fn as_u8(self) -> u8 {
        match self {
            Self::Continuation => 0x0,
            Self::Text => 0x1,
            Self::Binary => 0x2,
            Self::Close => 0x8,
            Self::Ping => 0x9,
            Self::Pong => 0xA,
            Self::Reserved(value) => value & 0x0F,
        }
    }

    /// Close, Ping or Pong.
    pub const fn is_control(self) -> bool {
        matches!(self, Self::Close | Self::Ping | Self::Pong)
    }

    /// Continuation, Text or Binary.
    pub const fn is_data(self) -> bool {
        matches!(self, Self::Continuation | Self::Text | Self::Binary)
    }

    /// Neither control nor data.
    pub const fn is_reserved(self) -> bool {
        matches!(self, Self::Reserved(_))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Continuation => write!(f, "continuation"),
            Self::Text => write!(f, "text"),
            Self::Binary => write!(f, "binary"),
            Self::Close => write!(f, "close"),
            Self::Ping => write!(f, "ping"),
            Self::Pong => write!(f, "pong"),
            Self::Reserved(value) => write!(f, "reserved(0x{value:x})"),
        }
    }
}

/// A single unmasked frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    fin: bool,
    opcode: Opcode,
    payload: Bytes,
}

impl Frame {
    /// Create a frame from its parts.
    pub fn new(opcode: Opcode, fin: bool, payload: impl Into<Bytes>) -> Self {
        Self {
            fin,
            opcode,
            payload: payload.into(),
        }
    }

    /// A final text frame.
    pub fn text(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Text, true, payload)
    }

    /// A final binary frame.
    pub fn binary(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Binary, true, payload)
    }

    /// A continuation frame.
    pub fn continuation(fin: bool, payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Continuation, fin, payload)
    }

    /// A ping frame.
    pub fn ping(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Ping, true, payload)
    }

    /// A pong frame.
    pub fn pong(payload: impl Into<Bytes>) -> Self {
        Self::new(Opcode::Pong, true, payload)
    }

    /// A close frame without a status code.
    pub fn close_empty() -> Self {
        Self::new(Opcode::Close, true, Bytes::new())
    }

    /// A close frame carrying a status code and reason.
    pub fn close(code: CloseCode, reason: &str) -> Self {
        Self::close_raw(code.as_u16(), reason)
    }

    /// A close frame carrying an arbitrary numeric status code.
    pub fn close_raw(code: u16, reason: &str) -> Self {
        let mut payload = BytesMut::with_capacity(2 + reason.len());
        payload.put_u16(code);
        payload.put_slice(reason.as_bytes());
        Self::new(Opcode::Close, true, payload.freeze())
    }

    /// Whether this is the final fragment of a message.
    pub fn fin(&self) -> bool {
        self.fin
    }

    /// The frame opcode.
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// The unmasked payload.
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Consume the frame, returning its payload.
    pub fn into_payload(self) -> Bytes {
        self.payload
    }

    /// The status code of a close frame, if it carries one.
    pub fn close_code(&self) -> Option<u16> {
        if self.opcode != Opcode::Close || self.payload.len() < 2 {
            return None;
        }
        Some(u16::from_be_bytes([self.payload[0], self.payload[1]]))
    }

    /// Encode as an unmasked server-to-client frame.
    pub fn encode(&self) -> BytesMut {
        self.encode_inner(None)
    }

    /// Encode with a masking key, as a client would.
    pub fn encode_masked(&self, key: [u8; 4]) -> BytesMut {
        self.encode_inner(Some(key))
    }

    fn encode_inner(&self, mask: Option<[u8; 4]>) -> BytesMut {
        let len = self.payload.len();
        let mut dst = BytesMut::with_capacity(14 + len);

        let fin_bit: u8 = if self.fin { 0x80 } else { 0x00 };
        dst.put_u8(fin_bit | self.opcode.as_u8());

        let mask_bit = if mask.is_some() { 0x80 } else { 0x00 };
        if len < 126 {
            dst.put_u8(mask_bit | len as u8);
        } else if len <= usize::from(u16::MAX) {
            dst.put_u8(mask_bit | 126);
            dst.put_u16(len as u16);
        } else {
            dst.put_u8(mask_bit | 127);
            dst.put_u64(len as u64);
        }

        match mask {
            Some(key) => {
                dst.put_slice(&key);
                let start = dst.len();
                dst.put_slice(&self.payload);
                apply_mask(&mut dst[start..], key);
            }
            None => dst.put_slice(&self.payload),
        }

        dst
    }

    /// Decode one frame from the front of `src`.
    ///
    /// Returns `Ok(None)` and leaves `src` untouched when the buffer does not
    /// yet hold a complete frame. On success the frame's bytes are removed
    /// from `src`.
    pub fn decode(src: &mut BytesMut, max_frame_size: usize) -> WsResult<Option<Self>> {
        if src.len() < 2 {
            return Ok(None);
        }

        let fin = src[0] & 0x80 != 0;
        let opcode = Opcode::from_u8(src[0]);
        let masked = src[1] & 0x80 != 0;

        let (len, mut header_len) = match src[1] & 0x7F {
            126 => {
                if src.len() < 4 {
                    return Ok(None);
                }
                (u64::from(u16::from_be_bytes([src[2], src[3]])), 4)
            }
            127 => {
                if src.len() < 10 {
                    return Ok(None);
                }
                let mut raw = [0u8; 8];
                raw.copy_from_slice(&src[2..10]);
                let len = u64::from_be_bytes(raw);
                if len >> 63 != 0 {
                    return Err(WsError::InvalidLength(len));
                }
                (len, 10)
            }
            short => (u64::from(short), 2),
        };

        if len > max_frame_size as u64 {
            return Err(WsError::FrameTooLarge {
                size: len,
                limit: max_frame_size,
            });
        }
        let len = len as usize;

        if masked {
            header_len += 4;
        }
        if src.len() < header_len + len {
            src.reserve(header_len + len - src.len());
            return Ok(None);
        }

        let mask = masked.then(|| {
            let mut key = [0u8; 4];
            key.copy_from_slice(&src[header_len - 4..header_len]);
            key
        });

        src.advance(header_len);
        let mut payload = src.split_to(len);
        if let Some(key) = mask {
            apply_mask(&mut payload, key);
        }

        Ok(Some(Self {
            fin,
            opcode,
            payload: payload.freeze(),
        }))
    }
}

/// XOR `buf` against `key`, cycling the key by position modulo 4.
pub fn apply_mask(buf: &mut [u8], key: [u8; 4]) {
    for (i, byte) in buf.iter_mut().enumerate() {
        *byte ^= key[i % 4];
    }
}

/// Buffers raw transport chunks and yields complete frames.
///
/// The transport delivers arbitrary chunks, so partial frames stay buffered
/// until the rest arrives.
#[derive(Debug)]
pub struct FrameReader {
    buffer: BytesMut,
    max_frame_size: usize,
}

impl FrameReader {
    /// Create a reader enforcing the given per-frame limit.
    pub fn new(max_frame_size: usize) -> Self {
        Self {
            buffer: BytesMut::new(),
            max_frame_size,
        }
    }

    /// Append a chunk received from the transport.
    pub fn extend(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
    }

    /// Take the next complete frame, if one is buffered.
    pub fn next_frame(&mut self) -> WsResult<Option<Frame>> {
        Frame::decode(&mut self.buffer, self.max_frame_size)
    }

    /// Number of bytes waiting for the rest of a frame.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Drop anything buffered.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }
}

//! Application messages.
//!
//! A [`Message`] is the ordered run of data frames that make up one logical
//! payload. Legacy-dialect messages always hold exactly one frame.

use bytes::{Bytes, BytesMut};
use serde::{Deserialize, Serialize};

use crate::error::{WsError, WsResult};
use crate::frame::{Frame, Opcode};

/// One logical application payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    frames: Vec<Frame>,
    finalized: bool,
}

impl Message {
    /// Start a message from its first frame.
    ///
    /// The message is finalized immediately if the frame has `fin` set.
    pub fn from_frame(frame: Frame) -> Self {
        let finalized = frame.fin();
        Self {
            frames: vec![frame],
            finalized,
        }
    }

    /// Create a single-frame text message.
    pub fn text(text: impl Into<String>) -> Self {
        let text: String = text.into();
        Self::from_frame(Frame::text(text))
    }

    /// Create a single-frame binary message.
    pub fn binary(data: impl Into<Bytes>) -> Self {
        Self::from_frame(Frame::binary(data))
    }

    /// Append the next fragment. A frame with `fin` set finalizes the
    /// message.
    pub fn append(&mut self, frame: Frame) {
        self.finalized = frame.fin();
        self.frames.push(frame);
    }

    /// Whether the terminal fragment has been appended.
    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Frames in arrival order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Consume the message, returning its frames.
    pub fn into_frames(self) -> Vec<Frame> {
        self.frames
    }

    /// The opcode of the first frame.
    pub fn opcode(&self) -> Opcode {
        self.frames
            .first()
            .map_or(Opcode::Continuation, Frame::opcode)
    }

    /// Check if this is a text message.
    pub fn is_text(&self) -> bool {
        self.opcode() == Opcode::Text
    }

    /// Check if this is a binary message.
    pub fn is_binary(&self) -> bool {
        self.opcode() == Opcode::Binary
    }

    /// The concatenated payload of every frame.
    pub fn payload(&self) -> Bytes {
        match self.frames.as_slice() {
            [single] => single.payload().clone(),
            frames => {
                let mut buf = BytesMut::with_capacity(self.len());
                for frame in frames {
                    buf.extend_from_slice(frame.payload());
                }
                buf.freeze()
            }
        }
    }

    /// Decode the payload as UTF-8.
    pub fn to_text(&self) -> WsResult<String> {
        String::from_utf8(self.payload().to_vec()).map_err(|e| WsError::DecodeFailed(e.to_string()))
    }

    /// Try to parse the payload as JSON.
    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> WsResult<T> {
        serde_json::from_slice(&self.payload()).map_err(|e| WsError::DecodeFailed(e.to_string()))
    }

    /// Create a text message from a JSON-serializable value.
    pub fn from_json<T: Serialize>(value: &T) -> WsResult<Self> {
        let text =
            serde_json::to_string(value).map_err(|e| WsError::EncodeFailed(e.to_string()))?;
        Ok(Self::text(text))
    }

    /// Total payload length in bytes.
    pub fn len(&self) -> usize {
        self.frames.iter().map(|f| f.payload().len()).sum()
    }

    /// Check if the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<String> for Message {
    fn from(s: String) -> Self {
        Self::text(s)
    }
}

impl From<&str> for Message {
    fn from(s: &str) -> Self {
        Self::text(s)
    }
}

impl From<Vec<u8>> for Message {
    fn from(b: Vec<u8>) -> Self {
        Self::binary(b)
    }
}

impl From<Bytes> for Message {
    fn from(b: Bytes) -> Self {
        Self::binary(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_text() {
        let msg = Message::text("hello");
        assert!(msg.is_text());
        assert!(msg.is_finalized());
        assert_eq!(msg.to_text().unwrap(), "hello");
        assert_eq!(msg.len(), 5);
        assert_eq!(msg.frames().len(), 1);
    }

    #[test]
    fn test_message_binary() {
        let msg = Message::binary(vec![1, 2, 3, 4]);
        assert!(msg.is_binary());
        assert_eq!(msg.payload().as_ref(), &[1, 2, 3, 4]);
    }

    #[test]
    fn test_fragments_concatenate() {
        let mut msg = Message::from_frame(Frame::new(Opcode::Text, false, "ab"));
        assert!(!msg.is_finalized());
        msg.append(Frame::continuation(true, "cd"));
        assert!(msg.is_finalized());
        assert_eq!(msg.payload().as_ref(), b"abcd");
        assert_eq!(msg.opcode(), Opcode::Text);
    }

    #[test]
    fn test_invalid_utf8_is_decode_error() {
        let msg = Message::binary(vec![0xFF, 0xFE]);
        assert!(matches!(msg.to_text(), Err(WsError::DecodeFailed(_))));
    }

    #[test]
    fn test_message_json() {
        #[derive(Serialize, Deserialize, Debug, PartialEq)]
        struct Data {
            value: i32,
        }

        let data = Data { value: 42 };
        let msg = Message::from_json(&data).unwrap();
        assert!(msg.is_text());

        let parsed: Data = msg.json().unwrap();
        assert_eq!(parsed, data);
    }

    #[test]
    fn test_message_conversions() {
        let msg: Message = "hello".into();
        assert!(msg.is_text());

        let msg: Message = vec![1, 2, 3].into();
        assert!(msg.is_binary());
        assert!(!msg.is_empty());
    }
}

//! Control-frame state machine.
//!
//! ```text
//!            Ping / Pong
//!            ┌────────┐
//!            ▼        │
//!        ┌──────┐─────┘   Close received / begin_close()   ┌─────────┐
//!   ───► │ Open │ ─────────────────────────────────────────► │ Closing │
//!        └──────┘                                           └────┬────┘
//!                                                                │ finish_close()
//!                                                                ▼
//!                                                           ┌────────┐
//!                                                           │ Closed │
//!                                                           └────────┘
//! ```
//!
//! `Closing` only lasts while the reply is written and the transport is torn
//! down; callers move on to `Closed` in the same step.

use std::fmt;

use crate::frame::{Frame, Opcode};

/// Lifecycle phase of a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionState {
    /// Frames flow in both directions.
    Open,
    /// A close has been started and is being completed.
    Closing,
    /// Nothing more is read or written.
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// What a connection must do in response to a control frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlAction {
    /// Write this Close frame, then disconnect the transport.
    ReplyClose(Frame),
    /// Write this Pong frame.
    ReplyPong(Frame),
    /// Nothing to do.
    Ignore,
}

/// Tracks the close handshake and answers pings.
#[derive(Debug)]
pub struct ControlStateMachine {
    state: ConnectionState,
}

impl Default for ControlStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlStateMachine {
    /// Start in the `Open` state.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Open,
        }
    }

    /// Current state.
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Whether frames may still be exchanged.
    pub fn is_open(&self) -> bool {
        self.state == ConnectionState::Open
    }

    /// Decide how to answer a control (or reserved) frame.
    ///
    /// A Close reply echoes the peer's status code when it sent one. A Pong
    /// reply echoes the Ping payload. Anything received outside `Open` is
    /// ignored.
    pub fn on_frame(&mut self, frame: &Frame) -> ControlAction {
        if !self.is_open() {
            return ControlAction::Ignore;
        }

        match frame.opcode() {
            Opcode::Close => {
                self.state = ConnectionState::Closing;
                let reply = frame
                    .close_code()
                    .map_or_else(Frame::close_empty, |code| Frame::close_raw(code, ""));
                ControlAction::ReplyClose(reply)
            }
            Opcode::Ping => ControlAction::ReplyPong(Frame::pong(frame.payload().clone())),
            _ => ControlAction::Ignore,
        }
    }

    /// Start a locally initiated close. Returns `false` if a close is already
    /// under way or done.
    pub fn begin_close(&mut self) -> bool {
        if !self.is_open() {
            return false;
        }
        self.state = ConnectionState::Closing;
        true
    }

    /// Mark the connection closed.
    pub fn finish_close(&mut self) {
        self.state = ConnectionState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CloseCode;

    #[test]
    fn test_initial_state_is_open() {
        let machine = ControlStateMachine::new();
        assert_eq!(machine.state(), ConnectionState::Open);
    }

    #[test]
    fn test_ping_replies_pong_without_state_change() {
        let mut machine = ControlStateMachine::new();
        let action = machine.on_frame(&Frame::ping("beat"));
        assert_eq!(action, ControlAction::ReplyPong(Frame::pong("beat")));
        assert_eq!(machine.state(), ConnectionState::Open);
    }

    #[test]
    fn test_pong_is_ignored() {
        let mut machine = ControlStateMachine::new();
        assert_eq!(machine.on_frame(&Frame::pong("")), ControlAction::Ignore);
        assert!(machine.is_open());
    }

    #[test]
    fn test_reserved_opcode_is_ignored() {
        let mut machine = ControlStateMachine::new();
        let frame = Frame::new(Opcode::Reserved(0xB), true, "x");
        assert_eq!(machine.on_frame(&frame), ControlAction::Ignore);
        assert!(machine.is_open());
    }

    #[test]
    fn test_close_echoes_status_code() {
        let mut machine = ControlStateMachine::new();
        let action = machine.on_frame(&Frame::close(CloseCode::GoingAway, "bye"));
        match action {
            ControlAction::ReplyClose(reply) => assert_eq!(reply.close_code(), Some(1001)),
            other => panic!("unexpected action: {other:?}"),
        }
        assert_eq!(machine.state(), ConnectionState::Closing);
        machine.finish_close();
        assert_eq!(machine.state(), ConnectionState::Closed);
    }

    #[test]
    fn test_empty_close_gets_empty_reply() {
        let mut machine = ControlStateMachine::new();
        let action = machine.on_frame(&Frame::close_empty());
        assert_eq!(action, ControlAction::ReplyClose(Frame::close_empty()));
    }

    #[test]
    fn test_frames_after_close_are_ignored() {
        let mut machine = ControlStateMachine::new();
        machine.on_frame(&Frame::close_empty());
        machine.finish_close();
        assert_eq!(machine.on_frame(&Frame::ping("")), ControlAction::Ignore);
        assert_eq!(machine.on_frame(&Frame::close_empty()), ControlAction::Ignore);
    }

    #[test]
    fn test_begin_close_once() {
        let mut machine = ControlStateMachine::new();
        assert!(machine.begin_close());
        assert!(!machine.begin_close());
        machine.finish_close();
        assert!(!machine.begin_close());
    }
}

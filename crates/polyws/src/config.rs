//! Protocol configuration.
//!
//! Limits and compatibility switches shared by every connection a server
//! accepts. The defaults reproduce the permissive behavior legacy clients
//! rely on.

use serde::{Deserialize, Serialize};

/// Configuration for the protocol layer of a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ProtocolConfig {
    /// Maximum payload of a single frame in bytes (default: 16 MB).
    pub max_frame_size: usize,
    /// Maximum payload of an assembled message in bytes (default: 64 MB).
    pub max_message_size: usize,
    /// Maximum number of frames in one fragmented message (default: 4096).
    pub max_fragments: usize,
    /// Maximum size of the opening handshake in bytes (default: 16 KB).
    pub max_handshake_size: usize,
    /// Reject data frames that break continuation ordering (default: false).
    ///
    /// When disabled, a new Text/Binary frame arriving while a message is
    /// open is appended to that message, and a Continuation frame arriving
    /// with no open message starts a new one.
    pub strict_continuation: bool,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            max_frame_size: 16 * 1024 * 1024,   // 16 MB
            max_message_size: 64 * 1024 * 1024, // 64 MB
            max_fragments: 4096,
            max_handshake_size: 16 * 1024,      // 16 KB
            strict_continuation: false,
        }
    }
}

impl ProtocolConfig {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum frame size.
    pub fn max_frame_size(mut self, size: usize) -> Self {
        self.max_frame_size = size;
        self
    }

    /// Set the maximum message size.
    pub fn max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Set the maximum number of fragments per message.
    pub fn max_fragments(mut self, count: usize) -> Self {
        self.max_fragments = count;
        self
    }

    /// Set the maximum handshake size.
    pub fn max_handshake_size(mut self, size: usize) -> Self {
        self.max_handshake_size = size;
        self
    }

    /// Set whether continuation ordering is enforced.
    pub fn strict_continuation(mut self, strict: bool) -> Self {
        self.strict_continuation = strict;
        self
    }
}

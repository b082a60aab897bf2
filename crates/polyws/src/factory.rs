//! Dialect detection and connection construction.
//!
//! Detection looks at two signals only, in this order:
//!
//! 1. a `Sec-WebSocket-Key1` header selects [`Dialect::Hixie`];
//! 2. raw bytes starting with `<policy-file-request/>` select
//!    [`Dialect::Flash`];
//! 3. anything else is [`Dialect::Hybi`], even without a key header.

use tracing::debug;

use crate::config::ProtocolConfig;
use crate::connection::{
    Connection, Dialect, FlashConnection, HixieConnection, HybiConnection,
};
use crate::handshake::FLASH_POLICY_REQUEST;
use crate::headers::{names, Headers};
use crate::transport::Transport;

const HEADER_TERMINATOR: &[u8] = b"\r\n\r\n";
const HIXIE_KEY3_LEN: usize = 8;

/// Decide which dialect a peer speaks.
pub fn classify(headers: &Headers, raw: &[u8]) -> Dialect {
    if headers.contains(names::SEC_WEBSOCKET_KEY1) {
        Dialect::Hixie
    } else if raw.starts_with(FLASH_POLICY_REQUEST) {
        Dialect::Flash
    } else {
        Dialect::Hybi
    }
}

/// Tokenize the raw handshake and construct the matching connection.
///
/// The handshake response has been written to the transport when this
/// returns.
pub fn accept<T: Transport>(transport: T, raw: &[u8], config: &ProtocolConfig) -> Connection<T> {
    accept_with_headers(transport, Headers::parse(raw), raw, config)
}

/// Construct a connection from headers tokenized elsewhere.
pub fn accept_with_headers<T: Transport>(
    transport: T,
    headers: Headers,
    raw: &[u8],
    config: &ProtocolConfig,
) -> Connection<T> {
    let dialect = classify(&headers, raw);
    debug!(connection_id = %transport.id(), %dialect, "dialect selected");
    match dialect {
        Dialect::Hixie => Connection::Hixie(HixieConnection::new(transport, headers, raw, config)),
        Dialect::Flash => Connection::Flash(FlashConnection::new(transport, headers)),
        Dialect::Hybi => Connection::Hybi(HybiConnection::new(transport, headers, config)),
    }
}

/// Find where the opening handshake ends in `raw`.
///
/// Returns the number of bytes that belong to the handshake, or `None` if
/// more bytes are needed. A policy request ends after the marker and an
/// optional trailing NUL. An HTTP handshake ends at the blank line, plus the
/// 8 key bytes that follow it when `Sec-WebSocket-Key1` is present.
pub fn handshake_boundary(raw: &[u8]) -> Option<usize> {
    if raw.len() < FLASH_POLICY_REQUEST.len() && FLASH_POLICY_REQUEST.starts_with(raw) {
        return None;
    }
    if raw.starts_with(FLASH_POLICY_REQUEST) {
        let end = FLASH_POLICY_REQUEST.len();
        return Some(if raw.get(end) == Some(&0) { end + 1 } else { end });
    }

    let head_end = raw
        .windows(HEADER_TERMINATOR.len())
        .position(|window| window == HEADER_TERMINATOR)?
        + HEADER_TERMINATOR.len();

    if Headers::parse(&raw[..head_end]).contains(names::SEC_WEBSOCKET_KEY1) {
        let end = head_end + HIXIE_KEY3_LEN;
        return (raw.len() >= end).then_some(end);
    }
    Some(head_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_hixie() {
        let headers: Headers = [("Sec-Websocket-Key1", "4 @1  46546xW%0l 1 5")]
            .into_iter()
            .collect();
        assert_eq!(classify(&headers, b"GET / HTTP/1.1"), Dialect::Hixie);
    }

    #[test]
    fn test_classify_hixie_wins_over_policy_marker() {
        let headers: Headers = [("Sec-WebSocket-Key1", "1 1")].into_iter().collect();
        assert_eq!(classify(&headers, FLASH_POLICY_REQUEST), Dialect::Hixie);
    }

    #[test]
    fn test_classify_flash() {
        assert_eq!(
            classify(&Headers::new(), b"<policy-file-request/>\0"),
            Dialect::Flash
        );
    }

    #[test]
    fn test_classify_flash_marker_must_be_at_start() {
        assert_eq!(
            classify(&Headers::new(), b" <policy-file-request/>"),
            Dialect::Hybi
        );
    }

    #[test]
    fn test_classify_hybi() {
        let headers: Headers = [("Sec-Websocket-Key", "dGhlIHNhbXBsZSBub25jZQ==")]
            .into_iter()
            .collect();
        assert_eq!(classify(&headers, b"GET / HTTP/1.1"), Dialect::Hybi);
    }

    #[test]
    fn test_classify_unrecognised_falls_through_to_hybi() {
        assert_eq!(classify(&Headers::new(), b"garbage"), Dialect::Hybi);
    }

    #[test]
    fn test_boundary_policy_request() {
        assert_eq!(handshake_boundary(b"<policy-file-request/>"), Some(22));
        assert_eq!(handshake_boundary(b"<policy-file-request/>\0"), Some(23));
        assert_eq!(handshake_boundary(b"<policy-file"), None);
    }

    #[test]
    fn test_boundary_hybi() {
        let raw = b"GET / HTTP/1.1\r\nHost: a\r\n\r\n\x81\x80";
        assert_eq!(handshake_boundary(raw), Some(27));
        assert_eq!(handshake_boundary(b"GET / HTTP/1.1\r\nHost: a\r\n"), None);
    }

    #[test]
    fn test_boundary_hixie_waits_for_key3() {
        let head = b"GET / HTTP/1.1\r\nSec-WebSocket-Key1: 1 1\r\n\r\n";
        assert_eq!(handshake_boundary(head), None);

        let mut full = head.to_vec();
        full.extend_from_slice(b"12345678");
        assert_eq!(handshake_boundary(&full), Some(head.len() + 8));
    }
}

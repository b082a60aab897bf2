//! Handshake codecs.
//!
//! Pure functions computing the key material each dialect returns to the
//! client, plus the exact response bytes written on construction of a
//! connection.

use base64::Engine;
use md5::Md5;
use sha1::{Digest, Sha1};

/// The WebSocket magic GUID used in the Hybi handshake.
pub const WEBSOCKET_GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";

/// Marker a Flash client sends instead of an HTTP request.
pub const FLASH_POLICY_REQUEST: &[u8] = b"<policy-file-request/>";

const RESPONSE_PREAMBLE: &str = "HTTP/1.1 101 WebSocket Protocol Handshake\r\n\
                                 Upgrade: WebSocket\r\n\
                                 Connection: Upgrade\r\n";

/// Compute the `Sec-WebSocket-Accept` token for a client key.
pub fn hybi_accept(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.as_bytes());
    hasher.update(WEBSOCKET_GUID.as_bytes());
    let result = hasher.finalize();
    base64::engine::general_purpose::STANDARD.encode(result)
}

/// Reduce a Hixie key to its 32-bit value.
///
/// The digits of the key form a decimal number which is divided by the
/// number of spaces in the key. A key without spaces is divided by one.
/// Digit strings too long for 64 bits saturate.
pub fn hixie_key_value(key: &str) -> u32 {
    let number = key
        .bytes()
        .filter(u8::is_ascii_digit)
        .fold(0u64, |acc, digit| {
            acc.saturating_mul(10).saturating_add(u64::from(digit - b'0'))
        });
    let spaces = key.bytes().filter(|b| *b == b' ').count().max(1) as u64;
    (number / spaces) as u32
}

/// Compute the 16-byte Hixie response digest.
///
/// `key3` is the trailer of the client handshake, normally its final 8
/// bytes; a shorter trailer is hashed as-is.
pub fn hixie_digest(key1: &str, key2: &str, key3: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(hixie_key_value(key1).to_be_bytes());
    hasher.update(hixie_key_value(key2).to_be_bytes());
    hasher.update(key3);
    let mut digest = [0u8; 16];
    digest.copy_from_slice(&hasher.finalize());
    digest
}

/// Build the Hybi switching-protocols response.
pub fn hybi_response(accept: &str) -> String {
    format!("{RESPONSE_PREAMBLE}Sec-WebSocket-Accept: {accept}\r\n\r\n")
}

/// Build the Hixie switching-protocols response, digest included.
pub fn hixie_response(origin: &str, host: &str, path: &str, digest: &[u8; 16]) -> Vec<u8> {
    let head = format!(
        "{RESPONSE_PREAMBLE}Sec-WebSocket-Origin: {origin}\r\n\
         Sec-WebSocket-Location: ws://{host}{path}\r\n\r\n"
    );
    let mut response = Vec::with_capacity(head.len() + digest.len());
    response.extend_from_slice(head.as_bytes());
    response.extend_from_slice(digest);
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hybi_accept() {
        // RFC 6455 example
        let accept = hybi_accept("dGhlIHNhbXBsZSBub25jZQ==");
        assert_eq!(accept, "s3pPLMBiTxaQ9kYGzzhZRbK+xOo=");
    }

    #[test]
    fn test_hybi_accept_empty_key() {
        // A missing key is hashed as the empty string rather than rejected
        assert_eq!(hybi_accept("").len(), 28);
    }

    #[test]
    fn test_hixie_key_value() {
        // draft-hixie-thewebsocketprotocol-76 example keys
        assert_eq!(hixie_key_value("4 @1  46546xW%0l 1 5"), 829_309_203);
        assert_eq!(hixie_key_value("12998 5 Y3 1  .P00"), 259_970_620);
    }

    #[test]
    fn test_hixie_key_without_spaces_divides_by_one() {
        assert_eq!(hixie_key_value("12345"), 12345);
        assert_eq!(hixie_key_value(""), 0);
    }

    #[test]
    fn test_hixie_key_overflow_saturates() {
        let key = format!(" {}", "9".repeat(40));
        assert_eq!(hixie_key_value(&key), u64::MAX as u32);
    }

    #[test]
    fn test_hixie_digest() {
        let digest = hixie_digest("4 @1  46546xW%0l 1 5", "12998 5 Y3 1  .P00", b"^n:ds[4U");
        assert_eq!(&digest, b"8jKS'y:G*Co,Wxa-");
    }

    #[test]
    fn test_hybi_response_literal() {
        assert_eq!(
            hybi_response("abc="),
            "HTTP/1.1 101 WebSocket Protocol Handshake\r\n\
             Upgrade: WebSocket\r\n\
             Connection: Upgrade\r\n\
             Sec-WebSocket-Accept: abc=\r\n\r\n"
        );
    }

    #[test]
    fn test_hixie_response_literal() {
        let digest = *b"0123456789abcdef";
        let response = hixie_response("http://example.com", "example.com", "/demo", &digest);
        let expected = b"HTTP/1.1 101 WebSocket Protocol Handshake\r\n\
            Upgrade: WebSocket\r\n\
            Connection: Upgrade\r\n\
            Sec-WebSocket-Origin: http://example.com\r\n\
            Sec-WebSocket-Location: ws://example.com/demo\r\n\r\n\
            0123456789abcdef";
        assert_eq!(response, expected.to_vec());
    }
}

//! Handshake headers and cookies.
//!
//! [`Headers`] is built once per connection from the raw handshake bytes and
//! never changes afterwards. [`Cookies`] is derived from its `Cookie` entry.

use indexmap::IndexMap;

/// Well-known header names.
pub mod names {
    /// The request line entry; its value is the requested path.
    pub const GET: &str = "GET";
    /// Host header.
    pub const HOST: &str = "Host";
    /// Origin header.
    pub const ORIGIN: &str = "Origin";
    /// Hybi client key.
    pub const SEC_WEBSOCKET_KEY: &str = "Sec-WebSocket-Key";
    /// First Hixie key.
    pub const SEC_WEBSOCKET_KEY1: &str = "Sec-WebSocket-Key1";
    /// Second Hixie key.
    pub const SEC_WEBSOCKET_KEY2: &str = "Sec-WebSocket-Key2";
    /// Cookie header.
    pub const COOKIE: &str = "Cookie";
    /// Administrative key header.
    pub const ADMIN_KEY: &str = "Admin-Key";
}

/// The value of a header entry.
///
/// A field repeated in the handshake becomes a list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderValue {
    /// A field seen once.
    Single(String),
    /// A field seen more than once, in arrival order.
    Multi(Vec<String>),
}

impl HeaderValue {
    /// The first value of the entry.
    pub fn first(&self) -> &str {
        match self {
            Self::Single(value) => value,
            Self::Multi(values) => values.first().map_or("", String::as_str),
        }
    }

    /// Whether the field was repeated.
    pub fn is_multi(&self) -> bool {
        matches!(self, Self::Multi(_))
    }

    /// All values of the entry.
    pub fn values(&self) -> Vec<&str> {
        match self {
            Self::Single(value) => vec![value.as_str()],
            Self::Multi(values) => values.iter().map(String::as_str).collect(),
        }
    }

    fn push(&mut self, value: String) {
        match self {
            Self::Single(existing) => {
                let first = std::mem::take(existing);
                *self = Self::Multi(vec![first, value]);
            }
            Self::Multi(values) => values.push(value),
        }
    }
}

/// Ordered header map with ASCII case-insensitive lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Headers {
    entries: IndexMap<String, HeaderValue>,
}

impl Headers {
    /// Create an empty header map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Tokenize a raw handshake.
    ///
    /// The request line `GET /path HTTP/1.1` becomes the `GET` entry. Each
    /// following `Name: value` line becomes an entry with a word-capitalised
    /// name. Tokenizing stops at the first blank line; lines without a colon
    /// are skipped.
    pub fn parse(raw: &[u8]) -> Self {
        let text = String::from_utf8_lossy(raw);
        let mut headers = Self::new();
        let mut lines = text.lines();

        if let Some(request_line) = lines.next() {
            let mut parts = request_line.split_whitespace();
            if let (Some(method), Some(target), Some(version)) =
                (parts.next(), parts.next(), parts.next())
            {
                if version.starts_with("HTTP/") {
                    headers.insert(method, target);
                }
            }
        }

        for line in lines {
            if line.is_empty() {
                break;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.insert(canonical_name(name.trim()), value.trim());
            }
        }

        headers
    }

    /// Add an entry. Adding a name that is already present turns the entry
    /// into a list.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) {
        let name = name.into();
        let value = value.into();
        match self.position(&name) {
            Some(index) => {
                if let Some((_, existing)) = self.entries.get_index_mut(index) {
                    existing.push(value);
                }
            }
            None => {
                self.entries.insert(name, HeaderValue::Single(value));
            }
        }
    }

    /// Look up an entry.
    pub fn get(&self, name: &str) -> Option<&HeaderValue> {
        self.position(name)
            .and_then(|index| self.entries.get_index(index))
            .map(|(_, value)| value)
    }

    /// Look up the first value of an entry.
    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.get(name).map(HeaderValue::first)
    }

    /// Check whether an entry exists.
    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate over entries in arrival order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &HeaderValue)> {
        self.entries.iter().map(|(name, value)| (name.as_str(), value))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.entries
            .keys()
            .position(|key| key.eq_ignore_ascii_case(name))
    }
}

impl<K, V> FromIterator<(K, V)> for Headers
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = Self::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// Capitalise each dash-separated word: `sec-websocket-key1` becomes
/// `Sec-Websocket-Key1`.
pub fn canonical_name(name: &str) -> String {
    name.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => {
                    first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase()
                }
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Cookies sent with the handshake.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cookies {
    values: IndexMap<String, String>,
}

impl Cookies {
    /// Parse a single `Cookie` header value.
    ///
    /// Pairs are separated by `;` and split at the first `=`. A pair without
    /// `=` maps to an empty value; a repeated name keeps the last value.
    pub fn parse(header: &str) -> Self {
        let values = header
            .split(';')
            .map(str::trim)
            .filter(|pair| !pair.is_empty())
            .map(|pair| match pair.split_once('=') {
                Some((name, value)) => (name.trim().to_string(), value.trim().to_string()),
                None => (pair.to_string(), String::new()),
            })
            .collect();
        Self { values }
    }

    /// Derive cookies from handshake headers.
    ///
    /// A `Cookie` field that was sent more than once yields no cookies at all.
    pub fn from_headers(headers: &Headers) -> Self {
        match headers.get(names::COOKIE) {
            Some(HeaderValue::Single(value)) => Self::parse(value),
            Some(HeaderValue::Multi(_)) | None => Self::default(),
        }
    }

    /// Look up a cookie.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }

    /// Number of cookies.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether there are no cookies.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Iterate over cookies in header order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.values
            .iter()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HIXIE_REQUEST: &[u8] = b"GET /demo HTTP/1.1\r\n\
        Host: example.com\r\n\
        Connection: Upgrade\r\n\
        Sec-WebSocket-Key2: 12998 5 Y3 1  .P00\r\n\
        Sec-WebSocket-Protocol: sample\r\n\
        Upgrade: WebSocket\r\n\
        Sec-WebSocket-Key1: 4 @1  46546xW%0l 1 5\r\n\
        Origin: http://example.com\r\n\
        \r\n\
        ^n:ds[4U";

    #[test]
    fn test_parse_request_line() {
        let headers = Headers::parse(HIXIE_REQUEST);
        assert_eq!(headers.get_str(names::GET), Some("/demo"));
        assert_eq!(headers.get_str(names::HOST), Some("example.com"));
    }

    #[test]
    fn test_parse_canonicalises_names() {
        let headers = Headers::parse(HIXIE_REQUEST);
        let names: Vec<&str> = headers.iter().map(|(name, _)| name).collect();
        assert!(names.contains(&"Sec-Websocket-Key1"));
        assert!(names.contains(&"Sec-Websocket-Protocol"));
    }

    #[test]
    fn test_lookup_is_case_insensitive() {
        let headers = Headers::parse(HIXIE_REQUEST);
        assert_eq!(headers.get_str("Sec-WebSocket-Key1"), Some("4 @1  46546xW%0l 1 5"));
        assert_eq!(headers.get_str("sec-websocket-key1"), Some("4 @1  46546xW%0l 1 5"));
        assert!(headers.contains("ORIGIN"));
    }

    #[test]
    fn test_parse_stops_at_blank_line() {
        let headers = Headers::parse(HIXIE_REQUEST);
        assert_eq!(headers.len(), 8);
        assert!(!headers.contains("^n"));
    }

    #[test]
    fn test_parse_without_request_line() {
        let headers = Headers::parse(b"<policy-file-request/>\0");
        assert!(headers.is_empty());
    }

    #[test]
    fn test_repeated_field_becomes_multi() {
        let headers = Headers::parse(b"GET / HTTP/1.1\r\nCookie: a=1\r\nCookie: b=2\r\n\r\n");
        let cookie = headers.get(names::COOKIE).unwrap();
        assert!(cookie.is_multi());
        assert_eq!(cookie.values(), vec!["a=1", "b=2"]);
        assert_eq!(cookie.first(), "a=1");
    }

    #[test]
    fn test_from_iterator() {
        let headers: Headers = [("Host", "localhost"), ("Origin", "null")].into_iter().collect();
        assert_eq!(headers.get_str("host"), Some("localhost"));
        assert_eq!(headers.len(), 2);
    }

    #[test]
    fn test_canonical_name() {
        assert_eq!(canonical_name("sec-websocket-key1"), "Sec-Websocket-Key1");
        assert_eq!(canonical_name("HOST"), "Host");
        assert_eq!(canonical_name("admin-key"), "Admin-Key");
    }

    #[test]
    fn test_cookie_parse() {
        let cookies = Cookies::parse("session=abc123; theme=dark;flag; empty=");
        assert_eq!(cookies.get("session"), Some("abc123"));
        assert_eq!(cookies.get("theme"), Some("dark"));
        assert_eq!(cookies.get("flag"), Some(""));
        assert_eq!(cookies.get("empty"), Some(""));
        assert_eq!(cookies.len(), 4);
    }

    #[test]
    fn test_cookie_value_keeps_equals() {
        let cookies = Cookies::parse("token=a=b=c");
        assert_eq!(cookies.get("token"), Some("a=b=c"));
    }

    #[test]
    fn test_cookies_absent_header() {
        let cookies = Cookies::from_headers(&Headers::new());
        assert!(cookies.is_empty());
    }

    #[test]
    fn test_cookies_multi_valued_header_is_empty() {
        let mut headers = Headers::new();
        headers.insert("Cookie", "a=1");
        headers.insert("Cookie", "b=2");
        assert!(Cookies::from_headers(&headers).is_empty());
    }
}

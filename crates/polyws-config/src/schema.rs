//! Configuration schema types.
//!
//! Each struct here maps to one `[section]` of the configuration file. The
//! `[protocol]` section is the core [`ProtocolConfig`](polyws::ProtocolConfig)
//! and is defined in the `polyws` crate.

use serde::{Deserialize, Serialize};

/// Cross-domain policy served to Flash clients when no policy is configured.
pub const DEFAULT_FLASH_POLICY: &str =
    r#"<cross-domain-policy><allow-access-from domain="*" to-ports="*"/></cross-domain-policy>"#;

/// Listener section.
///
/// # Example
///
/// ```
/// use polyws_config::ServerSection;
///
/// let config = ServerSection {
///     bind_addr: "127.0.0.1:9000".to_string(),
///     ..Default::default()
/// };
/// assert_eq!(config.max_connections, 10000);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ServerSection {
    /// Listener bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Graceful shutdown timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum number of concurrent connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    /// Time allowed for a client to send its complete opening handshake.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,

    /// Size of each socket read in bytes.
    #[serde(default = "default_read_buffer_size")]
    pub read_buffer_size: usize,

    /// Bytes a connection may have queued for a peer that is not reading.
    /// Past this the connection is dropped.
    #[serde(default = "default_max_outbound_buffer")]
    pub max_outbound_buffer: usize,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_connections: default_max_connections(),
            handshake_timeout_secs: default_handshake_timeout(),
            read_buffer_size: default_read_buffer_size(),
            max_outbound_buffer: default_max_outbound_buffer(),
        }
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_shutdown_timeout() -> u64 {
    30
}

fn default_max_connections() -> usize {
    10000
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_read_buffer_size() -> usize {
    8192
}

fn default_max_outbound_buffer() -> usize {
    16 * 1024 * 1024
}

/// Flash policy section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FlashSection {
    /// Answer `<policy-file-request/>` probes. When disabled the socket is
    /// closed without a reply.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Policy XML written in reply, followed by a NUL byte.
    #[serde(default = "default_policy")]
    pub policy: String,

    /// Optional dedicated policy listener port (conventionally 843).
    #[serde(default)]
    pub policy_port: Option<u16>,
}

impl Default for FlashSection {
    fn default() -> Self {
        Self {
            enabled: true,
            policy: default_policy(),
            policy_port: None,
        }
    }
}

fn default_policy() -> String {
    DEFAULT_FLASH_POLICY.to_string()
}

/// Logging section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct LoggingSection {
    /// Enable logging.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Filter directive (e.g., "info", "polyws=debug").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format.
    #[serde(default)]
    pub format: LogFormat,

    /// Include file and line in each record.
    #[serde(default)]
    pub include_location: bool,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            level: default_log_level(),
            format: LogFormat::default(),
            include_location: false,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Log output format.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON structured logging (production).
    #[default]
    Json,
    /// Human-readable output (development).
    Pretty,
}

/// Prometheus metrics section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MetricsSection {
    /// Enable the metrics exporter.
    #[serde(default)]
    pub enabled: bool,

    /// Exporter listen address.
    #[serde(default = "default_metrics_addr")]
    pub addr: String,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: default_metrics_addr(),
        }
    }
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_true() -> bool {
    true
}

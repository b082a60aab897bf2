//! Runtime server configuration.
//!
//! # Example
//!
//! ```rust
//! use polyws_server::ServerConfig;
//! use std::time::Duration;
//!
//! let config = ServerConfig::builder()
//!     .bind_addr("127.0.0.1:8080")
//!     .shutdown_timeout(Duration::from_secs(5))
//!     .build();
//!
//! assert_eq!(config.bind_addr(), "127.0.0.1:8080");
//! ```

use std::net::SocketAddr;
use std::time::Duration;

use polyws::ProtocolConfig;
use polyws_config::{PolywsConfig, DEFAULT_FLASH_POLICY};

/// Default bind address.
pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default handshake timeout in seconds.
pub const DEFAULT_HANDSHAKE_TIMEOUT_SECS: u64 = 10;

/// Default maximum number of concurrent connections.
pub const DEFAULT_MAX_CONNECTIONS: usize = 10_000;

/// Default socket read size in bytes.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 8192;

/// Default limit on bytes queued for a peer, 16 MiB.
pub const DEFAULT_MAX_OUTBOUND_BUFFER: usize = 16 * 1024 * 1024;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    bind_addr: String,
    shutdown_timeout: Duration,
    handshake_timeout: Duration,
    max_connections: usize,
    read_buffer_size: usize,
    max_outbound_buffer: usize,
    protocol: ProtocolConfig,
    flash_policy: Option<String>,
    flash_policy_port: Option<u16>,
}

impl ServerConfig {
    /// Creates a new server configuration builder.
    #[must_use]
    pub fn builder() -> ServerConfigBuilder {
        ServerConfigBuilder::default()
    }

    /// Returns the bind address.
    #[must_use]
    pub fn bind_addr(&self) -> &str {
        &self.bind_addr
    }

    /// Parses the bind address.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be parsed.
    pub fn socket_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.bind_addr.parse()
    }

    /// Address of the dedicated policy listener: the bind address's IP with
    /// the configured policy port.
    ///
    /// # Errors
    ///
    /// Returns an error if the bind address cannot be parsed.
    pub fn policy_socket_addr(&self) -> Result<Option<SocketAddr>, std::net::AddrParseError> {
        let Some(port) = self.flash_policy_port else {
            return Ok(None);
        };
        let mut addr = self.socket_addr()?;
        addr.set_port(port);
        Ok(Some(addr))
    }

    /// Returns the graceful shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(&self) -> Duration {
        self.shutdown_timeout
    }

    /// Returns the time allowed for a complete opening handshake.
    #[must_use]
    pub fn handshake_timeout(&self) -> Duration {
        self.handshake_timeout
    }

    /// Returns the maximum number of concurrent connections.
    #[must_use]
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Returns the socket read size.
    #[must_use]
    pub fn read_buffer_size(&self) -> usize {
        self.read_buffer_size
    }

    /// Returns how many bytes may wait in a connection's write queue.
    #[must_use]
    pub fn max_outbound_buffer(&self) -> usize {
        self.max_outbound_buffer
    }

    /// Returns the protocol limits handed to every connection.
    #[must_use]
    pub fn protocol(&self) -> &ProtocolConfig {
        &self.protocol
    }

    /// Returns the policy document, or `None` if policy requests are refused.
    #[must_use]
    pub fn flash_policy(&self) -> Option<&str> {
        self.flash_policy.as_deref()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl From<&PolywsConfig> for ServerConfig {
    fn from(config: &PolywsConfig) -> Self {
        let mut builder = Self::builder()
            .bind_addr(config.server.bind_addr.clone())
            .shutdown_timeout(Duration::from_secs(config.server.shutdown_timeout_secs))
            .handshake_timeout(Duration::from_secs(config.server.handshake_timeout_secs))
            .max_connections(config.server.max_connections)
            .read_buffer_size(config.server.read_buffer_size)
            .max_outbound_buffer(config.server.max_outbound_buffer)
            .protocol(config.protocol.clone())
            .flash_policy_port(config.flash.policy_port);

        builder = if config.flash.enabled {
            builder.flash_policy(config.flash.policy.clone())
        } else {
            builder.disable_flash_policy()
        };

        builder.build()
    }
}

/// Builder for [`ServerConfig`].
#[derive(Debug, Clone)]
pub struct ServerConfigBuilder {
    bind_addr: String,
    shutdown_timeout: Duration,
    handshake_timeout: Duration,
    max_connections: usize,
    read_buffer_size: usize,
    max_outbound_buffer: usize,
    protocol: ProtocolConfig,
    flash_policy: Option<String>,
    flash_policy_port: Option<u16>,
}

impl ServerConfigBuilder {
    /// Creates a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self {
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            shutdown_timeout: Duration::from_secs(DEFAULT_SHUTDOWN_TIMEOUT_SECS),
            handshake_timeout: Duration::from_secs(DEFAULT_HANDSHAKE_TIMEOUT_SECS),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_outbound_buffer: DEFAULT_MAX_OUTBOUND_BUFFER,
            protocol: ProtocolConfig::default(),
            flash_policy: Some(DEFAULT_FLASH_POLICY.to_string()),
            flash_policy_port: None,
        }
    }

    /// Sets the bind address.
    #[must_use]
    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    /// Sets the graceful shutdown timeout.
    #[must_use]
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Sets the handshake timeout.
    #[must_use]
    pub fn handshake_timeout(mut self, timeout: Duration) -> Self {
        self.handshake_timeout = timeout;
        self
    }

    /// Sets the maximum number of concurrent connections.
    #[must_use]
    pub fn max_connections(mut self, max: usize) -> Self {
        self.max_connections = max;
        self
    }

    /// Sets the socket read size.
    #[must_use]
    pub fn read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size;
        self
    }

    /// Sets the write queue limit in bytes.
    #[must_use]
    pub fn max_outbound_buffer(mut self, bytes: usize) -> Self {
        self.max_outbound_buffer = bytes;
        self
    }

    /// Sets the protocol limits.
    #[must_use]
    pub fn protocol(mut self, protocol: ProtocolConfig) -> Self {
        self.protocol = protocol;
        self
    }

    /// Sets the policy document served to Flash clients.
    #[must_use]
    pub fn flash_policy(mut self, policy: impl Into<String>) -> Self {
        self.flash_policy = Some(policy.into());
        self
    }

    /// Closes policy requests without a reply.
    #[must_use]
    pub fn disable_flash_policy(mut self) -> Self {
        self.flash_policy = None;
        self
    }

    /// Sets the dedicated policy listener port.
    #[must_use]
    pub fn flash_policy_port(mut self, port: Option<u16>) -> Self {
        self.flash_policy_port = port;
        self
    }

    /// Builds the configuration.
    #[must_use]
    pub fn build(self) -> ServerConfig {
        ServerConfig {
            bind_addr: self.bind_addr,
            shutdown_timeout: self.shutdown_timeout,
            handshake_timeout: self.handshake_timeout,
            max_connections: self.max_connections,
            read_buffer_size: self.read_buffer_size.max(1),
            max_outbound_buffer: self.max_outbound_buffer.max(1),
            protocol: self.protocol,
            flash_policy: self.flash_policy,
            flash_policy_port: self.flash_policy_port,
        }
    }
}

impl Default for ServerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

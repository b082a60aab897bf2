//! Top-level configuration.

use std::net::SocketAddr;

use polyws::ProtocolConfig;
use serde::{Deserialize, Serialize};

use crate::{ConfigError, FlashSection, LogFormat, LoggingSection, MetricsSection, ServerSection};

/// Complete polyws server configuration.
///
/// Use [`ConfigLoader`](crate::ConfigLoader) to load it from files and
/// environment variables.
///
/// # Example
///
/// ```
/// use polyws_config::PolywsConfig;
///
/// let config = PolywsConfig::default();
/// assert_eq!(config.server.bind_addr, "0.0.0.0:8080");
/// assert!(!config.protocol.strict_continuation);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(deny_unknown_fields)]
pub struct PolywsConfig {
    /// Listener configuration.
    #[serde(default)]
    pub server: ServerSection,

    /// Framing limits and compatibility switches.
    #[serde(default)]
    pub protocol: ProtocolConfig,

    /// Flash policy handling.
    #[serde(default)]
    pub flash: FlashSection,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingSection,

    /// Prometheus metrics configuration.
    #[serde(default)]
    pub metrics: MetricsSection,
}

impl PolywsConfig {
    /// Create a new configuration builder.
    #[must_use]
    pub fn builder() -> PolywsConfigBuilder {
        PolywsConfigBuilder::new()
    }

    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "server.bind_addr",
                format!("invalid socket address: {}", self.server.bind_addr),
            ));
        }

        if self.server.max_connections == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_connections",
                "must be greater than zero",
            ));
        }

        if self.server.handshake_timeout_secs == 0 {
            return Err(ConfigError::invalid_value(
                "server.handshake_timeout_secs",
                "must be greater than zero",
            ));
        }

        if self.server.read_buffer_size == 0 {
            return Err(ConfigError::invalid_value(
                "server.read_buffer_size",
                "must be greater than zero",
            ));
        }

        if self.server.max_outbound_buffer == 0 {
            return Err(ConfigError::invalid_value(
                "server.max_outbound_buffer",
                "must be greater than zero",
            ));
        }

        if self.protocol.max_frame_size == 0 {
            return Err(ConfigError::invalid_value(
                "protocol.max_frame_size",
                "must be greater than zero",
            ));
        }

        if self.protocol.max_message_size < self.protocol.max_frame_size {
            return Err(ConfigError::invalid_value(
                "protocol.max_message_size",
                format!(
                    "must be at least max_frame_size ({})",
                    self.protocol.max_frame_size
                ),
            ));
        }

        if self.protocol.max_fragments == 0 {
            return Err(ConfigError::invalid_value(
                "protocol.max_fragments",
                "must be greater than zero",
            ));
        }

        if self.protocol.max_handshake_size == 0 {
            return Err(ConfigError::invalid_value(
                "protocol.max_handshake_size",
                "must be greater than zero",
            ));
        }

        if self.flash.policy_port == Some(0) {
            return Err(ConfigError::invalid_value(
                "flash.policy_port",
                "must not be zero",
            ));
        }

        if self.logging.level.trim().is_empty() {
            return Err(ConfigError::invalid_value(
                "logging.level",
                "must not be empty",
            ));
        }

        if self.metrics.enabled && self.metrics.addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::invalid_value(
                "metrics.addr",
                format!("invalid socket address: {}", self.metrics.addr),
            ));
        }

        Ok(())
    }

    /// Development preset: pretty debug logging with source locations.
    #[must_use]
    pub fn development() -> Self {
        let mut config = Self::default();

        config.server.bind_addr = "127.0.0.1:8080".to_string();
        config.logging.level = "debug".to_string();
        config.logging.format = LogFormat::Pretty;
        config.logging.include_location = true;

        config
    }

    /// Production preset: JSON logging, metrics exporter enabled.
    #[must_use]
    pub fn production() -> Self {
        let mut config = Self::default();

        config.logging.level = "info".to_string();
        config.logging.format = LogFormat::Json;
        config.metrics.enabled = true;

        config
    }
}

/// Builder for [`PolywsConfig`].
#[derive(Debug, Default)]
pub struct PolywsConfigBuilder {
    server: Option<ServerSection>,
    protocol: Option<ProtocolConfig>,
    flash: Option<FlashSection>,
    logging: Option<LoggingSection>,
    metrics: Option<MetricsSection>,
}

impl PolywsConfigBuilder {
    /// Create a new builder with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the server section.
    #[must_use]
    pub fn server(mut self, server: ServerSection) -> Self {
        self.server = Some(server);
        self
    }

    /// Set the protocol section.
    #[must_use]
    pub fn protocol(mut self, protocol: ProtocolConfig) -> Self {
        self.protocol = Some(protocol);
        self
    }

    /// Set the flash section.
    #[must_use]
    pub fn flash(mut self, flash: FlashSection) -> Self {
        self.flash = Some(flash);
        self
    }

    /// Set the logging section.
    #[must_use]
    pub fn logging(mut self, logging: LoggingSection) -> Self {
        self.logging = Some(logging);
        self
    }

    /// Set the metrics section.
    #[must_use]
    pub fn metrics(mut self, metrics: MetricsSection) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Build the configuration. Unset sections use their defaults.
    #[must_use]
    pub fn build(self) -> PolywsConfig {
        PolywsConfig {
            server: self.server.unwrap_or_default(),
            protocol: self.protocol.unwrap_or_default(),
            flash: self.flash.unwrap_or_default(),
            logging: self.logging.unwrap_or_default(),
            metrics: self.metrics.unwrap_or_default(),
        }
    }

    /// Build and validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if validation fails.
    pub fn build_validated(self) -> Result<PolywsConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }
}

//! Typed configuration for polyws servers.
//!
//! - TOML and JSON configuration files
//! - Environment variable overrides
//! - Strict validation (fails on unknown fields)
//! - Layered configuration (defaults → file → env)
//!
//! # Example
//!
//! ```no_run
//! use polyws_config::ConfigLoader;
//!
//! # fn main() -> Result<(), polyws_config::ConfigError> {
//! let config = ConfigLoader::new()
//!     .with_defaults()
//!     .with_file("polyws.toml")?
//!     .with_env_prefix("POLYWS")
//!     .load()?;
//!
//! println!("listening on {}", config.server.bind_addr);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration File Format
//!
//! ```toml
//! [server]
//! bind_addr = "0.0.0.0:8080"
//! shutdown_timeout_secs = 30
//! max_connections = 10000
//! handshake_timeout_secs = 10
//! read_buffer_size = 8192
//! max_outbound_buffer = 16777216
//!
//! [protocol]
//! max_frame_size = 16777216
//! max_message_size = 67108864
//! max_fragments = 4096
//! max_handshake_size = 16384
//! strict_continuation = false
//!
//! [flash]
//! enabled = true
//! policy_port = 843
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [metrics]
//! enabled = true
//! addr = "0.0.0.0:9090"
//! ```
//!
//! # Environment Variable Overrides
//!
//! Every value can be overridden with `PREFIX__SECTION__KEY`:
//!
//! - `POLYWS__SERVER__BIND_ADDR=0.0.0.0:9000`
//! - `POLYWS__PROTOCOL__STRICT_CONTINUATION=true`
//! - `POLYWS__FLASH__POLICY_PORT=none`

#![warn(missing_docs)]

mod config;
mod error;
mod loader;
mod schema;

pub use config::*;
pub use error::ConfigError;
pub use loader::ConfigLoader;
pub use polyws::ProtocolConfig;
pub use schema::*;

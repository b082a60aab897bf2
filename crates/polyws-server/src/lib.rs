//! # polyws server
//!
//! Tokio TCP server for the `polyws` protocol core.
//!
//! - Accepts Hybi, Hixie and Flash policy clients on one port
//! - Optional dedicated Flash policy listener
//! - Connection registry with limits and per-dialect counts
//! - Graceful shutdown
//! - Pluggable [`MessageHandler`], echoing by default
//!
//! ## Example
//!
//! ```rust,ignore
//! use polyws::Message;
//! use polyws_server::{ConnectionInfo, MessageHandler, Server, ServerConfig};
//!
//! struct Greeter;
//!
//! impl MessageHandler for Greeter {
//!     fn on_message(&self, _conn: &ConnectionInfo, message: Message) -> Option<Message> {
//!         let name = message.to_text().ok()?;
//!         Some(Message::text(format!("hello, {name}")))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), polyws_server::ServerError> {
//!     let config = ServerConfig::builder().bind_addr("0.0.0.0:8080").build();
//!     Server::with_handler(config, Greeter).run().await
//! }
//! ```

#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cli;
pub mod config;
pub mod error;
pub mod handler;
pub mod manager;
pub mod server;
pub mod shutdown;
pub mod transport;

pub use config::{ServerConfig, ServerConfigBuilder};
pub use error::{ServerError, ServerResult};
pub use handler::{EchoHandler, MessageHandler};
pub use manager::{ConnectionInfo, ConnectionManager, ConnectionStats};
pub use server::Server;
pub use shutdown::ShutdownSignal;
pub use transport::{ChannelTransport, Outbound, OutboundQueue};

//! TCP server.
//!
//! # Architecture
//!
//! - A listener on the bind address, plus an optional Flash policy listener
//! - One task per accepted socket that reads the opening handshake, runs
//!   the protocol factory and feeds later reads to the connection
//! - One writer task per socket draining the [`ChannelTransport`] queue
//! - Graceful shutdown bounded by the configured timeout
//!
//! # Example
//!
//! ```rust,ignore
//! use polyws_server::{Server, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::builder()
//!         .bind_addr("0.0.0.0:8080")
//!         .build();
//!
//!     Server::new(config).run().await?;
//!     Ok(())
//! }
//! ```

use std::net::SocketAddr;
use std::sync::Arc;

use bytes::BytesMut;
use polyws::headers::names;
use polyws::{
    handshake_boundary, CloseCode, Connection, ConnectionId, Headers, WebSocketConnection,
    WsError,
};
use polyws_telemetry::metrics::{
    record_connection_rejected, record_message_received, record_protocol_error,
};
use polyws_telemetry::ConnectionGuard;
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn, Instrument};

use crate::config::ServerConfig;
use crate::error::{ServerError, ServerResult};
use crate::handler::{EchoHandler, MessageHandler};
use crate::manager::{ConnectionInfo, ConnectionManager};
use crate::shutdown::{ConnectionTracker, ShutdownSignal};
use crate::transport::{write_loop, ChannelTransport};

/// The polyws server.
pub struct Server {
    config: ServerConfig,
    handler: Arc<dyn MessageHandler>,
    manager: Arc<ConnectionManager>,
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("config", &self.config)
            .field("manager", &self.manager)
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Creates a server that echoes every message.
    #[must_use]
    pub fn new(config: ServerConfig) -> Self {
        Self::with_handler(config, EchoHandler)
    }

    /// Creates a server with an application handler.
    #[must_use]
    pub fn with_handler(config: ServerConfig, handler: impl MessageHandler) -> Self {
        let manager = Arc::new(ConnectionManager::new(config.max_connections()));
        Self {
            config,
            handler: Arc::new(handler),
            manager,
        }
    }

    /// Returns the server configuration.
    #[must_use]
    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Returns the connection registry.
    #[must_use]
    pub fn manager(&self) -> Arc<ConnectionManager> {
        Arc::clone(&self.manager)
    }

    /// Runs until SIGINT or SIGTERM.
    ///
    /// # Errors
    ///
    /// Returns an error if a listener cannot be bound.
    pub async fn run(self) -> ServerResult<()> {
        let shutdown = ShutdownSignal::with_os_signals();
        self.run_with_shutdown(shutdown).await
    }

    /// Binds the configured addresses and runs until `shutdown` triggers.
    ///
    /// # Errors
    ///
    /// Returns an error if an address is invalid or cannot be bound.
    pub async fn run_with_shutdown(self, shutdown: ShutdownSignal) -> ServerResult<()> {
        let addr = self
            .config
            .socket_addr()
            .map_err(|e| ServerError::InvalidAddress {
                addr: self.config.bind_addr().to_string(),
                reason: e.to_string(),
            })?;
        let listener = bind(addr).await?;

        let policy_listener = match self.config.policy_socket_addr() {
            Ok(Some(policy_addr)) => Some(bind(policy_addr).await?),
            Ok(None) => None,
            Err(e) => {
                return Err(ServerError::InvalidAddress {
                    addr: self.config.bind_addr().to_string(),
                    reason: e.to_string(),
                })
            }
        };

        self.serve(listener, policy_listener, shutdown).await
    }

    /// Serves connections from already-bound listeners until `shutdown`
    /// triggers, then waits for open connections to finish.
    ///
    /// # Errors
    ///
    /// Currently always returns `Ok`; accept errors are logged and skipped.
    pub async fn serve(
        self,
        listener: TcpListener,
        policy_listener: Option<TcpListener>,
        shutdown: ShutdownSignal,
    ) -> ServerResult<()> {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "Server listening");
        }
        if let Some(addr) = policy_listener.as_ref().and_then(|l| l.local_addr().ok()) {
            info!(%addr, "Flash policy listener ready");
        }

        let server = Arc::new(self);
        let tracker = ConnectionTracker::new();

        loop {
            let accepted = tokio::select! {
                result = listener.accept() => result,
                result = accept_optional(policy_listener.as_ref()) => result,
                () = shutdown.recv() => {
                    info!("Shutdown signal received, stopping server");
                    break;
                }
            };

            match accepted {
                Ok((stream, peer_addr)) => {
                    let server = Arc::clone(&server);
                    let token = tracker.acquire();
                    let shutdown = shutdown.clone();

                    tokio::spawn(async move {
                        if let Err(e) = server.handle_connection(stream, peer_addr, shutdown).await
                        {
                            debug!(%peer_addr, error = %e, "Connection ended with error");
                        }
                        drop(token);
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to accept connection");
                }
            }
        }

        server.manager.shutdown();

        let shutdown_timeout = server.config.shutdown_timeout();
        info!(
            timeout = ?shutdown_timeout,
            active = tracker.active_connections(),
            "Waiting for connections to close"
        );

        tokio::select! {
            () = tracker.wait_for_shutdown() => {
                info!("All connections closed");
            }
            () = tokio::time::sleep(shutdown_timeout) => {
                warn!(
                    active = tracker.active_connections(),
                    "Shutdown timeout reached"
                );
            }
        }

        info!("Server stopped");
        Ok(())
    }

    async fn handle_connection(
        &self,
        stream: TcpStream,
        peer_addr: SocketAddr,
        shutdown: ShutdownSignal,
    ) -> ServerResult<()> {
        let _ = stream.set_nodelay(true);
        let (mut reader, writer) = stream.into_split();

        let timeout = self.config.handshake_timeout();
        let mut buf = BytesMut::with_capacity(self.config.read_buffer_size());
        let handshake_len = tokio::time::timeout(timeout, self.read_handshake(&mut reader, &mut buf))
            .await
            .map_err(|_| ServerError::HandshakeTimeout(timeout))??;
        let Some(handshake_len) = handshake_len else {
            debug!(%peer_addr, "Peer left before completing the handshake");
            return Ok(());
        };

        let raw = buf.split_to(handshake_len);
        let headers = Headers::parse(&raw);
        let dialect = polyws::classify(&headers, &raw);
        let id = ConnectionId::new();

        let info = ConnectionInfo::new(id, dialect, peer_addr).with_uri(headers.get_str(names::GET));
        if let Err(e) = self.manager.accept(info.clone()) {
            record_connection_rejected();
            return Err(e);
        }
        let _guard = ConnectionGuard::new(dialect.as_str());

        let (transport, queue) = ChannelTransport::channel(
            id,
            self.config.flash_policy(),
            self.config.max_outbound_buffer(),
        );
        let writer_task = tokio::spawn(write_loop(writer, queue));

        let mut connection =
            polyws::accept_with_headers(transport, headers, &raw, self.config.protocol());
        let span = connection_span(&connection, peer_addr);

        let result = self
            .drive(&mut connection, &info, reader, buf, shutdown)
            .instrument(span)
            .await;

        connection.disconnect();
        let overflowed = connection.transport().is_overflowed();
        drop(connection);
        if overflowed {
            // The peer is not reading; waiting for the writer would hang.
            writer_task.abort();
        } else {
            let _ = writer_task.await;
        }

        if let Some(info) = self.manager.remove(&id) {
            debug!(
                connection_id = %id,
                %peer_addr,
                duration = ?info.duration(),
                idle = ?info.idle_duration(),
                "Connection closed"
            );
        }

        result
    }

    async fn read_handshake(
        &self,
        reader: &mut OwnedReadHalf,
        buf: &mut BytesMut,
    ) -> ServerResult<Option<usize>> {
        let limit = self.config.protocol().max_handshake_size;
        loop {
            if let Some(len) = handshake_boundary(buf) {
                return Ok(Some(len));
            }
            if buf.len() >= limit {
                return Err(WsError::HandshakeTooLarge { limit }.into());
            }
            buf.reserve(self.config.read_buffer_size());
            if reader.read_buf(buf).await? == 0 {
                return Ok(None);
            }
        }
    }

    async fn drive(
        &self,
        connection: &mut Connection<ChannelTransport>,
        info: &ConnectionInfo,
        mut reader: OwnedReadHalf,
        mut pending: BytesMut,
        shutdown: ShutdownSignal,
    ) -> ServerResult<()> {
        let is_flash = matches!(connection, Connection::Flash(_));
        if !is_flash {
            self.handler.on_open(info);
        }

        // Frames that arrived in the same read as the handshake.
        if !pending.is_empty() {
            let data = pending.split();
            self.feed(connection, info, &data)?;
        }

        let result = loop {
            if connection.transport().is_overflowed() {
                break Err(ServerError::OutboundOverflow {
                    limit: self.config.max_outbound_buffer(),
                });
            }
            if connection.is_closed() || connection.transport().is_closed() {
                break Ok(());
            }

            pending.reserve(self.config.read_buffer_size());
            tokio::select! {
                read = reader.read_buf(&mut pending) => match read {
                    Ok(0) => {
                        debug!("Peer closed the socket");
                        break Ok(());
                    }
                    Ok(_) => {
                        let data = pending.split();
                        if let Err(e) = self.feed(connection, info, &data) {
                            break Err(e);
                        }
                    }
                    Err(e) => break Err(e.into()),
                },
                () = shutdown.recv() => {
                    if let Connection::Hybi(hybi) = connection {
                        hybi.close(CloseCode::GoingAway, "server shutting down");
                    }
                    break Ok(());
                }
            }
        };

        if !is_flash {
            self.handler.on_close(info);
        }
        result
    }

    fn feed(
        &self,
        connection: &mut Connection<ChannelTransport>,
        info: &ConnectionInfo,
        data: &[u8],
    ) -> ServerResult<()> {
        let dialect = info.dialect.as_str();

        if let Err(e) = connection.read_frame(data) {
            warn!(error = %e, "Protocol error, closing connection");
            record_protocol_error(dialect);
            if let Connection::Hybi(hybi) = connection {
                hybi.close(e.close_code(), "");
            } else {
                connection.disconnect();
            }
            return Err(e.into());
        }

        // Dispatch even if the same read also closed the connection.
        let messages = connection.transport_mut().take_messages();
        if !messages.is_empty() {
            self.manager.touch(&info.id);
        }
        for message in messages {
            record_message_received(dialect);
            if let Some(reply) = self.handler.on_message(info, message) {
                if !connection.send_message(&reply) {
                    debug!("Reply could not be written");
                }
            }
        }
        Ok(())
    }
}

fn connection_span(connection: &Connection<ChannelTransport>, peer_addr: SocketAddr) -> tracing::Span {
    let span = connection.span().clone();
    span.record("peer_addr", tracing::field::display(peer_addr));
    span
}

async fn bind(addr: SocketAddr) -> ServerResult<TcpListener> {
    TcpListener::bind(addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })
}

async fn accept_optional(
    listener: Option<&TcpListener>,
) -> std::io::Result<(TcpStream, SocketAddr)> {
    match listener {
        Some(listener) => listener.accept().await,
        None => std::future::pending().await,
    }
}

//! Connection registry.
//!
//! Tracks every open connection with its dialect and peer address, enforces
//! the connection limit, and refuses new connections once shutdown starts.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use polyws::{ConnectionId, Dialect};
use tracing::{debug, info, warn};

use crate::error::{ServerError, ServerResult};

/// Information about a tracked connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    /// The connection ID.
    pub id: ConnectionId,
    /// The dialect negotiated during the handshake.
    pub dialect: Dialect,
    /// Remote socket address.
    pub peer_addr: SocketAddr,
    /// Requested resource from the request line, if any.
    pub uri: Option<String>,
    /// When the connection was registered.
    pub connected_at: Instant,
    /// Last time a message arrived.
    pub last_activity: Instant,
}

impl ConnectionInfo {
    /// Create connection info stamped with the current time.
    pub fn new(id: ConnectionId, dialect: Dialect, peer_addr: SocketAddr) -> Self {
        let now = Instant::now();
        Self {
            id,
            dialect,
            peer_addr,
            uri: None,
            connected_at: now,
            last_activity: now,
        }
    }

    /// Set the requested resource.
    #[must_use]
    pub fn with_uri(mut self, uri: Option<&str>) -> Self {
        self.uri = uri.map(str::to_string);
        self
    }

    /// Update the last activity time.
    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    /// Time since the connection was registered.
    pub fn duration(&self) -> Duration {
        self.connected_at.elapsed()
    }

    /// Time since the last message.
    pub fn idle_duration(&self) -> Duration {
        self.last_activity.elapsed()
    }
}

/// Snapshot of the registry's counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectionStats {
    /// Currently registered connections.
    pub active_connections: usize,
    /// Open Flash policy connections.
    pub flash_connections: usize,
    /// Open Hixie connections.
    pub hixie_connections: usize,
    /// Open Hybi connections.
    pub hybi_connections: usize,
    /// Connections ever registered.
    pub total_accepted: usize,
    /// Connections refused by the limit or shutdown.
    pub total_rejected: usize,
    /// Connections removed.
    pub total_closed: usize,
}

/// Registry of open connections.
///
/// # Example
///
/// ```
/// use polyws::{ConnectionId, Dialect};
/// use polyws_server::{ConnectionInfo, ConnectionManager};
///
/// let manager = ConnectionManager::new(16);
/// let id = ConnectionId::new();
/// manager.accept(ConnectionInfo::new(id, Dialect::Hybi, "127.0.0.1:5000".parse().unwrap()))?;
///
/// assert_eq!(manager.stats().hybi_connections, 1);
/// manager.remove(&id);
/// # Ok::<(), polyws_server::ServerError>(())
/// ```
#[derive(Debug)]
pub struct ConnectionManager {
    connections: DashMap<ConnectionId, ConnectionInfo>,
    max_connections: usize,
    total_accepted: AtomicUsize,
    total_rejected: AtomicUsize,
    total_closed: AtomicUsize,
    is_shutdown: AtomicBool,
}

impl ConnectionManager {
    /// Create a registry that holds at most `max_connections`.
    pub fn new(max_connections: usize) -> Self {
        Self {
            connections: DashMap::new(),
            max_connections,
            total_accepted: AtomicUsize::new(0),
            total_rejected: AtomicUsize::new(0),
            total_closed: AtomicUsize::new(0),
            is_shutdown: AtomicBool::new(false),
        }
    }

    /// The configured connection limit.
    pub fn max_connections(&self) -> usize {
        self.max_connections
    }

    /// Register a connection.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Rejected` if shutdown has started or the limit
    /// is reached.
    pub fn accept(&self, info: ConnectionInfo) -> ServerResult<()> {
        if self.is_shutdown.load(Ordering::SeqCst) {
            self.total_rejected.fetch_add(1, Ordering::Relaxed);
            return Err(ServerError::rejected("server is shutting down"));
        }

        let current = self.connections.len();
        if current >= self.max_connections {
            self.total_rejected.fetch_add(1, Ordering::Relaxed);
            warn!(
                current = current,
                max = self.max_connections,
                peer_addr = %info.peer_addr,
                "Connection limit reached"
            );
            return Err(ServerError::rejected(format!(
                "maximum connections ({}) reached",
                self.max_connections
            )));
        }

        let id = info.id;
        let dialect = info.dialect;
        self.connections.insert(id, info);
        self.total_accepted.fetch_add(1, Ordering::Relaxed);

        debug!(
            connection_id = %id,
            %dialect,
            total = self.connections.len(),
            "Connection registered"
        );

        Ok(())
    }

    /// Remove a connection.
    pub fn remove(&self, id: &ConnectionId) -> Option<ConnectionInfo> {
        let removed = self.connections.remove(id).map(|(_, info)| info);
        if removed.is_some() {
            self.total_closed.fetch_add(1, Ordering::Relaxed);
            debug!(connection_id = %id, "Connection removed");
        }
        removed
    }

    /// Get information about a connection.
    pub fn get(&self, id: &ConnectionId) -> Option<ConnectionInfo> {
        self.connections.get(id).map(|e| e.value().clone())
    }

    /// Update the last activity time for a connection.
    pub fn touch(&self, id: &ConnectionId) {
        if let Some(mut entry) = self.connections.get_mut(id) {
            entry.touch();
        }
    }

    /// Check if a connection is registered.
    pub fn contains(&self, id: &ConnectionId) -> bool {
        self.connections.contains_key(id)
    }

    /// Number of registered connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Whether no connections are registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// All registered connection IDs.
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.connections.iter().map(|e| *e.key()).collect()
    }

    /// Snapshot the counters.
    pub fn stats(&self) -> ConnectionStats {
        let mut stats = ConnectionStats {
            active_connections: self.connections.len(),
            total_accepted: self.total_accepted.load(Ordering::Relaxed),
            total_rejected: self.total_rejected.load(Ordering::Relaxed),
            total_closed: self.total_closed.load(Ordering::Relaxed),
            ..ConnectionStats::default()
        };

        for entry in &self.connections {
            match entry.value().dialect {
                Dialect::Flash => stats.flash_connections += 1,
                Dialect::Hixie => stats.hixie_connections += 1,
                Dialect::Hybi => stats.hybi_connections += 1,
            }
        }

        stats
    }

    /// Whether shutdown has started.
    pub fn is_shutdown(&self) -> bool {
        self.is_shutdown.load(Ordering::SeqCst)
    }

    /// Stop accepting connections. Returns how many were open, or 0 if
    /// shutdown had already started.
    pub fn shutdown(&self) -> usize {
        if self.is_shutdown.swap(true, Ordering::SeqCst) {
            return 0;
        }

        let count = self.connections.len();
        info!(connections = count, "Connection manager shutting down");
        count
    }
}

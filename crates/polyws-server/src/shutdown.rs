//! Graceful shutdown.
//!
//! [`ShutdownSignal`] tells the accept loop and every connection task to
//! stop; [`ConnectionTracker`] lets the server wait for those tasks to
//! finish before it returns.
//!
//! # Example
//!
//! ```rust,ignore
//! use polyws_server::ShutdownSignal;
//! use std::time::Duration;
//!
//! let shutdown = ShutdownSignal::new();
//! tokio::select! {
//!     _ = shutdown.recv() => println!("Shutdown signal received"),
//!     _ = tokio::time::sleep(Duration::from_secs(60)) => println!("Timeout"),
//! }
//! ```

use std::future::Future;
use std::sync::Arc;

use tokio::sync::watch;

/// A cloneable shutdown trigger. All clones observe the same trigger.
///
/// ```rust
/// use polyws_server::ShutdownSignal;
///
/// let shutdown = ShutdownSignal::new();
/// let other = shutdown.clone();
///
/// shutdown.trigger();
/// assert!(other.is_shutdown());
/// ```
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    state: Arc<watch::Sender<bool>>,
}

impl ShutdownSignal {
    /// Creates a new, untriggered signal.
    #[must_use]
    pub fn new() -> Self {
        let (state, _) = watch::channel(false);
        Self {
            state: Arc::new(state),
        }
    }

    /// Triggers shutdown. Idempotent.
    pub fn trigger(&self) {
        self.state.send_if_modified(|triggered| !std::mem::replace(triggered, true));
    }

    /// Returns `true` if shutdown has been triggered.
    #[must_use]
    pub fn is_shutdown(&self) -> bool {
        *self.state.borrow()
    }

    /// Completes when shutdown is triggered, or immediately if it already
    /// was. The future owns its receiver and can outlive `self`.
    pub fn recv(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.state.subscribe();
        async move {
            // Also resolves once every signal clone is gone.
            let _ = rx.wait_for(|triggered| *triggered).await;
        }
    }

    /// Creates a signal triggered by SIGTERM or SIGINT (Ctrl+C).
    ///
    /// Must be called from within a Tokio runtime.
    #[must_use]
    pub fn with_os_signals() -> Self {
        let signal = Self::new();
        let trigger = signal.clone();

        tokio::spawn(async move {
            wait_for_os_signal().await;
            trigger.trigger();
        });

        signal
    }
}

impl Default for ShutdownSignal {
    fn default() -> Self {
        Self::new()
    }
}

async fn wait_for_os_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                let name = tokio::select! {
                    _ = sigterm.recv() => "SIGTERM",
                    _ = sigint.recv() => "SIGINT",
                };
                tracing::info!(signal = name, "Shutting down");
                return;
            }
            (Err(e), _) | (_, Err(e)) => {
                tracing::error!(error = %e, "Signal handlers unavailable, using Ctrl+C");
            }
        }
    }

    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!(signal = "ctrl-c", "Shutting down"),
        Err(e) => {
            tracing::error!(error = %e, "Cannot listen for Ctrl+C, waiting for an explicit trigger");
            std::future::pending::<()>().await;
        }
    }
}

/// Counts live connection tasks so shutdown can wait for them to drain.
///
/// ```rust
/// use polyws_server::shutdown::ConnectionTracker;
///
/// let tracker = ConnectionTracker::new();
/// let token = tracker.acquire();
/// assert_eq!(tracker.active_connections(), 1);
///
/// drop(token);
/// assert_eq!(tracker.active_connections(), 0);
/// ```
#[derive(Debug, Clone)]
pub struct ConnectionTracker {
    active: Arc<watch::Sender<usize>>,
}

impl ConnectionTracker {
    /// Creates a tracker with no live tasks.
    #[must_use]
    pub fn new() -> Self {
        let (active, _) = watch::channel(0);
        Self {
            active: Arc::new(active),
        }
    }

    /// Acquires a token, held for the lifetime of one connection task.
    #[must_use]
    pub fn acquire(&self) -> ConnectionToken {
        self.active.send_modify(|count| *count += 1);
        ConnectionToken {
            active: Arc::clone(&self.active),
        }
    }

    /// Returns the number of live tokens.
    #[must_use]
    pub fn active_connections(&self) -> usize {
        *self.active.borrow()
    }

    /// Waits until every token has been dropped.
    pub async fn wait_for_shutdown(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|count| *count == 0).await;
    }
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Token for one live connection task. Dropping it releases the slot.
#[derive(Debug)]
pub struct ConnectionToken {
    active: Arc<watch::Sender<usize>>,
}

impl Drop for ConnectionToken {
    fn drop(&mut self) {
        self.active.send_modify(|count| *count = count.saturating_sub(1));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_shutdown_signal_trigger_idempotent() {
        let signal = ShutdownSignal::new();
        assert!(!signal.is_shutdown());
        signal.trigger();
        signal.trigger();
        assert!(signal.is_shutdown());
    }

    #[test]
    fn test_shutdown_signal_clone() {
        let signal1 = ShutdownSignal::default();
        let signal2 = signal1.clone();

        signal1.trigger();

        assert!(signal2.is_shutdown());
    }

    #[tokio::test]
    async fn test_shutdown_recv_completes_when_triggered() {
        let signal = ShutdownSignal::new();
        let signal_clone = signal.clone();

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            signal_clone.trigger();
        });

        tokio::time::timeout(Duration::from_secs(1), signal.recv())
            .await
            .expect("recv should complete");
    }

    #[tokio::test]
    async fn test_recv_outlives_signal() {
        let signal = ShutdownSignal::new();
        let pending = signal.recv();
        let trigger = signal.clone();
        drop(signal);

        tokio::spawn(async move { trigger.trigger() });
        tokio::time::timeout(Duration::from_secs(1), pending)
            .await
            .expect("recv should complete");
    }

    #[tokio::test]
    async fn test_many_receivers_all_complete() {
        let signal = ShutdownSignal::new();
        let waiters: Vec<_> = (0..8).map(|_| tokio::spawn(signal.recv())).collect();

        signal.trigger();
        for waiter in waiters {
            tokio::time::timeout(Duration::from_secs(1), waiter)
                .await
                .expect("receiver should complete")
                .expect("task should not panic");
        }
    }

    #[test]
    fn test_shutdown_recv_completes_immediately_if_triggered() {
        let signal = ShutdownSignal::new();
        signal.trigger();
        tokio_test::block_on(signal.recv());
    }

    #[test]
    fn test_connection_tracker_counts() {
        let tracker = ConnectionTracker::default();
        let token1 = tracker.acquire();
        let token2 = tracker.acquire();
        assert_eq!(tracker.active_connections(), 2);

        drop(token1);
        assert_eq!(tracker.active_connections(), 1);

        drop(token2);
        assert_eq!(tracker.active_connections(), 0);
    }

    #[test]
    fn test_connection_tracker_wait_immediate() {
        let tracker = ConnectionTracker::new();
        tokio_test::block_on(tracker.wait_for_shutdown());
    }

    #[tokio::test]
    async fn test_connection_tracker_wait_delayed() {
        let tracker = ConnectionTracker::new();
        let token = tracker.acquire();

        let tracker_clone = tracker.clone();
        let wait_handle = tokio::spawn(async move {
            tracker_clone.wait_for_shutdown().await;
        });

        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            drop(token);
        });

        tokio::time::timeout(Duration::from_secs(1), wait_handle)
            .await
            .expect("wait should complete")
            .expect("task should not panic");
    }
}

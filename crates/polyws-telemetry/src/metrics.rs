//! Prometheus metrics.
//!
//! # Standard Metrics
//!
//! | Metric | Type | Labels | Description |
//! |--------|------|--------|-------------|
//! | `polyws_connections_total` | Counter | `dialect` | Accepted connections |
//! | `polyws_connections_rejected_total` | Counter | - | Connections refused by limits or shutdown |
//! | `polyws_active_connections` | Gauge | `dialect` | Currently open connections |
//! | `polyws_connection_duration_seconds` | Histogram | `dialect` | Connection lifetime |
//! | `polyws_messages_received_total` | Counter | `dialect` | Complete messages received |
//! | `polyws_protocol_errors_total` | Counter | `dialect` | Connections failed by a protocol error |
//!
//! Recording works whether or not [`init_metrics`] has run; without an
//! installed recorder every call is a no-op.

use crate::error::TelemetryError;
use crate::TelemetryResult;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use std::time::Instant;

/// Global metrics handle for rendering.
static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics configuration.
#[derive(Debug, Clone)]
pub struct MetricsConfig {
    /// Whether metrics are enabled.
    pub enabled: bool,

    /// Address to expose metrics on (e.g., "0.0.0.0:9090").
    pub addr: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            addr: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Installs the Prometheus recorder and starts its HTTP listener.
///
/// Must be called from within a Tokio runtime; the listener runs as a
/// task on it.
///
/// # Errors
///
/// Returns `TelemetryError::InvalidAddress` if `addr` does not parse, and
/// `TelemetryError::MetricsInit` if there is no runtime or a recorder is
/// already installed.
pub fn init_metrics(config: &MetricsConfig) -> TelemetryResult<()> {
    if !config.enabled {
        return Ok(());
    }

    let addr: SocketAddr = config
        .addr
        .parse()
        .map_err(|e| TelemetryError::InvalidAddress(format!("{}: {e}", config.addr)))?;

    let runtime = tokio::runtime::Handle::try_current()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    let _enter = runtime.enter();

    let (recorder, exporter) = PrometheusBuilder::new()
        .with_http_listener(addr)
        .build()
        .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
    let handle = recorder.handle();

    metrics::set_global_recorder(recorder).map_err(|_| {
        TelemetryError::MetricsInit("a metrics recorder is already installed".to_string())
    })?;

    runtime.spawn(async move {
        if let Err(e) = exporter.await {
            tracing::error!(error = ?e, "metrics exporter stopped");
        }
    });

    let _ = METRICS_HANDLE.set(handle);
    register_metric_descriptions();
    tracing::info!(%addr, "metrics exporter listening");

    Ok(())
}

/// Renders metrics in Prometheus format.
///
/// Returns `None` if metrics are not initialized.
#[must_use]
pub fn render_metrics() -> Option<String> {
    METRICS_HANDLE.get().map(PrometheusHandle::render)
}

fn register_metric_descriptions() {
    describe_counter!("polyws_connections_total", "Total accepted connections by dialect");
    describe_counter!(
        "polyws_connections_rejected_total",
        "Connections refused because of limits or shutdown"
    );
    describe_gauge!("polyws_active_connections", "Currently open connections by dialect");
    describe_histogram!(
        "polyws_connection_duration_seconds",
        "Connection lifetime in seconds"
    );
    describe_counter!(
        "polyws_messages_received_total",
        "Complete application messages received"
    );
    describe_counter!(
        "polyws_protocol_errors_total",
        "Connections failed because the peer broke the framing rules"
    );
}

/// Records a rejected connection.
pub fn record_connection_rejected() {
    counter!("polyws_connections_rejected_total").increment(1);
}

/// Records a complete message received on a connection.
pub fn record_message_received(dialect: &'static str) {
    counter!("polyws_messages_received_total", "dialect" => dialect).increment(1);
}

/// Records a connection failed by a protocol error.
pub fn record_protocol_error(dialect: &'static str) {
    counter!("polyws_protocol_errors_total", "dialect" => dialect).increment(1);
}

/// Tracks one open connection.
///
/// Creating the guard counts the connection and raises the active gauge;
/// dropping it lowers the gauge and records how long the connection lived.
#[derive(Debug)]
pub struct ConnectionGuard {
    dialect: &'static str,
    opened_at: Instant,
}

impl ConnectionGuard {
    /// Records an accepted connection.
    #[must_use]
    pub fn new(dialect: &'static str) -> Self {
        counter!("polyws_connections_total", "dialect" => dialect).increment(1);
        gauge!("polyws_active_connections", "dialect" => dialect).increment(1.0);
        Self {
            dialect,
            opened_at: Instant::now(),
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        gauge!("polyws_active_connections", "dialect" => self.dialect).decrement(1.0);
        histogram!("polyws_connection_duration_seconds", "dialect" => self.dialect)
            .record(self.opened_at.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = MetricsConfig::default();
        assert!(!config.enabled);
        assert_eq!(config.addr, "0.0.0.0:9090");
    }

    #[test]
    fn test_disabled_is_noop() {
        assert!(init_metrics(&MetricsConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_address() {
        let config = MetricsConfig {
            enabled: true,
            addr: "not-an-address".to_string(),
        };
        assert!(matches!(
            init_metrics(&config),
            Err(TelemetryError::InvalidAddress(_))
        ));
    }

    #[test]
    fn test_requires_runtime() {
        let config = MetricsConfig {
            enabled: true,
            addr: "127.0.0.1:0".to_string(),
        };
        assert!(matches!(
            init_metrics(&config),
            Err(TelemetryError::MetricsInit(_))
        ));
    }

    #[test]
    fn test_record_functions_dont_panic() {
        record_connection_rejected();
        record_message_received("hybi");
        record_protocol_error("hixie");
        let guard = ConnectionGuard::new("flash");
        drop(guard);
    }
}

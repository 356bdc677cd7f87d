//! Prometheus metrics for the booking engine.
//!
//! - Reservations and releases, labelled by outcome
//! - Lifecycle and reminder scans (duration, records touched)
//! - Notification deliveries, labelled by outcome
//!
//! # Example
//!
//! ```rust,no_run
//! use seatbook_runtime::metrics::MetricsServer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let mut server = MetricsServer::new("0.0.0.0:9090".parse()?);
//! server.start()?;
//! // Metrics available at http://localhost:9090/metrics
//! # Ok(())
//! # }
//! ```

use metrics::{describe_counter, describe_histogram};
use metrics_exporter_prometheus::{Matcher, PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::time::Duration;
use thiserror::Error;

pub use metrics::{counter, histogram};

/// Errors from metrics operations.
#[derive(Error, Debug)]
pub enum MetricsError {
    /// Failed to build metrics exporter
    #[error("Failed to build metrics exporter: {0}")]
    Build(String),
    /// Failed to install metrics recorder
    #[error("Failed to install metrics recorder: {0}")]
    Install(String),
}

/// Prometheus metrics server.
///
/// Installs the global recorder and serves `/metrics` over HTTP for scraping.
pub struct MetricsServer {
    addr: SocketAddr,
    handle: Option<PrometheusHandle>,
}

impl MetricsServer {
    /// Create a new metrics server bound to `addr` once started.
    #[must_use]
    pub const fn new(addr: SocketAddr) -> Self {
        Self { addr, handle: None }
    }

    /// Install the recorder and spawn the HTTP exporter.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `MetricsError::Build` if the exporter cannot be configured or its
    /// listener cannot bind. A recorder that is already installed (e.g. by another test)
    /// is tolerated: the call logs a warning and leaves [`Self::handle`] empty.
    pub fn start(&mut self) -> Result<(), MetricsError> {
        register_metrics();

        let (recorder, exporter) = PrometheusBuilder::new()
            .set_buckets_for_metric(
                Matcher::Suffix("duration_seconds".to_string()),
                &[0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0],
            )
            .map_err(|e| MetricsError::Build(e.to_string()))?
            .with_http_listener(self.addr)
            .build()
            .map_err(|e| MetricsError::Build(e.to_string()))?;

        let handle = recorder.handle();
        if let Err(e) = metrics::set_global_recorder(recorder) {
            tracing::warn!(error = %e, "Metrics recorder already installed, skipping");
            return Ok(());
        }

        tokio::spawn(async move {
            if exporter.await.is_err() {
                tracing::error!("Metrics exporter stopped");
            }
        });

        self.handle = Some(handle);
        tracing::info!(addr = %self.addr, "Metrics server started");
        Ok(())
    }

    /// Get the metrics handle for rendering.
    #[must_use]
    pub const fn handle(&self) -> Option<&PrometheusHandle> {
        self.handle.as_ref()
    }

    /// Render current metrics in Prometheus text format.
    ///
    /// Returns `None` if this server did not install the recorder.
    #[must_use]
    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(PrometheusHandle::render)
    }
}

/// Register all metric descriptions.
fn register_metrics() {
    describe_counter!(
        "seatbook_reservations_total",
        "Reservation attempts, labelled by outcome"
    );
    describe_counter!(
        "seatbook_releases_total",
        "Release attempts, labelled by outcome"
    );
    describe_counter!(
        "seatbook_events_completed_total",
        "Events moved to completed by the lifecycle scan"
    );
    describe_counter!(
        "seatbook_reminders_sent_total",
        "Starting-soon reminders recorded"
    );
    describe_counter!(
        "seatbook_notifications_delivered_total",
        "Notification hand-offs to the sink, labelled by outcome"
    );
    describe_counter!(
        "seatbook_scan_failures_total",
        "Scan runs that failed and were deferred to the next run"
    );
    describe_counter!(
        "seatbook_store_errors_total",
        "Store operations that failed, labelled by operation"
    );
    describe_histogram!(
        "seatbook_scan_duration_seconds",
        "Time taken by one scan run"
    );
}

fn as_count(count: usize) -> u64 {
    u64::try_from(count).unwrap_or(u64::MAX)
}

/// Reservation and release metrics recorder.
pub struct BookingMetrics;

impl BookingMetrics {
    /// Record the outcome of a reservation.
    pub fn record_reservation(outcome: &'static str) {
        counter!("seatbook_reservations_total", "outcome" => outcome).increment(1);
    }

    /// Record the outcome of a release.
    pub fn record_release(outcome: &'static str) {
        counter!("seatbook_releases_total", "outcome" => outcome).increment(1);
    }
}

/// Periodic scan metrics recorder.
pub struct ScanMetrics;

impl ScanMetrics {
    /// Record one finished scan run.
    pub fn record_run(scan: &'static str, duration: Duration) {
        histogram!("seatbook_scan_duration_seconds", "scan" => scan)
            .record(duration.as_secs_f64());
    }

    /// Record a failed scan run.
    pub fn record_failure(scan: &'static str) {
        counter!("seatbook_scan_failures_total", "scan" => scan).increment(1);
    }

    /// Record events completed by the lifecycle scan.
    pub fn record_completed(count: usize) {
        counter!("seatbook_events_completed_total").increment(as_count(count));
    }

    /// Record reminders recorded by the reminder scan.
    pub fn record_reminders(count: usize) {
        counter!("seatbook_reminders_sent_total").increment(as_count(count));
    }
}

/// Notification delivery metrics recorder.
pub struct NotificationMetrics;

impl NotificationMetrics {
    /// Record the outcome of one delivery.
    pub fn record_delivery(outcome: &'static str) {
        counter!("seatbook_notifications_delivered_total", "outcome" => outcome).increment(1);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_metrics_server_creation() {
        let server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        assert!(server.handle().is_none());
        assert!(server.render().is_none());
    }

    #[tokio::test]
    async fn test_metrics_server_records_engine_metrics() {
        let mut server = MetricsServer::new("127.0.0.1:0".parse().unwrap());
        server.start().unwrap();

        BookingMetrics::record_reservation("created");
        ScanMetrics::record_run("lifecycle", Duration::from_millis(12));
        ScanMetrics::record_completed(3);

        // The handle is absent if another test installed the recorder first.
        if let Some(rendered) = server.render() {
            assert!(rendered.contains("seatbook_reservations_total"));
            assert!(rendered.contains("seatbook_events_completed_total"));
        }
    }
}

//! Periodic execution of scans.
//!
//! Each scan runs on its own task and its own interval. A run that outlasts its period
//! delays the next tick instead of overlapping with it ([`MissedTickBehavior::Skip`]), so
//! a scan never overlaps with itself within one process. Overlap across processes is
//! harmless because every scan is idempotent.
//!
//! A failed run is logged and counted; the next tick simply tries again.

use crate::metrics::ScanMetrics;
use seatbook_core::error::StoreError;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// One idempotent pass over the store.
pub trait Scan: Send + Sync {
    /// Name used in logs and metric labels.
    fn name(&self) -> &'static str;

    /// Run one pass and return the number of records it changed.
    ///
    /// # Errors
    ///
    /// Returns the store error that stopped the pass. Work already committed stays
    /// committed; the rest is picked up by the next pass.
    fn run_once(&self) -> Pin<Box<dyn Future<Output = Result<usize, StoreError>> + Send + '_>>;
}

/// Shutdown signal shared by periodic tasks.
///
/// Send `true` to stop every task spawned with a receiver of this channel.
#[must_use]
pub fn shutdown_channel() -> (watch::Sender<bool>, watch::Receiver<bool>) {
    watch::channel(false)
}

/// Run `scan` every `period` until `shutdown` turns `true`.
///
/// The first run happens immediately. An in-flight run is finished before the task
/// exits.
#[must_use]
pub fn spawn_periodic(
    scan: Arc<dyn Scan>,
    period: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let name = scan.name();
        tracing::info!(scan = name, period_secs = period.as_secs_f64(), "Starting periodic scan");

        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => run_and_record(scan.as_ref()).await,
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        // Sender dropped
                        break;
                    }
                }
            }
        }

        tracing::info!(scan = name, "Periodic scan stopped");
    })
}

async fn run_and_record(scan: &dyn Scan) {
    let name = scan.name();
    let started = Instant::now();
    let result = scan.run_once().await;
    ScanMetrics::record_run(name, started.elapsed());

    match result {
        Ok(0) => tracing::debug!(scan = name, "Scan found nothing to do"),
        Ok(count) => tracing::info!(scan = name, count, "Scan finished"),
        Err(e) => {
            ScanMetrics::record_failure(name);
            tracing::warn!(scan = name, error = %e, "Scan failed, deferring to next run");
        }
    }
}

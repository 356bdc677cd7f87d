//! Lifecycle scan: `Pending` events that started long enough ago become `Completed`.
//!
//! The decision is the pure function [`plan_completions`]; [`LifecycleScheduler`] only
//! loads the snapshot and applies the plan. The store only moves events that are still
//! `Pending`, so a repeated, overlapping or half-failed run never double-applies and
//! never overrides a cancellation that raced with the scan.

use crate::metrics::ScanMetrics;
use crate::periodic::Scan;
use crate::retry::{RetryPolicy, retry_with_predicate};
use chrono::{DateTime, Duration, Utc};
use seatbook_core::environment::Clock;
use seatbook_core::error::StoreError;
use seatbook_core::event_store::EventStore;
use seatbook_core::types::{Event, EventId, EventStatus};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Events of `snapshot` due for completion at `now`.
///
/// An event is due when it is `Pending` and `start_time < now - grace`.
#[must_use]
pub fn plan_completions(now: DateTime<Utc>, snapshot: &[Event], grace: Duration) -> Vec<EventId> {
    let Some(cutoff) = now.checked_sub_signed(grace) else {
        return Vec::new();
    };
    snapshot
        .iter()
        .filter(|event| event.status == EventStatus::Pending && event.start_time < cutoff)
        .map(|event| event.id)
        .collect()
}

/// Periodically completes events whose grace period has elapsed.
pub struct LifecycleScheduler {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    grace: Duration,
    retry: RetryPolicy,
}

impl LifecycleScheduler {
    /// Create a scheduler completing events `grace` after their start.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        clock: Arc<dyn Clock>,
        grace: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            clock,
            grace,
            retry,
        }
    }

    /// Run one scan and return the events it completed.
    ///
    /// # Errors
    ///
    /// Returns the store error if the snapshot could not be read or the batch could not
    /// be written; nothing is half-applied in that case.
    #[tracing::instrument(skip(self), name = "lifecycle_scan")]
    pub async fn complete_due(&self) -> Result<Vec<EventId>, StoreError> {
        let now = self.clock.now();
        let pending = retry_with_predicate(
            &self.retry,
            || self.store.list_pending(),
            StoreError::is_transient,
        )
        .await?;

        let due = plan_completions(now, &pending, self.grace);
        if due.is_empty() {
            return Ok(due);
        }

        let completed = retry_with_predicate(
            &self.retry,
            || self.store.bulk_set_status(due.clone(), EventStatus::Completed),
            StoreError::is_transient,
        )
        .await?;

        ScanMetrics::record_completed(completed.len());
        tracing::info!(
            planned = due.len(),
            completed = completed.len(),
            "Completed events past their grace period"
        );
        Ok(completed)
    }
}

impl Scan for LifecycleScheduler {
    fn name(&self) -> &'static str {
        "lifecycle"
    }

    fn run_once(&self) -> Pin<Box<dyn Future<Output = Result<usize, StoreError>> + Send + '_>> {
        Box::pin(async move { self.complete_due().await.map(|completed| completed.len()) })
    }
}

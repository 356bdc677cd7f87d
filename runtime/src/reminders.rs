//! Reminder scan: one "starting soon" notification per booking.
//!
//! The time window only selects candidate events: every `Pending` event starting in
//! `[now, now + lead)`. Exactly-once comes from the booking's reminder marker, which
//! [`EventStore::record_reminder`] claims together with the notification record. A
//! booking whose marker is already set is skipped no matter how often the scan runs or
//! how its runs line up with the event's start.

use crate::metrics::ScanMetrics;
use crate::outbox::NotificationOutbox;
use crate::periodic::Scan;
use crate::retry::{RetryPolicy, retry_with_predicate};
use chrono::{DateTime, Duration, Utc};
use seatbook_core::environment::Clock;
use seatbook_core::error::StoreError;
use seatbook_core::event_store::EventStore;
use seatbook_core::types::{Booking, Event, EventStatus, Notification, NotificationKind};
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// Candidate window `[from, to)` for events starting soon.
///
/// Returns `None` if `now + lead` is not representable.
#[must_use]
pub fn reminder_window(now: DateTime<Utc>, lead: Duration) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    now.checked_add_signed(lead).map(|to| (now, to))
}

/// Reminders owed for `event` at `now`: one per booking without a marker.
#[must_use]
pub fn plan_reminders(now: DateTime<Utc>, event: &Event, bookings: &[Booking]) -> Vec<Notification> {
    if event.status != EventStatus::Pending {
        return Vec::new();
    }
    bookings
        .iter()
        .filter(|booking| booking.event_id == event.id && booking.reminder_sent_at.is_none())
        .map(|booking| Notification::new(NotificationKind::StartingSoon, booking.user_id, event, now))
        .collect()
}

/// Periodically records and delivers "starting soon" reminders.
pub struct ReminderDispatcher {
    store: Arc<dyn EventStore>,
    outbox: NotificationOutbox,
    clock: Arc<dyn Clock>,
    lead: Duration,
    retry: RetryPolicy,
}

impl ReminderDispatcher {
    /// Create a dispatcher reminding attendees `lead` before the start.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        outbox: NotificationOutbox,
        clock: Arc<dyn Clock>,
        lead: Duration,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            outbox,
            clock,
            lead,
            retry,
        }
    }

    /// Run one scan and return the number of reminders recorded.
    ///
    /// A failure on one event is logged and skipped; its bookings are retried by the next
    /// run.
    ///
    /// # Errors
    ///
    /// Returns the store error if the candidate events could not be listed.
    #[tracing::instrument(skip(self), name = "reminder_scan")]
    pub async fn send_due(&self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let Some((from, to)) = reminder_window(now, self.lead) else {
            return Ok(0);
        };

        let candidates = retry_with_predicate(
            &self.retry,
            || {
                self.store
                    .list_by_status_and_time_range(EventStatus::Pending, from, to)
            },
            StoreError::is_transient,
        )
        .await?;

        let mut sent = 0;
        for event in &candidates {
            match self.remind_attendees(now, event).await {
                Ok(count) => sent += count,
                Err(e) => tracing::warn!(
                    event_id = %event.id,
                    error = %e,
                    "Failed to send reminders for event, deferring to next run"
                ),
            }
        }

        if sent > 0 {
            ScanMetrics::record_reminders(sent);
            tracing::info!(events = candidates.len(), sent, "Recorded starting-soon reminders");
        }
        Ok(sent)
    }

    async fn remind_attendees(&self, now: DateTime<Utc>, event: &Event) -> Result<usize, StoreError> {
        let bookings = retry_with_predicate(
            &self.retry,
            || self.store.list_bookings(event.id),
            StoreError::is_transient,
        )
        .await?;

        let mut sent = 0;
        for reminder in plan_reminders(now, event, &bookings) {
            let claimed = retry_with_predicate(
                &self.retry,
                || self.store.record_reminder(reminder.clone()),
                StoreError::is_transient,
            )
            .await?;

            if claimed {
                self.outbox.deliver(reminder);
                sent += 1;
            }
        }
        Ok(sent)
    }
}

impl Scan for ReminderDispatcher {
    fn name(&self) -> &'static str {
        "reminders"
    }

    fn run_once(&self) -> Pin<Box<dyn Future<Output = Result<usize, StoreError>> + Send + '_>> {
        Box::pin(self.send_due())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use seatbook_core::types::{EventId, UserId};
    use seatbook_testing::fixtures::{event_with_status, reference_time};

    #[test]
    fn test_window_is_half_open_lead() {
        let now = reference_time();
        let (from, to) = reminder_window(now, Duration::hours(1)).unwrap();
        assert_eq!(from, now);
        assert_eq!(to, now + Duration::hours(1));
        assert!(reminder_window(DateTime::<Utc>::MAX_UTC, Duration::hours(1)).is_none());
    }

    #[test]
    fn test_plan_skips_marked_bookings() {
        let now = reference_time();
        let event = event_with_status(now + Duration::minutes(30), EventStatus::Pending);
        let fresh = Booking::new(event.id, UserId::new(), now - Duration::days(1));
        let mut reminded = Booking::new(event.id, UserId::new(), now - Duration::days(1));
        reminded.reminder_sent_at = Some(now - Duration::minutes(5));
        let foreign = Booking::new(EventId::new(), UserId::new(), now);

        let plan = plan_reminders(now, &event, &[fresh.clone(), reminded, foreign]);
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].user_id, fresh.user_id);
        assert_eq!(plan[0].kind, NotificationKind::StartingSoon);
    }

    #[test]
    fn test_plan_ignores_cancelled_events() {
        let now = reference_time();
        let event = event_with_status(now + Duration::minutes(30), EventStatus::Cancelled);
        let booking = Booking::new(event.id, UserId::new(), now);
        assert!(plan_reminders(now, &event, &[booking]).is_empty());
    }
}

//! Booking ledger: the only way bookings are created or destroyed.
//!
//! # Reservation protocol
//!
//! 1. Take the event's lock ([`EventLocks`]), so reservations of one event are totally
//!    ordered within this process.
//! 2. Read the event, the caller's booking and the booking count, and reject early.
//! 3. Commit with [`EventStore::create_booking`], which revalidates every precondition
//!    atomically and records the "booking created" notification in the same unit. This
//!    covers writers in other processes.
//! 4. Release the lock, then hand the notification to the outbox without awaiting it.
//!
//! Transient store failures are retried with backoff at every step; rejections are not.
//! A retried write can be rejected only because an earlier attempt committed and its
//! acknowledgement was lost. The ledger then looks for the write's notification in the
//! store and, if it is there, reports success.

use crate::error::BookingError;
use crate::locks::EventLocks;
use crate::metrics::BookingMetrics;
use crate::outbox::NotificationOutbox;
use crate::retry::{RetryPolicy, retry_with_predicate};
use seatbook_core::environment::Clock;
use seatbook_core::error::StoreError;
use seatbook_core::event_store::{EventStore, StoreFuture};
use seatbook_core::types::{Booking, EventId, Notification, NotificationKind, UserId};
use std::sync::Arc;

/// Enforces capacity and per-user uniqueness of bookings.
pub struct BookingLedger {
    store: Arc<dyn EventStore>,
    outbox: NotificationOutbox,
    clock: Arc<dyn Clock>,
    locks: Arc<EventLocks>,
    retry: RetryPolicy,
}

impl BookingLedger {
    /// Create a ledger writing to `store`.
    ///
    /// `locks` must be shared with every other component that acts on booking counts
    /// (see [`EventService`](crate::service::EventService)).
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        outbox: NotificationOutbox,
        clock: Arc<dyn Clock>,
        locks: Arc<EventLocks>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            outbox,
            clock,
            locks,
            retry,
        }
    }

    /// Reserve one seat of `event_id` for `user_id`.
    ///
    /// # Errors
    ///
    /// - `EventNotBookable`: the event does not exist or is not `Pending`
    /// - `DuplicateBooking`: the user already holds a booking for the event
    /// - `CapacityExceeded`: every seat is taken
    /// - `StoreUnavailable`: the store stayed unreachable through every retry
    #[tracing::instrument(skip(self), fields(event_id = %event_id, user_id = %user_id))]
    pub async fn reserve(&self, event_id: EventId, user_id: UserId) -> Result<Booking, BookingError> {
        let result = self.reserve_locked(event_id, user_id).await;
        match &result {
            Ok(_) => {
                BookingMetrics::record_reservation("created");
                tracing::info!("Seat reserved");
            }
            Err(e) => {
                BookingMetrics::record_reservation(e.kind());
                tracing::warn!(error = %e, "Reservation rejected");
            }
        }
        result
    }

    async fn reserve_locked(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> Result<Booking, BookingError> {
        let (booking, notification) = {
            let _guard = self.locks.lock(event_id).await;

            let event = self
                .with_retry(|| self.store.get(event_id))
                .await?
                .filter(|event| event.is_bookable())
                .ok_or(BookingError::EventNotBookable(event_id))?;

            if self
                .with_retry(|| self.store.find_booking(event_id, user_id))
                .await?
                .is_some()
            {
                return Err(BookingError::DuplicateBooking { event_id, user_id });
            }

            let booked = self.with_retry(|| self.store.count_bookings(event_id)).await?;
            if !event.capacity.has_room_for(booked) {
                return Err(BookingError::CapacityExceeded {
                    event_id,
                    capacity: event.capacity.get(),
                });
            }

            let now = self.clock.now();
            let booking = Booking::new(event_id, user_id, now);
            let notification =
                Notification::new(NotificationKind::BookingCreated, user_id, &event, now);
            self.commit(&notification, || {
                self.store
                    .create_booking(booking.clone(), notification.clone())
            })
            .await
            .map_err(|e| match e {
                StoreError::EventNotFound(id) => BookingError::EventNotBookable(id),
                other => other.into(),
            })?;
            (booking, notification)
        };

        self.outbox.deliver(notification);
        Ok(booking)
    }

    /// Cancel the booking of `user_id` on `event_id`.
    ///
    /// # Errors
    ///
    /// - `BookingNotFound`: the user holds no booking for the event
    /// - `StoreUnavailable`: the store stayed unreachable through every retry
    #[tracing::instrument(skip(self), fields(event_id = %event_id, user_id = %user_id))]
    pub async fn release(&self, event_id: EventId, user_id: UserId) -> Result<(), BookingError> {
        let result = self.release_locked(event_id, user_id).await;
        match &result {
            Ok(()) => {
                BookingMetrics::record_release("released");
                tracing::info!("Booking released");
            }
            Err(e) => {
                BookingMetrics::record_release(e.kind());
                tracing::warn!(error = %e, "Release rejected");
            }
        }
        result
    }

    async fn release_locked(&self, event_id: EventId, user_id: UserId) -> Result<(), BookingError> {
        let notification = {
            let _guard = self.locks.lock(event_id).await;

            let event = self
                .with_retry(|| self.store.get(event_id))
                .await?
                .ok_or(BookingError::BookingNotFound { event_id, user_id })?;

            let notification = Notification::new(
                NotificationKind::BookingCancelled,
                user_id,
                &event,
                self.clock.now(),
            );
            self.commit(&notification, || {
                self.store
                    .delete_booking(event_id, user_id, notification.clone())
            })
            .await?;
            notification
        };

        self.outbox.deliver(notification);
        Ok(())
    }

    /// Run a booking write that records `notification`, retrying transient failures.
    ///
    /// A rejection on a retry is checked against the store: if `notification` is
    /// recorded, an earlier attempt committed.
    async fn commit<'a, F>(&'a self, notification: &Notification, mut write: F) -> Result<(), StoreError>
    where
        F: FnMut() -> StoreFuture<'a, ()>,
    {
        let mut attempts = 0_usize;
        let result = self
            .with_retry(|| {
                attempts += 1;
                write()
            })
            .await;

        match result {
            Err(e) if attempts > 1 && !e.is_transient() => {
                let recorded = self
                    .with_retry(|| self.store.list_notifications(notification.event_id))
                    .await?
                    .iter()
                    .any(|n| n.id == notification.id);
                if recorded {
                    tracing::info!(
                        notification_id = %notification.id,
                        rejection = %e,
                        "Retried write had already committed"
                    );
                    Ok(())
                } else {
                    Err(e)
                }
            }
            other => other,
        }
    }

    async fn with_retry<'a, T, F>(&'a self, operation: F) -> Result<T, StoreError>
    where
        F: FnMut() -> StoreFuture<'a, T>,
    {
        retry_with_predicate(&self.retry, operation, StoreError::is_transient).await
    }
}

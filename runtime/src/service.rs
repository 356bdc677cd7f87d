//! Caller-facing operations of the booking engine.
//!
//! [`EventService`] is what an HTTP layer (out of scope here) would call. Callers are
//! identified by an already authenticated [`UserId`].

use crate::config::EngineConfig;
use crate::error::BookingError;
use crate::ledger::BookingLedger;
use crate::lifecycle::LifecycleScheduler;
use crate::locks::EventLocks;
use crate::outbox::NotificationOutbox;
use crate::reminders::ReminderDispatcher;
use crate::retry::retry_with_predicate;
use seatbook_core::environment::Clock;
use seatbook_core::error::StoreError;
use seatbook_core::event_store::{EventStore, StoreFuture};
use seatbook_core::ordering::sort_events;
use seatbook_core::types::{
    Booking, Event, EventAttributes, EventDetails, EventFilter, EventId, EventPatch, EventStatus,
    UserId,
};
use std::sync::Arc;

/// Entry point for every caller-facing operation.
pub struct EventService {
    store: Arc<dyn EventStore>,
    clock: Arc<dyn Clock>,
    locks: Arc<EventLocks>,
    outbox: NotificationOutbox,
    ledger: BookingLedger,
    config: EngineConfig,
}

impl EventService {
    /// Wire a service over `store`, delivering notifications through `outbox`.
    #[must_use]
    pub fn new(
        store: Arc<dyn EventStore>,
        outbox: NotificationOutbox,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let locks = Arc::new(EventLocks::new());
        let ledger = BookingLedger::new(
            Arc::clone(&store),
            outbox.clone(),
            Arc::clone(&clock),
            Arc::clone(&locks),
            config.store_retry.clone(),
        );
        Self {
            store,
            clock,
            locks,
            outbox,
            ledger,
            config,
        }
    }

    /// The booking ledger used by [`Self::reserve`] and [`Self::release`].
    #[must_use]
    pub const fn ledger(&self) -> &BookingLedger {
        &self.ledger
    }

    /// Lifecycle scheduler sharing this service's store, clock and configuration.
    #[must_use]
    pub fn lifecycle_scheduler(&self) -> LifecycleScheduler {
        LifecycleScheduler::new(
            Arc::clone(&self.store),
            Arc::clone(&self.clock),
            self.config.completion_grace,
            self.config.store_retry.clone(),
        )
    }

    /// Reminder dispatcher sharing this service's store, outbox, clock and configuration.
    #[must_use]
    pub fn reminder_dispatcher(&self) -> ReminderDispatcher {
        ReminderDispatcher::new(
            Arc::clone(&self.store),
            self.outbox.clone(),
            Arc::clone(&self.clock),
            self.config.reminder_lead,
            self.config.store_retry.clone(),
        )
    }

    /// Create a `Pending` event organized by `organizer_id`.
    ///
    /// # Errors
    ///
    /// - `InvalidEvent`: an attribute violates a field constraint
    /// - `StoreUnavailable`
    #[tracing::instrument(skip(self, attributes), fields(organizer_id = %organizer_id))]
    pub async fn create_event(
        &self,
        organizer_id: UserId,
        attributes: EventAttributes,
    ) -> Result<Event, BookingError> {
        attributes.validate()?;

        let event = Event::new(EventId::new(), organizer_id, attributes, self.clock.now());
        self.with_retry(|| self.store.insert_event(event.clone()))
            .await?;

        tracing::info!(event_id = %event.id, capacity = %event.capacity, "Event created");
        Ok(event)
    }

    /// Apply `patch` to an event on behalf of its organizer.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`
    /// - `NotAuthorized`: the caller is not the organizer
    /// - `EventNotBookable`: the event is no longer `Pending`
    /// - `InvalidEvent`: a field constraint is violated, or the capacity would drop below
    ///   the seats already booked
    /// - `StoreUnavailable`
    #[tracing::instrument(skip(self, patch), fields(event_id = %event_id, caller_id = %caller_id))]
    pub async fn update_event(
        &self,
        event_id: EventId,
        caller_id: UserId,
        patch: EventPatch,
    ) -> Result<Event, BookingError> {
        let _guard = self.locks.lock(event_id).await;

        let mut event = self.load_organized(event_id, caller_id).await?;
        if !event.is_bookable() {
            return Err(BookingError::EventNotBookable(event_id));
        }
        if patch.is_empty() {
            return Ok(event);
        }
        event.apply(patch)?;

        let updated = self
            .with_retry(|| self.store.update_event(event.clone()))
            .await?;
        tracing::info!("Event updated");
        Ok(updated)
    }

    /// Delete an event, its bookings and its notifications.
    ///
    /// Allowed for the organizer during the deletion window after creation (the window's
    /// last instant included).
    ///
    /// # Errors
    ///
    /// - `EventNotFound`
    /// - `NotAuthorized`: the caller is not the organizer
    /// - `DeletionWindowExpired`
    /// - `StoreUnavailable`
    #[tracing::instrument(skip(self), fields(event_id = %event_id, caller_id = %caller_id))]
    pub async fn delete_event(&self, event_id: EventId, caller_id: UserId) -> Result<(), BookingError> {
        let _guard = self.locks.lock(event_id).await;

        let event = self.load_organized(event_id, caller_id).await?;
        if self.clock.now() - event.created_at > self.config.deletion_window {
            tracing::warn!("Deletion window expired");
            return Err(BookingError::DeletionWindowExpired(event_id));
        }

        self.with_retry(|| self.store.delete_event(event_id)).await?;
        tracing::info!("Event deleted");
        Ok(())
    }

    /// Cancel a `Pending` event on behalf of its organizer.
    ///
    /// Existing bookings are kept; the event stops accepting new ones.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`
    /// - `NotAuthorized`: the caller is not the organizer
    /// - `InvalidTransition`: the event is already `Completed` or `Cancelled`
    /// - `StoreUnavailable`
    #[tracing::instrument(skip(self), fields(event_id = %event_id, caller_id = %caller_id))]
    pub async fn cancel_event(&self, event_id: EventId, caller_id: UserId) -> Result<Event, BookingError> {
        let _guard = self.locks.lock(event_id).await;

        let mut event = self.load_organized(event_id, caller_id).await?;
        if event.status.is_terminal() {
            return Err(BookingError::InvalidTransition {
                event_id,
                status: event.status,
            });
        }

        let changed = self
            .with_retry(|| {
                self.store
                    .bulk_set_status(vec![event_id], EventStatus::Cancelled)
            })
            .await?;

        if changed.is_empty() {
            // Another process moved it first.
            let current = self
                .with_retry(|| self.store.get(event_id))
                .await?
                .ok_or(BookingError::EventNotFound(event_id))?;
            return Err(BookingError::InvalidTransition {
                event_id,
                status: current.status,
            });
        }

        event.status = EventStatus::Cancelled;
        tracing::info!("Event cancelled");
        Ok(event)
    }

    /// Load an event with its booking count.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`
    /// - `StoreUnavailable`
    pub async fn get_event(&self, event_id: EventId) -> Result<EventDetails, BookingError> {
        self.with_retry(|| self.store.get_details(event_id))
            .await?
            .ok_or(BookingError::EventNotFound(event_id))
    }

    /// Events matching `filter`: `Pending` ones soonest first, then the rest most recent
    /// first.
    ///
    /// # Errors
    ///
    /// - `StoreUnavailable`
    pub async fn list_events(&self, filter: EventFilter) -> Result<Vec<EventDetails>, BookingError> {
        let mut events = self
            .with_retry(|| self.store.list_events(filter.clone()))
            .await?;
        events.sort_by_cached_key(|details| details.event.sort_key());
        Ok(events)
    }

    /// Reserve a seat. See [`BookingLedger::reserve`].
    ///
    /// # Errors
    ///
    /// - `EventNotBookable`, `DuplicateBooking`, `CapacityExceeded`, `StoreUnavailable`
    pub async fn reserve(&self, event_id: EventId, user_id: UserId) -> Result<Booking, BookingError> {
        self.ledger.reserve(event_id, user_id).await
    }

    /// Release a seat. See [`BookingLedger::release`].
    ///
    /// # Errors
    ///
    /// - `BookingNotFound`, `StoreUnavailable`
    pub async fn release(&self, event_id: EventId, user_id: UserId) -> Result<(), BookingError> {
        self.ledger.release(event_id, user_id).await
    }

    /// `Pending` events booked by `user_id` that have not started yet, soonest first.
    ///
    /// # Errors
    ///
    /// - `StoreUnavailable`
    pub async fn list_my_upcoming(&self, user_id: UserId) -> Result<Vec<Event>, BookingError> {
        let now = self.clock.now();
        let mut events = self
            .with_retry(|| self.store.list_booked_by(user_id, now))
            .await?;
        sort_events(&mut events);
        Ok(events)
    }

    async fn load_organized(&self, event_id: EventId, caller_id: UserId) -> Result<Event, BookingError> {
        let event = self
            .with_retry(|| self.store.get(event_id))
            .await?
            .ok_or(BookingError::EventNotFound(event_id))?;
        if !event.is_organized_by(caller_id) {
            tracing::warn!("Caller is not the organizer");
            return Err(BookingError::NotAuthorized {
                event_id,
                user_id: caller_id,
            });
        }
        Ok(event)
    }

    async fn with_retry<'a, T, F>(&'a self, operation: F) -> Result<T, StoreError>
    where
        F: FnMut() -> StoreFuture<'a, T>,
    {
        retry_with_predicate(&self.config.store_retry, operation, StoreError::is_transient).await
    }
}

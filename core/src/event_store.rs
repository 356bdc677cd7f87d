//! Event store trait: durable repository of events, bookings and notifications.
//!
//! # Atomicity
//!
//! Every method is a single atomic unit against the store. The compound writes used by
//! the booking ledger revalidate their preconditions at commit time:
//!
//! - [`EventStore::create_booking`] checks existence, status, uniqueness and capacity
//!   and inserts the booking indivisibly with respect to other writers of the same event.
//!   The "booking created" notification is appended in the same unit.
//! - [`EventStore::delete_booking`] removes the booking and appends its "booking
//!   cancelled" notification together.
//! - [`EventStore::update_event`] rejects a capacity below the current booking count.
//! - [`EventStore::bulk_set_status`] only moves events that are still `Pending`, so a
//!   repeated or overlapping scan never double-applies and never overrides a
//!   cancellation.
//! - [`EventStore::record_reminder`] claims the booking's reminder marker and appends the
//!   notification together, or does neither. The claim fails once the event has left
//!   `Pending`.
//!
//! Every notification the engine produces is therefore durable before anyone hears of
//! it; delivery afterwards may be retried from the store.
//!
//! # Implementations
//!
//! - `PostgresEventStore` (in `seatbook-postgres`): production implementation
//! - `InMemoryEventStore` (in `seatbook-testing`): fast, deterministic testing
//!
//! # Dyn Compatibility
//!
//! Methods return `Pin<Box<dyn Future>>` instead of using `async fn` so the store can be
//! shared as `Arc<dyn EventStore>`.

use crate::error::StoreError;
use crate::types::{
    Booking, Event, EventDetails, EventFilter, EventId, EventStatus, Notification, UserId,
};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::pin::Pin;

/// Boxed future returned by every store operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Durable repository of Event, Booking and Notification records.
pub trait EventStore: Send + Sync {
    /// Persist a new event.
    ///
    /// # Errors
    ///
    /// - `EventAlreadyExists`: an event with the same id is stored
    /// - `Unavailable`: the store could not be reached
    fn insert_event(&self, event: Event) -> StoreFuture<'_, ()>;

    /// Load one event.
    ///
    /// Returns `Ok(None)` if no such event exists.
    ///
    /// # Errors
    ///
    /// - `Unavailable`, `Corrupt`
    fn get(&self, id: EventId) -> StoreFuture<'_, Option<Event>>;

    /// Load one event with its current booking count.
    ///
    /// # Errors
    ///
    /// - `Unavailable`, `Corrupt`
    fn get_details(&self, id: EventId) -> StoreFuture<'_, Option<EventDetails>>;

    /// Replace the attributes of a `Pending` event.
    ///
    /// `status`, `organizer_id` and `created_at` of the stored record are kept.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`: the event does not exist
    /// - `NotBookable`: the event is no longer `Pending`
    /// - `CapacityBelowBookings`: the new capacity is below the current booking count
    fn update_event(&self, event: Event) -> StoreFuture<'_, Event>;

    /// All `Pending` events.
    ///
    /// # Errors
    ///
    /// - `Unavailable`, `Corrupt`
    fn list_pending(&self) -> StoreFuture<'_, Vec<Event>>;

    /// Events in `status` whose start time lies in `[from, to)`.
    ///
    /// # Errors
    ///
    /// - `Unavailable`, `Corrupt`
    fn list_by_status_and_time_range(
        &self,
        status: EventStatus,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Event>>;

    /// Events (with booking counts) matching `filter`, in no particular order.
    ///
    /// # Errors
    ///
    /// - `Unavailable`, `Corrupt`
    fn list_events(&self, filter: EventFilter) -> StoreFuture<'_, Vec<EventDetails>>;

    /// `Pending` events booked by `user_id` that start at or after `from`.
    ///
    /// # Errors
    ///
    /// - `Unavailable`, `Corrupt`
    fn list_booked_by(&self, user_id: UserId, from: DateTime<Utc>)
        -> StoreFuture<'_, Vec<Event>>;

    /// Move every listed event that is still `Pending` to `status`.
    ///
    /// Events that are missing or already terminal are skipped. Returns the ids that
    /// actually changed.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: nothing was changed
    fn bulk_set_status(&self, ids: Vec<EventId>, status: EventStatus)
        -> StoreFuture<'_, Vec<EventId>>;

    /// Delete an event together with its bookings and notifications.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`: the event does not exist
    fn delete_event(&self, id: EventId) -> StoreFuture<'_, ()>;

    /// Reserve a seat and append `notification`, revalidating every precondition at
    /// commit.
    ///
    /// Either both records are written or neither is.
    ///
    /// # Errors
    ///
    /// - `EventNotFound`: the event does not exist
    /// - `NotBookable`: the event is not `Pending`
    /// - `DuplicateBooking`: the user already holds a booking for the event
    /// - `CapacityExceeded`: no seat is left
    fn create_booking(&self, booking: Booking, notification: Notification) -> StoreFuture<'_, ()>;

    /// Load the booking for a pair, if any.
    ///
    /// # Errors
    ///
    /// - `Unavailable`, `Corrupt`
    fn find_booking(&self, event_id: EventId, user_id: UserId)
        -> StoreFuture<'_, Option<Booking>>;

    /// Number of active bookings for an event.
    ///
    /// # Errors
    ///
    /// - `Unavailable`
    fn count_bookings(&self, event_id: EventId) -> StoreFuture<'_, u32>;

    /// All active bookings for an event, oldest first.
    ///
    /// # Errors
    ///
    /// - `Unavailable`, `Corrupt`
    fn list_bookings(&self, event_id: EventId) -> StoreFuture<'_, Vec<Booking>>;

    /// Delete the booking for a pair and append `notification`.
    ///
    /// Either both writes happen or neither does.
    ///
    /// # Errors
    ///
    /// - `BookingNotFound`: no booking exists for the pair
    fn delete_booking(
        &self,
        event_id: EventId,
        user_id: UserId,
        notification: Notification,
    ) -> StoreFuture<'_, ()>;

    /// Claim the reminder marker of a booking and append its reminder.
    ///
    /// Returns `true` if this call set the marker, `false` if the reminder was already
    /// recorded, the booking no longer exists or the event is no longer `Pending`. At
    /// most one call per booking ever returns `true`.
    ///
    /// # Errors
    ///
    /// - `Unavailable`: neither the marker nor the notification was written
    fn record_reminder(&self, notification: Notification) -> StoreFuture<'_, bool>;

    /// Notifications about an event, oldest first.
    ///
    /// # Errors
    ///
    /// - `Unavailable`, `Corrupt`
    fn list_notifications(&self, event_id: EventId) -> StoreFuture<'_, Vec<Notification>>;
}

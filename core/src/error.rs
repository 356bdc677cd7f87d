//! Errors reported by the engine's collaborators.

use crate::types::{EventId, EventStatus, UserId};
use thiserror::Error;

/// Errors that can occur during event store operations.
///
/// Conditional writes (`create_booking`, `update_event`, ...) revalidate their
/// preconditions at commit time and report a violated precondition with one of the
/// specific variants below. Only [`StoreError::Unavailable`] describes an infrastructure
/// failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// No event with this id exists.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// The event exists but is not in a status that accepts the write.
    #[error("Event {event_id} is {status}")]
    NotBookable {
        /// The event that rejected the write
        event_id: EventId,
        /// Its current status
        status: EventStatus,
    },

    /// The user already holds a booking for the event.
    #[error("User {user_id} already holds a booking for event {event_id}")]
    DuplicateBooking {
        /// Booked event
        event_id: EventId,
        /// Booking user
        user_id: UserId,
    },

    /// Every seat of the event is taken.
    #[error("Event {event_id} is full ({capacity} seats)")]
    CapacityExceeded {
        /// Full event
        event_id: EventId,
        /// Its capacity
        capacity: u32,
    },

    /// No booking exists for the pair.
    #[error("No booking for user {user_id} on event {event_id}")]
    BookingNotFound {
        /// Event looked up
        event_id: EventId,
        /// User looked up
        user_id: UserId,
    },

    /// An update would shrink capacity below the seats already booked.
    #[error("Capacity {requested} is below the {booked} seats already booked on event {event_id}")]
    CapacityBelowBookings {
        /// Updated event
        event_id: EventId,
        /// Requested capacity
        requested: u32,
        /// Active bookings at commit time
        booked: u32,
    },

    /// An event with this id already exists.
    #[error("Event already exists: {0}")]
    EventAlreadyExists(EventId),

    /// Transient infrastructure failure (connection lost, pool exhausted, serialization
    /// failure under contention). Safe to retry.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A persisted record could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

/// A field of an event violates its constraint.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The title is empty or only whitespace.
    #[error("Title cannot be empty")]
    EmptyTitle,

    /// A tag name is empty or only whitespace.
    #[error("Tag names cannot be empty")]
    EmptyTag,

    /// A text field is longer than allowed.
    #[error("{field} is {len} characters, maximum is {max}")]
    TooLong {
        /// Offending field
        field: &'static str,
        /// Its length in characters
        len: usize,
        /// Allowed maximum
        max: usize,
    },

    /// The capacity would drop below the seats already booked.
    #[error("Capacity {requested} is below the {booked} seats already booked")]
    CapacityBelowBookings {
        /// Requested capacity
        requested: u32,
        /// Active bookings at commit time
        booked: u32,
    },
}

/// Errors reported by a [`NotificationSink`](crate::notification::NotificationSink).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SinkError {
    /// The delivery channel refused or dropped the notification.
    #[error("Delivery failed: {0}")]
    DeliveryFailed(String),

    /// The sink has shut down.
    #[error("Sink closed")]
    Closed,
}

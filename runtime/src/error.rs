//! Errors returned to callers of the booking engine.

use seatbook_core::error::{StoreError, ValidationError};
use seatbook_core::types::{EventId, EventStatus, UserId};
use thiserror::Error;

/// Caller-facing error of every engine operation.
///
/// Everything except [`BookingError::StoreUnavailable`] is a final answer: retrying the
/// same request cannot change it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BookingError {
    /// The user already holds a reservation for the event.
    #[error("User {user_id} already booked event {event_id}")]
    DuplicateBooking {
        /// Booked event
        event_id: EventId,
        /// Booking user
        user_id: UserId,
    },

    /// The event was full when the reservation was evaluated.
    #[error("Event {event_id} has no seats left (capacity {capacity})")]
    CapacityExceeded {
        /// Full event
        event_id: EventId,
        /// Its capacity
        capacity: u32,
    },

    /// The event does not exist or is not `Pending`.
    #[error("Event {0} is not open for booking")]
    EventNotBookable(EventId),

    /// The user holds no reservation for the event.
    #[error("User {user_id} has no booking for event {event_id}")]
    BookingNotFound {
        /// Event looked up
        event_id: EventId,
        /// User looked up
        user_id: UserId,
    },

    /// Only the organizer may perform this operation.
    #[error("User {user_id} is not the organizer of event {event_id}")]
    NotAuthorized {
        /// Target event
        event_id: EventId,
        /// Caller
        user_id: UserId,
    },

    /// The event is past the window in which it may be deleted.
    #[error("Event {0} can no longer be deleted")]
    DeletionWindowExpired(EventId),

    /// No event with this id exists.
    #[error("Event not found: {0}")]
    EventNotFound(EventId),

    /// Event attributes violate a field constraint.
    #[error("Invalid event: {0}")]
    InvalidEvent(#[from] ValidationError),

    /// The requested status change is not allowed from the current status.
    #[error("Event {event_id} is already {status}")]
    InvalidTransition {
        /// Target event
        event_id: EventId,
        /// Current status
        status: EventStatus,
    },

    /// The store could not be reached; the operation may be retried.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The store returned something the engine cannot work with.
    #[error("Storage error: {0}")]
    Storage(String),
}

impl BookingError {
    /// Whether retrying the same request may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::StoreUnavailable(_))
    }

    /// Short label used for metrics and logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DuplicateBooking { .. } => "duplicate",
            Self::CapacityExceeded { .. } => "full",
            Self::EventNotBookable(_) => "not_bookable",
            Self::BookingNotFound { .. } => "not_found",
            Self::NotAuthorized { .. } => "not_authorized",
            Self::DeletionWindowExpired(_) => "window_expired",
            Self::EventNotFound(_) => "event_not_found",
            Self::InvalidEvent(_) => "invalid",
            Self::InvalidTransition { .. } => "invalid_transition",
            Self::StoreUnavailable(_) => "unavailable",
            Self::Storage(_) => "storage",
        }
    }
}

impl From<StoreError> for BookingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::EventNotFound(id) => Self::EventNotFound(id),
            StoreError::NotBookable { event_id, .. } => Self::EventNotBookable(event_id),
            StoreError::DuplicateBooking { event_id, user_id } => {
                Self::DuplicateBooking { event_id, user_id }
            }
            StoreError::CapacityExceeded { event_id, capacity } => {
                Self::CapacityExceeded { event_id, capacity }
            }
            StoreError::BookingNotFound { event_id, user_id } => {
                Self::BookingNotFound { event_id, user_id }
            }
            StoreError::CapacityBelowBookings {
                requested, booked, ..
            } => Self::InvalidEvent(ValidationError::CapacityBelowBookings { requested, booked }),
            StoreError::Unavailable(reason) => Self::StoreUnavailable(reason),
            err @ (StoreError::EventAlreadyExists(_) | StoreError::Corrupt(_)) => {
                Self::Storage(err.to_string())
            }
        }
    }
}

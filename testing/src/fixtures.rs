//! Builders for domain records and proptest strategies over them.

use chrono::{DateTime, Duration, TimeZone, Utc};
use seatbook_core::types::{
    Booking, Capacity, Event, EventAttributes, EventId, EventStatus, Notification,
    NotificationKind, UserId,
};
use std::collections::BTreeSet;

/// Reference instant shared by fixtures (same as [`test_clock`](crate::test_clock)).
#[must_use]
pub fn reference_time() -> DateTime<Utc> {
    Utc.timestamp_opt(1_735_689_600, 0)
        .single()
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}

/// Valid attributes for an event starting at `start_time`.
#[must_use]
pub fn attributes(start_time: DateTime<Utc>, capacity: Capacity) -> EventAttributes {
    EventAttributes {
        title: "Rust meetup".to_string(),
        description: "Talks and pizza".to_string(),
        start_time,
        location: "Community Hall".to_string(),
        capacity,
        tags: BTreeSet::from(["rust".to_string()]),
    }
}

/// A `Pending` event with a fresh organizer, created a week before [`reference_time`].
#[must_use]
pub fn event_starting_at(start_time: DateTime<Utc>, capacity: Capacity) -> Event {
    Event::new(
        EventId::new(),
        UserId::new(),
        attributes(start_time, capacity),
        reference_time() - Duration::days(7),
    )
}

/// Same as [`event_starting_at`], then forced into `status`.
#[must_use]
pub fn event_with_status(start_time: DateTime<Utc>, status: EventStatus) -> Event {
    let mut event = event_starting_at(start_time, Capacity::new(10));
    event.status = status;
    event
}

/// A booking of `event` by `user_id` together with its "booking created" notification,
/// as handed to [`EventStore::create_booking`](seatbook_core::event_store::EventStore::create_booking).
#[must_use]
pub fn reservation(event: &Event, user_id: UserId, at: DateTime<Utc>) -> (Booking, Notification) {
    (
        Booking::new(event.id, user_id, at),
        Notification::new(NotificationKind::BookingCreated, user_id, event, at),
    )
}

/// The "booking cancelled" notification for `user_id` on `event`.
#[must_use]
pub fn cancellation(event: &Event, user_id: UserId, at: DateTime<Utc>) -> Notification {
    Notification::new(NotificationKind::BookingCancelled, user_id, event, at)
}

/// Proptest strategies for domain types.
pub mod strategies {
    use super::{Duration, Event, EventStatus, event_with_status, reference_time};
    use proptest::prelude::*;

    /// Any of the three statuses
    pub fn status() -> impl Strategy<Value = EventStatus> {
        prop_oneof![
            Just(EventStatus::Pending),
            Just(EventStatus::Completed),
            Just(EventStatus::Cancelled),
        ]
    }

    /// Events whose start lies within ten days either side of [`reference_time`].
    pub fn event() -> impl Strategy<Value = Event> {
        (status(), -14_400_i64..14_400).prop_map(|(status, minutes)| {
            event_with_status(reference_time() + Duration::minutes(minutes), status)
        })
    }

    /// Up to `max` arbitrary events
    pub fn events(max: usize) -> impl Strategy<Value = Vec<Event>> {
        proptest::collection::vec(event(), 0..=max)
    }
}

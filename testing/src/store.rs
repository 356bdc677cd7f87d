//! In-memory [`EventStore`] for tests.
//!
//! All records live behind one mutex, so every operation is trivially atomic and
//! serializable. The lock is never held across an `.await`.
//!
//! Transient failures can be injected with [`InMemoryEventStore::fail_next`] to exercise
//! retry and deferral paths. [`InMemoryEventStore::lose_next_acks`] makes booking writes
//! commit and still report a failure, as a connection dropped after `COMMIT` would.
//! [`InMemoryEventStore::fail_next_claims`] fails only reminder claims.

use chrono::{DateTime, Utc};
use seatbook_core::error::StoreError;
use seatbook_core::event_store::{EventStore, StoreFuture};
use seatbook_core::types::{
    Booking, Event, EventDetails, EventFilter, EventId, EventStatus, Notification, UserId,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug, Default)]
struct State {
    events: HashMap<EventId, Event>,
    // Insertion order is booking order.
    bookings: HashMap<EventId, Vec<Booking>>,
    notifications: Vec<Notification>,
}

impl State {
    fn booked(&self, event_id: EventId) -> u32 {
        self.bookings
            .get(&event_id)
            .map_or(0, |bookings| u32::try_from(bookings.len()).unwrap_or(u32::MAX))
    }

    fn details(&self, event: &Event) -> EventDetails {
        EventDetails {
            event: event.clone(),
            booked: self.booked(event.id),
        }
    }
}

/// Thread-safe in-memory event store.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    state: Mutex<State>,
    pending_failures: AtomicUsize,
    lost_acks: AtomicUsize,
    failing_claims: AtomicUsize,
}

impl InMemoryEventStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` operations fail with [`StoreError::Unavailable`].
    pub fn fail_next(&self, count: usize) {
        self.pending_failures.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` booking writes (`create_booking`, `delete_booking`) commit,
    /// then report [`StoreError::Unavailable`] anyway.
    pub fn lose_next_acks(&self, count: usize) {
        self.lost_acks.store(count, Ordering::SeqCst);
    }

    /// Make the next `count` `record_reminder` calls fail with
    /// [`StoreError::Unavailable`], leaving every other operation untouched.
    pub fn fail_next_claims(&self, count: usize) {
        self.failing_claims.store(count, Ordering::SeqCst);
    }

    /// Number of notification records across all events
    #[must_use]
    pub fn notification_count(&self) -> usize {
        self.lock().notifications.len()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check_available(&self) -> Result<(), StoreError> {
        if take_one(&self.pending_failures) {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }
        Ok(())
    }

    fn run<T, F>(&self, op: F) -> StoreFuture<'_, T>
    where
        T: Send + 'static,
        F: FnOnce(&mut State) -> Result<T, StoreError> + Send + 'static,
    {
        let result = self.check_available().and_then(|()| op(&mut self.lock()));
        Box::pin(async move { result })
    }

    fn run_write<F>(&self, op: F) -> StoreFuture<'_, ()>
    where
        F: FnOnce(&mut State) -> Result<(), StoreError> + Send + 'static,
    {
        let result = self.check_available().and_then(|()| op(&mut self.lock()));
        let result = match result {
            Ok(()) if take_one(&self.lost_acks) => {
                Err(StoreError::Unavailable("acknowledgement lost".to_string()))
            }
            other => other,
        };
        Box::pin(async move { result })
    }
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
        .is_ok()
}

impl EventStore for InMemoryEventStore {
    fn insert_event(&self, event: Event) -> StoreFuture<'_, ()> {
        self.run(move |state| {
            if state.events.contains_key(&event.id) {
                return Err(StoreError::EventAlreadyExists(event.id));
            }
            state.events.insert(event.id, event);
            Ok(())
        })
    }

    fn get(&self, id: EventId) -> StoreFuture<'_, Option<Event>> {
        self.run(move |state| Ok(state.events.get(&id).cloned()))
    }

    fn get_details(&self, id: EventId) -> StoreFuture<'_, Option<EventDetails>> {
        self.run(move |state| Ok(state.events.get(&id).map(|event| state.details(event))))
    }

    fn update_event(&self, event: Event) -> StoreFuture<'_, Event> {
        self.run(move |state| {
            let booked = state.booked(event.id);
            let stored = state
                .events
                .get_mut(&event.id)
                .ok_or(StoreError::EventNotFound(event.id))?;
            if !stored.is_bookable() {
                return Err(StoreError::NotBookable {
                    event_id: event.id,
                    status: stored.status,
                });
            }
            if event.capacity.get() < booked {
                return Err(StoreError::CapacityBelowBookings {
                    event_id: event.id,
                    requested: event.capacity.get(),
                    booked,
                });
            }
            stored.title = event.title;
            stored.description = event.description;
            stored.start_time = event.start_time;
            stored.location = event.location;
            stored.capacity = event.capacity;
            stored.tags = event.tags;
            Ok(stored.clone())
        })
    }

    fn list_pending(&self) -> StoreFuture<'_, Vec<Event>> {
        self.run(|state| {
            Ok(state
                .events
                .values()
                .filter(|event| event.status == EventStatus::Pending)
                .cloned()
                .collect())
        })
    }

    fn list_by_status_and_time_range(
        &self,
        status: EventStatus,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Event>> {
        self.run(move |state| {
            Ok(state
                .events
                .values()
                .filter(|event| {
                    event.status == status && event.start_time >= from && event.start_time < to
                })
                .cloned()
                .collect())
        })
    }

    fn list_events(&self, filter: EventFilter) -> StoreFuture<'_, Vec<EventDetails>> {
        self.run(move |state| {
            Ok(state
                .events
                .values()
                .map(|event| state.details(event))
                .filter(|details| filter.matches(details))
                .collect())
        })
    }

    fn list_booked_by(
        &self,
        user_id: UserId,
        from: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Event>> {
        self.run(move |state| {
            Ok(state
                .events
                .values()
                .filter(|event| event.status == EventStatus::Pending && event.start_time >= from)
                .filter(|event| {
                    state
                        .bookings
                        .get(&event.id)
                        .is_some_and(|bookings| bookings.iter().any(|b| b.user_id == user_id))
                })
                .cloned()
                .collect())
        })
    }

    fn bulk_set_status(
        &self,
        ids: Vec<EventId>,
        status: EventStatus,
    ) -> StoreFuture<'_, Vec<EventId>> {
        self.run(move |state| {
            let mut changed = Vec::new();
            for id in ids {
                if let Some(event) = state.events.get_mut(&id) {
                    if event.status == EventStatus::Pending && status != EventStatus::Pending {
                        event.status = status;
                        changed.push(id);
                    }
                }
            }
            Ok(changed)
        })
    }

    fn delete_event(&self, id: EventId) -> StoreFuture<'_, ()> {
        self.run(move |state| {
            state
                .events
                .remove(&id)
                .ok_or(StoreError::EventNotFound(id))?;
            state.bookings.remove(&id);
            state.notifications.retain(|n| n.event_id != id);
            Ok(())
        })
    }

    fn create_booking(&self, booking: Booking, notification: Notification) -> StoreFuture<'_, ()> {
        self.run_write(move |state| {
            let Booking {
                event_id, user_id, ..
            } = booking;
            let event = state
                .events
                .get(&event_id)
                .ok_or(StoreError::EventNotFound(event_id))?;
            if !event.is_bookable() {
                return Err(StoreError::NotBookable {
                    event_id,
                    status: event.status,
                });
            }
            let capacity = event.capacity;
            let bookings = state.bookings.entry(event_id).or_default();
            if bookings.iter().any(|b| b.user_id == user_id) {
                return Err(StoreError::DuplicateBooking { event_id, user_id });
            }
            let booked = u32::try_from(bookings.len()).unwrap_or(u32::MAX);
            if !capacity.has_room_for(booked) {
                return Err(StoreError::CapacityExceeded {
                    event_id,
                    capacity: capacity.get(),
                });
            }
            bookings.push(booking);
            state.notifications.push(notification);
            Ok(())
        })
    }

    fn find_booking(
        &self,
        event_id: EventId,
        user_id: UserId,
    ) -> StoreFuture<'_, Option<Booking>> {
        self.run(move |state| {
            Ok(state
                .bookings
                .get(&event_id)
                .and_then(|bookings| bookings.iter().find(|b| b.user_id == user_id))
                .cloned())
        })
    }

    fn count_bookings(&self, event_id: EventId) -> StoreFuture<'_, u32> {
        self.run(move |state| Ok(state.booked(event_id)))
    }

    fn list_bookings(&self, event_id: EventId) -> StoreFuture<'_, Vec<Booking>> {
        self.run(move |state| Ok(state.bookings.get(&event_id).cloned().unwrap_or_default()))
    }

    fn delete_booking(
        &self,
        event_id: EventId,
        user_id: UserId,
        notification: Notification,
    ) -> StoreFuture<'_, ()> {
        self.run_write(move |state| {
            let bookings = state
                .bookings
                .get_mut(&event_id)
                .ok_or(StoreError::BookingNotFound { event_id, user_id })?;
            let position = bookings
                .iter()
                .position(|b| b.user_id == user_id)
                .ok_or(StoreError::BookingNotFound { event_id, user_id })?;
            bookings.remove(position);
            state.notifications.push(notification);
            Ok(())
        })
    }

    fn record_reminder(&self, notification: Notification) -> StoreFuture<'_, bool> {
        if take_one(&self.failing_claims) {
            return Box::pin(async {
                Err(StoreError::Unavailable("injected claim failure".to_string()))
            });
        }
        self.run(move |state| {
            let pending = state
                .events
                .get(&notification.event_id)
                .is_some_and(|event| event.status == EventStatus::Pending);
            if !pending {
                return Ok(false);
            }
            let booking = state
                .bookings
                .get_mut(&notification.event_id)
                .and_then(|bookings| {
                    bookings
                        .iter_mut()
                        .find(|b| b.user_id == notification.user_id)
                });
            let Some(booking) = booking else {
                return Ok(false);
            };
            if booking.reminder_sent_at.is_some() {
                return Ok(false);
            }
            booking.reminder_sent_at = Some(notification.created_at);
            state.notifications.push(notification);
            Ok(true)
        })
    }

    fn list_notifications(&self, event_id: EventId) -> StoreFuture<'_, Vec<Notification>> {
        self.run(move |state| {
            Ok(state
                .notifications
                .iter()
                .filter(|n| n.event_id == event_id)
                .cloned()
                .collect())
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::fixtures::{cancellation, event_starting_at, reference_time, reservation};
    use chrono::Duration;
    use seatbook_core::types::{Capacity, NotificationKind};

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        futures::executor::block_on(future)
    }

    fn book(store: &InMemoryEventStore, event: &Event, user_id: UserId) -> Result<(), StoreError> {
        let (booking, notification) = reservation(event, user_id, reference_time());
        block_on(store.create_booking(booking, notification))
    }

    #[test]
    fn test_create_booking_enforces_capacity_and_uniqueness() {
        let store = InMemoryEventStore::new();
        let event = event_starting_at(reference_time() + Duration::days(1), Capacity::new(1));
        block_on(store.insert_event(event.clone())).unwrap();

        let alice = UserId::new();
        let bob = UserId::new();
        book(&store, &event, alice).unwrap();

        assert!(matches!(
            book(&store, &event, alice),
            Err(StoreError::DuplicateBooking { .. })
        ));
        assert!(matches!(
            book(&store, &event, bob),
            Err(StoreError::CapacityExceeded { capacity: 1, .. })
        ));
        assert_eq!(block_on(store.count_bookings(event.id)).unwrap(), 1);
    }

    #[test]
    fn test_booking_writes_record_their_notification() {
        let store = InMemoryEventStore::new();
        let event = event_starting_at(reference_time() + Duration::days(1), Capacity::new(1));
        block_on(store.insert_event(event.clone())).unwrap();
        let user = UserId::new();

        let (booking, created) = reservation(&event, user, reference_time());
        block_on(store.create_booking(booking, created.clone())).unwrap();
        let rejected = reservation(&event, UserId::new(), reference_time());
        assert!(block_on(store.create_booking(rejected.0, rejected.1)).is_err());
        assert_eq!(
            block_on(store.list_notifications(event.id)).unwrap(),
            vec![created.clone()]
        );

        let cancelled = cancellation(&event, user, reference_time());
        block_on(store.delete_booking(event.id, user, cancelled.clone())).unwrap();
        let again = cancellation(&event, user, reference_time());
        assert!(block_on(store.delete_booking(event.id, user, again)).is_err());
        assert_eq!(
            block_on(store.list_notifications(event.id)).unwrap(),
            vec![created, cancelled]
        );
    }

    #[test]
    fn test_lost_ack_still_commits() {
        let store = InMemoryEventStore::new();
        let event = event_starting_at(reference_time() + Duration::days(1), Capacity::new(5));
        block_on(store.insert_event(event.clone())).unwrap();
        let user = UserId::new();

        store.lose_next_acks(1);
        assert!(matches!(
            book(&store, &event, user),
            Err(StoreError::Unavailable(_))
        ));
        assert!(block_on(store.find_booking(event.id, user)).unwrap().is_some());
        assert_eq!(store.notification_count(), 1);

        // Reads do not consume the lost acknowledgement.
        store.lose_next_acks(1);
        assert!(block_on(store.list_pending()).is_ok());
        let cancelled = cancellation(&event, user, reference_time());
        assert!(block_on(store.delete_booking(event.id, user, cancelled)).is_err());
        assert!(block_on(store.find_booking(event.id, user)).unwrap().is_none());
    }

    #[test]
    fn test_bulk_set_status_skips_terminal_events() {
        let store = InMemoryEventStore::new();
        let event = event_starting_at(reference_time(), Capacity::new(5));
        block_on(store.insert_event(event.clone())).unwrap();

        let changed =
            block_on(store.bulk_set_status(vec![event.id], EventStatus::Cancelled)).unwrap();
        assert_eq!(changed, vec![event.id]);

        let changed =
            block_on(store.bulk_set_status(vec![event.id], EventStatus::Completed)).unwrap();
        assert!(changed.is_empty());
        assert_eq!(
            block_on(store.get(event.id)).unwrap().unwrap().status,
            EventStatus::Cancelled
        );
    }

    #[test]
    fn test_record_reminder_claims_once() {
        let store = InMemoryEventStore::new();
        let event = event_starting_at(reference_time() + Duration::hours(1), Capacity::new(5));
        block_on(store.insert_event(event.clone())).unwrap();
        let user = UserId::new();
        book(&store, &event, user).unwrap();

        let reminder =
            Notification::new(NotificationKind::StartingSoon, user, &event, reference_time());
        assert!(block_on(store.record_reminder(reminder.clone())).unwrap());
        assert!(!block_on(store.record_reminder(reminder)).unwrap());
        assert_eq!(block_on(store.list_notifications(event.id)).unwrap().len(), 2);
    }

    #[test]
    fn test_record_reminder_skips_cancelled_event() {
        let store = InMemoryEventStore::new();
        let event = event_starting_at(reference_time() + Duration::hours(1), Capacity::new(5));
        block_on(store.insert_event(event.clone())).unwrap();
        let user = UserId::new();
        book(&store, &event, user).unwrap();
        block_on(store.bulk_set_status(vec![event.id], EventStatus::Cancelled)).unwrap();

        let reminder =
            Notification::new(NotificationKind::StartingSoon, user, &event, reference_time());
        assert!(!block_on(store.record_reminder(reminder)).unwrap());

        let booking = block_on(store.find_booking(event.id, user)).unwrap().unwrap();
        assert_eq!(booking.reminder_sent_at, None);
        assert_eq!(store.notification_count(), 1);
    }

    #[test]
    fn test_delete_event_cascades() {
        let store = InMemoryEventStore::new();
        let event = event_starting_at(reference_time(), Capacity::new(5));
        block_on(store.insert_event(event.clone())).unwrap();
        let user = UserId::new();
        book(&store, &event, user).unwrap();
        assert_eq!(store.notification_count(), 1);

        block_on(store.delete_event(event.id)).unwrap();

        assert!(block_on(store.get(event.id)).unwrap().is_none());
        assert!(block_on(store.find_booking(event.id, user)).unwrap().is_none());
        assert!(block_on(store.list_notifications(event.id)).unwrap().is_empty());
    }

    #[test]
    fn test_injected_failures_are_transient_and_bounded() {
        let store = InMemoryEventStore::new();
        store.fail_next(2);
        assert!(matches!(
            block_on(store.list_pending()),
            Err(StoreError::Unavailable(_))
        ));
        assert!(block_on(store.list_pending()).is_err());
        assert!(block_on(store.list_pending()).is_ok());
    }
}

//! End-to-end properties of the booking engine over the in-memory store.

#![allow(clippy::expect_used, clippy::unwrap_used, clippy::panic)]

use chrono::Duration;
use seatbook_core::event_store::EventStore;
use seatbook_core::types::{
    Capacity, EventAttributes, EventFilter, EventId, EventStatus, NotificationKind, UserId,
};
use seatbook_runtime::retry::RetryPolicy;
use seatbook_runtime::{BookingError, EngineConfig, EventService, NotificationOutbox};
use seatbook_testing::fixtures::{attributes, reference_time};
use seatbook_testing::{InMemoryEventStore, ManualClock, RecordingSink};
use std::sync::Arc;

struct Engine {
    store: Arc<InMemoryEventStore>,
    sink: RecordingSink,
    clock: ManualClock,
    outbox: NotificationOutbox,
    service: Arc<EventService>,
}

fn fast_retry() -> RetryPolicy {
    RetryPolicy::builder()
        .max_retries(3)
        .initial_delay(std::time::Duration::from_millis(1))
        .jitter(0.0)
        .build()
}

fn engine() -> Engine {
    engine_over(Arc::new(InMemoryEventStore::new()))
}

fn engine_over(store: Arc<InMemoryEventStore>) -> Engine {
    let sink = RecordingSink::new();
    let clock = ManualClock::new(reference_time());
    let config = EngineConfig::default()
        .with_store_retry(fast_retry())
        .with_delivery_retry(fast_retry());
    let (outbox, _worker) = NotificationOutbox::spawn(Arc::new(sink.clone()), fast_retry());
    let service = Arc::new(EventService::new(
        store.clone(),
        outbox.clone(),
        Arc::new(clock.clone()),
        config,
    ));
    Engine {
        store,
        sink,
        clock,
        outbox,
        service,
    }
}

fn attrs_in(offset: Duration, capacity: u32) -> EventAttributes {
    attributes(reference_time() + offset, Capacity::new(capacity))
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_concurrent_reserves_never_exceed_capacity() {
    const CAPACITY: u32 = 10;
    const ATTEMPTS: usize = 64;

    let engine = engine();
    let event = engine
        .service
        .create_event(UserId::new(), attrs_in(Duration::days(1), CAPACITY))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..ATTEMPTS)
        .map(|_| {
            let service = Arc::clone(&engine.service);
            tokio::spawn(async move { service.reserve(event.id, UserId::new()).await })
        })
        .collect();

    let mut created = 0;
    let mut full = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => created += 1,
            Err(BookingError::CapacityExceeded { .. }) => full += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    assert_eq!(created, CAPACITY as usize);
    assert_eq!(full, ATTEMPTS - CAPACITY as usize);
    assert_eq!(engine.store.count_bookings(event.id).await.unwrap(), CAPACITY);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_capacity_holds_across_independent_engines() {
    // Two engines share a store but not their locks, as two processes would.
    const CAPACITY: u32 = 5;

    let store = Arc::new(InMemoryEventStore::new());
    let first = engine_over(store.clone());
    let second = engine_over(store.clone());
    let event = first
        .service
        .create_event(UserId::new(), attrs_in(Duration::days(1), CAPACITY))
        .await
        .unwrap();

    let tasks: Vec<_> = (0..40)
        .map(|i| {
            let service = if i % 2 == 0 {
                Arc::clone(&first.service)
            } else {
                Arc::clone(&second.service)
            };
            tokio::spawn(async move { service.reserve(event.id, UserId::new()).await })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        if task.await.unwrap().is_ok() {
            created += 1;
        }
    }

    assert_eq!(created, CAPACITY);
    assert_eq!(store.count_bookings(event.id).await.unwrap(), CAPACITY);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reserves_by_same_user() {
    let engine = engine();
    let event = engine
        .service
        .create_event(UserId::new(), attrs_in(Duration::days(1), 10))
        .await
        .unwrap();
    let user = UserId::new();

    let a = {
        let service = Arc::clone(&engine.service);
        tokio::spawn(async move { service.reserve(event.id, user).await })
    };
    let b = {
        let service = Arc::clone(&engine.service);
        tokio::spawn(async move { service.reserve(event.id, user).await })
    };
    let results = [a.await.unwrap(), b.await.unwrap()];

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results.iter().any(|r| {
        *r == Err(BookingError::DuplicateBooking {
            event_id: event.id,
            user_id: user,
        })
    }));
}

#[tokio::test]
async fn test_lifecycle_scan_is_idempotent() {
    let engine = engine();
    let organizer = UserId::new();
    let old = engine
        .service
        .create_event(organizer, attrs_in(Duration::hours(-3), 10))
        .await
        .unwrap();
    let recent = engine
        .service
        .create_event(organizer, attrs_in(Duration::hours(-1), 10))
        .await
        .unwrap();
    let future = engine
        .service
        .create_event(organizer, attrs_in(Duration::hours(5), 10))
        .await
        .unwrap();

    let scheduler = engine.service.lifecycle_scheduler();
    assert_eq!(scheduler.complete_due().await.unwrap(), vec![old.id]);
    assert!(scheduler.complete_due().await.unwrap().is_empty());

    let status = |id| {
        let store = engine.store.clone();
        async move { store.get(id).await.unwrap().unwrap().status }
    };
    assert_eq!(status(old.id).await, EventStatus::Completed);
    assert_eq!(status(recent.id).await, EventStatus::Pending);
    assert_eq!(status(future.id).await, EventStatus::Pending);
}

#[tokio::test]
async fn test_lifecycle_scan_never_overrides_cancellation() {
    let engine = engine();
    let organizer = UserId::new();
    let event = engine
        .service
        .create_event(organizer, attrs_in(Duration::hours(-3), 10))
        .await
        .unwrap();
    engine.service.cancel_event(event.id, organizer).await.unwrap();

    let scheduler = engine.service.lifecycle_scheduler();
    assert!(scheduler.complete_due().await.unwrap().is_empty());
    assert_eq!(
        engine.store.get(event.id).await.unwrap().unwrap().status,
        EventStatus::Cancelled
    );
}

#[tokio::test]
async fn test_lifecycle_scan_heals_after_outage() {
    let engine = engine();
    let event = engine
        .service
        .create_event(UserId::new(), attrs_in(Duration::hours(-3), 10))
        .await
        .unwrap();

    let scheduler = engine.service.lifecycle_scheduler();
    engine.store.fail_next(100);
    assert!(scheduler.complete_due().await.is_err());

    engine.store.fail_next(0);
    assert_eq!(scheduler.complete_due().await.unwrap(), vec![event.id]);
}

#[tokio::test]
async fn test_listing_orders_pending_soonest_and_terminal_most_recent() {
    let engine = engine();
    let organizer = UserId::new();
    let mut created = Vec::new();
    for hours in [-30, -10, -20, 3, 1, 2] {
        created.push(
            engine
                .service
                .create_event(organizer, attrs_in(Duration::hours(hours), 10))
                .await
                .unwrap(),
        );
    }
    engine
        .service
        .lifecycle_scheduler()
        .complete_due()
        .await
        .unwrap();

    let listed = engine
        .service
        .list_events(EventFilter::default())
        .await
        .unwrap();
    let starts: Vec<i64> = listed
        .iter()
        .map(|d| (d.event.start_time - reference_time()).num_hours())
        .collect();
    let statuses: Vec<EventStatus> = listed.iter().map(|d| d.event.status).collect();

    assert_eq!(starts, vec![1, 2, 3, -10, -20, -30]);
    assert_eq!(
        statuses,
        vec![
            EventStatus::Pending,
            EventStatus::Pending,
            EventStatus::Pending,
            EventStatus::Completed,
            EventStatus::Completed,
            EventStatus::Completed,
        ]
    );
}

#[tokio::test]
async fn test_deletion_window_boundaries() {
    let engine = engine();
    let organizer = UserId::new();
    let early = engine
        .service
        .create_event(organizer, attrs_in(Duration::days(2), 10))
        .await
        .unwrap();
    let late = engine
        .service
        .create_event(organizer, attrs_in(Duration::days(2), 10))
        .await
        .unwrap();

    engine.clock.advance(Duration::minutes(59));
    engine.service.delete_event(early.id, organizer).await.unwrap();

    engine.clock.advance(Duration::minutes(2));
    assert_eq!(
        engine.service.delete_event(late.id, organizer).await,
        Err(BookingError::DeletionWindowExpired(late.id))
    );
    assert!(engine.store.get(late.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_only_organizer_may_delete() {
    let engine = engine();
    let event = engine
        .service
        .create_event(UserId::new(), attrs_in(Duration::days(2), 10))
        .await
        .unwrap();
    let stranger = UserId::new();

    assert_eq!(
        engine.service.delete_event(event.id, stranger).await,
        Err(BookingError::NotAuthorized {
            event_id: event.id,
            user_id: stranger
        })
    );
}

#[tokio::test]
async fn test_reminder_is_sent_exactly_once() {
    let engine = engine();
    let event = engine
        .service
        .create_event(UserId::new(), attrs_in(Duration::minutes(61), 10))
        .await
        .unwrap();
    let attendee = UserId::new();
    engine.service.reserve(event.id, attendee).await.unwrap();

    let dispatcher = engine.service.reminder_dispatcher();
    let mut sent = 0;
    for _ in 0..=8 {
        sent += dispatcher.send_due().await.unwrap();
        engine.clock.advance(Duration::seconds(15));
    }
    engine.outbox.flush().await;

    assert_eq!(sent, 1);
    let reminders: Vec<_> = engine
        .store
        .list_notifications(event.id)
        .await
        .unwrap()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::StartingSoon)
        .collect();
    assert_eq!(reminders.len(), 1);
    assert_eq!(reminders[0].user_id, attendee);

    let delivered = engine
        .sink
        .delivered()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::StartingSoon)
        .count();
    assert_eq!(delivered, 1);
}

async fn starting_soon(engine: &Engine, event_id: EventId) -> usize {
    engine
        .store
        .list_notifications(event_id)
        .await
        .unwrap()
        .iter()
        .filter(|n| n.kind == NotificationKind::StartingSoon)
        .count()
}

#[tokio::test]
async fn test_failed_reminder_claims_are_deferred_to_next_run() {
    let engine = engine();
    let event = engine
        .service
        .create_event(UserId::new(), attrs_in(Duration::minutes(30), 10))
        .await
        .unwrap();
    let attendee = UserId::new();
    engine.service.reserve(event.id, attendee).await.unwrap();
    let dispatcher = engine.service.reminder_dispatcher();

    // One more failure than the retry policy absorbs.
    engine.store.fail_next_claims(4);
    assert_eq!(dispatcher.send_due().await.unwrap(), 0);
    assert_eq!(starting_soon(&engine, event.id).await, 0);
    let booking = engine.store.find_booking(event.id, attendee).await.unwrap().unwrap();
    assert_eq!(booking.reminder_sent_at, None);

    assert_eq!(dispatcher.send_due().await.unwrap(), 1);
    assert_eq!(dispatcher.send_due().await.unwrap(), 0);
    assert_eq!(starting_soon(&engine, event.id).await, 1);

    engine.outbox.flush().await;
    let delivered = engine
        .sink
        .delivered()
        .into_iter()
        .filter(|n| n.kind == NotificationKind::StartingSoon)
        .count();
    assert_eq!(delivered, 1);
}

#[tokio::test]
async fn test_reminder_scan_heals_after_outage() {
    let engine = engine();
    let event = engine
        .service
        .create_event(UserId::new(), attrs_in(Duration::minutes(30), 10))
        .await
        .unwrap();
    engine.service.reserve(event.id, UserId::new()).await.unwrap();
    let dispatcher = engine.service.reminder_dispatcher();

    engine.store.fail_next(4);
    assert!(dispatcher.send_due().await.is_err());
    assert_eq!(starting_soon(&engine, event.id).await, 0);

    assert_eq!(dispatcher.send_due().await.unwrap(), 1);
    assert_eq!(starting_soon(&engine, event.id).await, 1);
}

#[tokio::test]
async fn test_cancelled_event_gets_no_reminder() {
    let engine = engine();
    let organizer = UserId::new();
    let event = engine
        .service
        .create_event(organizer, attrs_in(Duration::minutes(30), 10))
        .await
        .unwrap();
    engine.service.reserve(event.id, UserId::new()).await.unwrap();
    engine.service.cancel_event(event.id, organizer).await.unwrap();

    assert_eq!(engine.service.reminder_dispatcher().send_due().await.unwrap(), 0);
    assert_eq!(starting_soon(&engine, event.id).await, 0);
}

#[tokio::test]
async fn test_overlapping_reminder_scans_remind_once() {
    let engine = engine();
    let event = engine
        .service
        .create_event(UserId::new(), attrs_in(Duration::minutes(30), 10))
        .await
        .unwrap();
    for _ in 0..5 {
        engine.service.reserve(event.id, UserId::new()).await.unwrap();
    }

    let first = engine.service.reminder_dispatcher();
    let second = engine.service.reminder_dispatcher();
    let (a, b) = tokio::join!(first.send_due(), second.send_due());

    assert_eq!(a.unwrap() + b.unwrap(), 5);
    assert_eq!(first.send_due().await.unwrap(), 0);
}

#[tokio::test]
async fn test_delete_cascades_to_bookings_and_notifications() {
    let engine = engine();
    let organizer = UserId::new();
    let event = engine
        .service
        .create_event(organizer, attrs_in(Duration::days(1), 10))
        .await
        .unwrap();
    let attendee = UserId::new();
    engine.service.reserve(event.id, attendee).await.unwrap();
    assert_eq!(engine.store.list_notifications(event.id).await.unwrap().len(), 1);

    engine.service.delete_event(event.id, organizer).await.unwrap();

    assert!(engine.store.find_booking(event.id, attendee).await.unwrap().is_none());
    assert!(engine.store.list_bookings(event.id).await.unwrap().is_empty());
    assert!(engine.store.list_notifications(event.id).await.unwrap().is_empty());
    assert_eq!(
        engine.service.get_event(event.id).await,
        Err(BookingError::EventNotFound(event.id))
    );
}

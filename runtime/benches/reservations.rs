//! Reservation and scan planning benchmarks
//!
//! - Reserve/release round trip against the in-memory store
//! - Lifecycle planning over a large pending snapshot
//! - Listing order over a mixed-status snapshot
//!
//! Run with: `cargo bench -p seatbook-runtime`

#![allow(missing_docs)]
#![allow(clippy::expect_used)]

use chrono::Duration;
use criterion::{Criterion, Throughput, black_box, criterion_group, criterion_main};
use seatbook_core::event_store::EventStore;
use seatbook_core::ordering::sort_events;
use seatbook_core::types::{Capacity, EventStatus, UserId};
use seatbook_runtime::lifecycle::plan_completions;
use seatbook_runtime::retry::RetryPolicy;
use seatbook_runtime::{EngineConfig, EventService, NotificationOutbox};
use seatbook_testing::fixtures::{event_starting_at, event_with_status, reference_time};
use seatbook_testing::{FixedClock, InMemoryEventStore, RecordingSink};
use std::sync::Arc;

fn benchmark_reservations(c: &mut Criterion) {
    let mut group = c.benchmark_group("reservations");
    group.throughput(Throughput::Elements(1));

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .expect("Failed to build runtime");

    let store = Arc::new(InMemoryEventStore::new());
    let event = event_starting_at(reference_time() + Duration::days(1), Capacity::new(1));
    runtime
        .block_on(store.insert_event(event.clone()))
        .expect("insert event");

    let service = runtime.block_on(async {
        let (outbox, _worker) =
            NotificationOutbox::spawn(Arc::new(RecordingSink::new()), RetryPolicy::none());
        EventService::new(
            store.clone(),
            outbox,
            Arc::new(FixedClock::new(reference_time())),
            EngineConfig::default(),
        )
    });

    group.bench_function("reserve_release", |b| {
        let user = UserId::new();
        b.to_async(&runtime).iter(|| async {
            service
                .reserve(black_box(event.id), user)
                .await
                .expect("seat available");
            service.release(event.id, user).await.expect("booking exists");
        });
    });

    group.finish();
}

fn benchmark_planning(c: &mut Criterion) {
    let mut group = c.benchmark_group("planning");
    let now = reference_time();

    let pending: Vec<_> = (0..10_000)
        .map(|i| event_with_status(now - Duration::minutes(i), EventStatus::Pending))
        .collect();
    group.throughput(Throughput::Elements(10_000));
    group.bench_function("plan_completions_10k", |b| {
        b.iter(|| plan_completions(black_box(now), black_box(&pending), Duration::hours(2)));
    });

    let statuses = [EventStatus::Pending, EventStatus::Completed, EventStatus::Cancelled];
    let mixed: Vec<_> = (0..1_000_i64)
        .map(|i| {
            let status = statuses[usize::try_from(i % 3).unwrap_or(0)];
            event_with_status(now + Duration::minutes(i * 7 % 500 - 250), status)
        })
        .collect();
    group.throughput(Throughput::Elements(1_000));
    group.bench_function("sort_events_1k", |b| {
        b.iter(|| {
            let mut events = mixed.clone();
            sort_events(black_box(&mut events));
            events
        });
    });

    group.finish();
}

criterion_group!(benches, benchmark_reservations, benchmark_planning);
criterion_main!(benches);

//! # Seatbook Testing
//!
//! Testing utilities and in-memory collaborators for the seatbook booking engine.
//!
//! This crate provides:
//! - Deterministic clocks ([`FixedClock`], [`ManualClock`])
//! - An in-memory [`EventStore`](seatbook_core::event_store::EventStore) with fault
//!   injection ([`InMemoryEventStore`])
//! - Notification sinks that record or refuse deliveries
//! - Fixtures and proptest strategies for domain types
//!
//! ## Example
//!
//! ```ignore
//! use seatbook_runtime::{EngineConfig, EventService, NotificationOutbox};
//! use seatbook_testing::{test_clock, InMemoryEventStore, ManualClock, RecordingSink};
//! use std::sync::Arc;
//!
//! #[tokio::test]
//! async fn test_reserve() {
//!     let clock = ManualClock::new(test_clock().now());
//!     let store = Arc::new(InMemoryEventStore::new());
//!     let config = EngineConfig::default();
//!     let (outbox, _worker) =
//!         NotificationOutbox::spawn(Arc::new(RecordingSink::new()), config.delivery_retry.clone());
//!     let service = EventService::new(store.clone(), outbox, Arc::new(clock.clone()), config);
//!     // ...
//! }
//! ```

use chrono::{DateTime, Utc};
use seatbook_core::environment::Clock;

pub mod fixtures;
pub mod store;

/// Mock implementations of Environment traits and collaborators.
pub mod mocks {
    use super::{Clock, DateTime, Utc};
    use seatbook_core::error::SinkError;
    use seatbook_core::notification::NotificationSink;
    use seatbook_core::types::Notification;
    use std::future::Future;
    use std::pin::Pin;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex, PoisonError};

    /// Fixed clock for deterministic tests
    ///
    /// Always returns the same time, making tests reproducible.
    ///
    /// # Example
    ///
    /// ```
    /// use seatbook_testing::mocks::FixedClock;
    /// use seatbook_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Create a new fixed clock with the given time
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when told to.
    ///
    /// Clones share the same time, so a test can hand one clone to the engine and keep
    /// another to advance.
    ///
    /// ```
    /// use seatbook_testing::mocks::ManualClock;
    /// use seatbook_core::environment::Clock;
    /// use chrono::{Duration, Utc};
    ///
    /// let clock = ManualClock::new(Utc::now());
    /// let engine_clock = clock.clone();
    /// let before = engine_clock.now();
    /// clock.advance(Duration::minutes(5));
    /// assert_eq!(engine_clock.now() - before, Duration::minutes(5));
    /// ```
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<Mutex<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Create a clock starting at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(Mutex::new(time)),
            }
        }

        /// Move the clock forward (or backward, for a negative duration)
        pub fn advance(&self, by: chrono::Duration) {
            let mut time = self.time.lock().unwrap_or_else(PoisonError::into_inner);
            *time += by;
        }

        /// Jump to an absolute time
        pub fn set(&self, to: DateTime<Utc>) {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner) = to;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.time.lock().unwrap_or_else(PoisonError::into_inner)
        }
    }

    /// Create a default fixed clock for tests (2025-01-01 00:00:00 UTC)
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(crate::fixtures::reference_time())
    }

    /// Sink that records every notification it is handed.
    #[derive(Debug, Clone, Default)]
    pub struct RecordingSink {
        delivered: Arc<Mutex<Vec<Notification>>>,
    }

    impl RecordingSink {
        /// Create an empty recording sink
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Snapshot of everything delivered so far
        #[must_use]
        pub fn delivered(&self) -> Vec<Notification> {
            self.delivered
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone()
        }
    }

    impl NotificationSink for RecordingSink {
        fn enqueue(
            &self,
            notification: &Notification,
        ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
            let notification = notification.clone();
            Box::pin(async move {
                self.delivered
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(notification);
                Ok(())
            })
        }
    }

    /// Sink that refuses the first `failures` deliveries, then records like
    /// [`RecordingSink`]. Use `usize::MAX` for a sink that never accepts.
    #[derive(Debug, Clone)]
    pub struct FlakySink {
        remaining_failures: Arc<AtomicUsize>,
        attempts: Arc<AtomicUsize>,
        inner: RecordingSink,
    }

    impl FlakySink {
        /// Create a sink failing the next `failures` calls
        #[must_use]
        pub fn new(failures: usize) -> Self {
            Self {
                remaining_failures: Arc::new(AtomicUsize::new(failures)),
                attempts: Arc::new(AtomicUsize::new(0)),
                inner: RecordingSink::new(),
            }
        }

        /// Sink that never accepts a notification
        #[must_use]
        pub fn always_failing() -> Self {
            Self::new(usize::MAX)
        }

        /// Number of `enqueue` calls so far, failed or not
        #[must_use]
        pub fn attempts(&self) -> usize {
            self.attempts.load(Ordering::SeqCst)
        }

        /// Notifications that were eventually accepted
        #[must_use]
        pub fn delivered(&self) -> Vec<Notification> {
            self.inner.delivered()
        }
    }

    impl NotificationSink for FlakySink {
        fn enqueue(
            &self,
            notification: &Notification,
        ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let failed = self
                .remaining_failures
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| {
                    (left > 0).then(|| if left == usize::MAX { left } else { left - 1 })
                })
                .is_ok();
            if failed {
                return Box::pin(async {
                    Err(SinkError::DeliveryFailed("injected failure".to_string()))
                });
            }
            self.inner.enqueue(notification)
        }
    }
}

// Re-export commonly used items
pub use mocks::{FixedClock, FlakySink, ManualClock, RecordingSink, test_clock};
pub use store::InMemoryEventStore;

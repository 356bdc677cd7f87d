//! # Seatbook Core
//!
//! Domain types and collaborator traits for the seatbook booking engine.
//!
//! This crate has no I/O of its own. It defines:
//!
//! - **Records**: [`Event`], [`Booking`], [`Notification`] and their value objects
//! - **Ordering**: the composite listing order for events ([`ordering`])
//! - **Collaborators**: [`EventStore`](event_store::EventStore) and
//!   [`NotificationSink`](notification::NotificationSink), injected as trait objects
//! - **Environment**: the [`Clock`](environment::Clock) used for every time decision
//!
//! The booking ledger, scans and caller-facing service live in `seatbook-runtime`.
//!
//! ## Example
//!
//! ```
//! use seatbook_core::{Capacity, Event, EventAttributes, EventId, EventStatus, UserId};
//! use chrono::Utc;
//! use std::collections::BTreeSet;
//!
//! let event = Event::new(
//!     EventId::new(),
//!     UserId::new(),
//!     EventAttributes {
//!         title: "Rust meetup".to_string(),
//!         description: String::new(),
//!         start_time: Utc::now(),
//!         location: "Community Hall".to_string(),
//!         capacity: Capacity::new(40),
//!         tags: BTreeSet::new(),
//!     },
//!     Utc::now(),
//! );
//! assert_eq!(event.status, EventStatus::Pending);
//! ```

// Re-export commonly used types
pub use chrono::{DateTime, Utc};

pub mod error;
pub mod event_store;
pub mod notification;
pub mod ordering;
pub mod types;

pub use error::{SinkError, StoreError, ValidationError};
pub use types::*;

/// Environment module - Dependency injection traits
///
/// All time decisions (grace windows, scan cut-offs, record timestamps) go through
/// [`Clock`](environment::Clock) so they can be driven deterministically in tests.
pub mod environment {
    use chrono::{DateTime, Utc};

    /// Clock trait - abstracts time operations for testability
    ///
    /// # Examples
    ///
    /// ```ignore
    /// // Test - fixed time for deterministic tests
    /// struct FixedClock { time: DateTime<Utc> }
    /// impl Clock for FixedClock {
    ///     fn now(&self) -> DateTime<Utc> {
    ///         self.time
    ///     }
    /// }
    /// ```
    pub trait Clock: Send + Sync {
        /// Get the current time
        fn now(&self) -> DateTime<Utc>;
    }

    /// Production clock backed by the system time.
    #[derive(Debug, Clone, Copy, Default)]
    pub struct SystemClock;

    impl Clock for SystemClock {
        fn now(&self) -> DateTime<Utc> {
            Utc::now()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::environment::{Clock, SystemClock};

    #[test]
    fn test_system_clock_advances() {
        let clock = SystemClock;
        let first = clock.now();
        let second = clock.now();
        assert!(second >= first);
    }
}

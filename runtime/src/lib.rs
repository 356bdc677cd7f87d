//! # Seatbook Runtime
//!
//! The booking engine: everything that reads the clock, talks to the store or hands
//! notifications to a sink.
//!
//! ## Core Components
//!
//! - **[`BookingLedger`](ledger::BookingLedger)**: reserve and release seats under
//!   per-event serialization with commit-time revalidation
//! - **[`LifecycleScheduler`](lifecycle::LifecycleScheduler)**: completes events once
//!   their grace period has elapsed
//! - **[`ReminderDispatcher`](reminders::ReminderDispatcher)**: one "starting soon"
//!   reminder per booking
//! - **[`NotificationOutbox`](outbox::NotificationOutbox)**: delivers committed
//!   notifications off the critical path
//! - **[`EventService`](service::EventService)**: caller-facing operations
//! - **[`spawn_periodic`](periodic::spawn_periodic)**: runs scans on an interval
//!
//! ## Example
//!
//! ```ignore
//! use seatbook_runtime::{EngineConfig, EventService, NotificationOutbox, TracingSink};
//!
//! let config = EngineConfig::default();
//! let (outbox, _worker) =
//!     NotificationOutbox::spawn(Arc::new(TracingSink), config.delivery_retry.clone());
//! let service = EventService::new(store, outbox, Arc::new(SystemClock), config);
//!
//! let event = service.create_event(organizer, attributes).await?;
//! let booking = service.reserve(event.id, attendee).await?;
//! ```

/// Engine configuration
pub mod config;

/// Caller-facing error type
pub mod error;

/// Booking ledger (reserve / release)
pub mod ledger;

/// Lifecycle scan
pub mod lifecycle;

/// Per-event locks
pub mod locks;

/// Prometheus metrics for observability
pub mod metrics;

/// Notification outbox and log sink
pub mod outbox;

/// Periodic scan runner
pub mod periodic;

/// Reminder scan
pub mod reminders;

/// Retry logic with exponential backoff
pub mod retry;

/// Caller-facing service
pub mod service;

pub use config::EngineConfig;
pub use error::BookingError;
pub use ledger::BookingLedger;
pub use lifecycle::LifecycleScheduler;
pub use outbox::{NotificationOutbox, TracingSink};
pub use periodic::{Scan, shutdown_channel, spawn_periodic};
pub use reminders::ReminderDispatcher;
pub use service::EventService;

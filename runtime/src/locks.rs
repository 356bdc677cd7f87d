//! Per-event mutual exclusion.
//!
//! Writes that read an event's booking count and then act on it (reserve, capacity
//! updates, cancellation, deletion) hold the event's lock for the whole sequence, so
//! within one process they observe a total order per event. Different events never
//! contend. The store still revalidates at commit for writers in other processes.

use seatbook_core::types::EventId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::OwnedMutexGuard;

/// Idle locks are dropped once the registry grows past this size.
const PRUNE_THRESHOLD: usize = 1024;

/// Registry of one async mutex per event.
#[derive(Debug, Default)]
pub struct EventLocks {
    locks: Mutex<HashMap<EventId, Arc<tokio::sync::Mutex<()>>>>,
}

/// Exclusive access to one event; released on drop.
#[derive(Debug)]
pub struct EventGuard {
    _guard: OwnedMutexGuard<()>,
}

impl EventLocks {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to `event_id`.
    pub async fn lock(&self, event_id: EventId) -> EventGuard {
        let lock = {
            let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
            if locks.len() >= PRUNE_THRESHOLD {
                // Held or awaited locks have a clone outside the map.
                locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            }
            Arc::clone(locks.entry(event_id).or_default())
        };
        EventGuard {
            _guard: lock.lock_owned().await,
        }
    }

    /// Number of events with a registered lock
    #[must_use]
    pub fn len(&self) -> usize {
        self.locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Whether no lock is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_event_is_exclusive() {
        let locks = Arc::new(EventLocks::new());
        let event_id = EventId::new();

        let guard = locks.lock(event_id).await;
        let contender = {
            let locks = Arc::clone(&locks);
            tokio::spawn(async move {
                let _guard = locks.lock(event_id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        assert!(
            tokio::time::timeout(Duration::from_secs(1), contender)
                .await
                .is_ok()
        );
    }

    #[tokio::test]
    async fn test_distinct_events_do_not_contend() {
        let locks = EventLocks::new();
        let _first = locks.lock(EventId::new()).await;
        let second = tokio::time::timeout(Duration::from_millis(100), locks.lock(EventId::new()));
        assert!(second.await.is_ok());
    }

    #[tokio::test]
    async fn test_idle_locks_are_pruned() {
        let locks = EventLocks::new();
        for _ in 0..=PRUNE_THRESHOLD {
            drop(locks.lock(EventId::new()).await);
        }
        assert!(locks.len() <= PRUNE_THRESHOLD);
    }
}

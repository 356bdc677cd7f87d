//! Listing order for events.
//!
//! Pending events come first, soonest start first, so upcoming events surface at the
//! top. Completed and then cancelled events follow, most recent start first.
//!
//! The key is a composite (status rank, direction-aware start time, id) rather than a
//! single sign-flipped timestamp, so it is valid for every representable instant.

use crate::types::{Event, EventId, EventStatus};
use chrono::{DateTime, Utc};
use std::cmp::Reverse;

/// Start time ordered in the direction its status group requires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
enum StartOrder {
    Soonest(DateTime<Utc>),
    MostRecent(Reverse<DateTime<Utc>>),
}

/// Total order over events for listings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SortKey {
    rank: u8,
    start: StartOrder,
    id: EventId,
}

impl SortKey {
    /// Derive the key from an event's current status and start time.
    #[must_use]
    pub fn for_event(event: &Event) -> Self {
        Self::new(event.status, event.start_time, event.id)
    }

    /// Build a key from its parts.
    #[must_use]
    pub fn new(status: EventStatus, start_time: DateTime<Utc>, id: EventId) -> Self {
        let start = match status {
            EventStatus::Pending => StartOrder::Soonest(start_time),
            EventStatus::Completed | EventStatus::Cancelled => {
                StartOrder::MostRecent(Reverse(start_time))
            }
        };
        Self {
            rank: status.rank(),
            start,
            id,
        }
    }
}

/// Sort events in listing order.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by_cached_key(Event::sort_key);
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::{Capacity, EventAttributes, UserId};
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;
    use std::collections::BTreeSet;

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()
    }

    fn event_at(start_time: DateTime<Utc>, status: EventStatus) -> Event {
        let mut event = Event::new(
            EventId::new(),
            UserId::new(),
            EventAttributes {
                title: "Event".to_string(),
                description: String::new(),
                start_time,
                location: "Somewhere".to_string(),
                capacity: Capacity::new(10),
                tags: BTreeSet::new(),
            },
            base(),
        );
        event.status = status;
        event
    }

    #[test]
    fn test_pending_ascending_then_completed_descending() {
        let t1 = base() + Duration::hours(1);
        let t2 = base() + Duration::hours(2);
        let t3 = base() + Duration::hours(3);

        let mut events = vec![
            event_at(t2, EventStatus::Completed),
            event_at(t3, EventStatus::Pending),
            event_at(t1, EventStatus::Completed),
            event_at(t1, EventStatus::Pending),
            event_at(t3, EventStatus::Completed),
            event_at(t2, EventStatus::Pending),
        ];
        sort_events(&mut events);

        let order: Vec<_> = events.iter().map(|e| (e.status, e.start_time)).collect();
        assert_eq!(
            order,
            vec![
                (EventStatus::Pending, t1),
                (EventStatus::Pending, t2),
                (EventStatus::Pending, t3),
                (EventStatus::Completed, t3),
                (EventStatus::Completed, t2),
                (EventStatus::Completed, t1),
            ]
        );
    }

    #[test]
    fn test_cancelled_after_completed() {
        let mut events = vec![
            event_at(base(), EventStatus::Cancelled),
            event_at(base() - Duration::days(300), EventStatus::Completed),
        ];
        sort_events(&mut events);
        assert_eq!(events[0].status, EventStatus::Completed);
        assert_eq!(events[1].status, EventStatus::Cancelled);
    }

    #[test]
    fn test_extreme_timestamps_do_not_overflow() {
        let mut events = vec![
            event_at(DateTime::<Utc>::MAX_UTC, EventStatus::Completed),
            event_at(DateTime::<Utc>::MIN_UTC, EventStatus::Completed),
            event_at(DateTime::<Utc>::MAX_UTC, EventStatus::Pending),
            event_at(DateTime::<Utc>::MIN_UTC, EventStatus::Pending),
        ];
        sort_events(&mut events);
        assert_eq!(events[0].start_time, DateTime::<Utc>::MIN_UTC);
        assert_eq!(events[1].start_time, DateTime::<Utc>::MAX_UTC);
        assert_eq!(events[2].start_time, DateTime::<Utc>::MAX_UTC);
        assert_eq!(events[3].start_time, DateTime::<Utc>::MIN_UTC);
    }

    fn status_strategy() -> impl Strategy<Value = EventStatus> {
        prop_oneof![
            Just(EventStatus::Pending),
            Just(EventStatus::Completed),
            Just(EventStatus::Cancelled),
        ]
    }

    proptest! {
        #[test]
        fn prop_sorted_listing_respects_group_direction(
            entries in prop::collection::vec((status_strategy(), -1_000_000i64..1_000_000), 0..40)
        ) {
            let mut events: Vec<Event> = entries
                .into_iter()
                .map(|(status, offset)| event_at(base() + Duration::seconds(offset), status))
                .collect();
            sort_events(&mut events);

            for pair in events.windows(2) {
                let (a, b) = (&pair[0], &pair[1]);
                prop_assert!(a.status.rank() <= b.status.rank());
                if a.status == b.status {
                    if a.status == EventStatus::Pending {
                        prop_assert!(a.start_time <= b.start_time);
                    } else {
                        prop_assert!(a.start_time >= b.start_time);
                    }
                }
            }
        }
    }
}

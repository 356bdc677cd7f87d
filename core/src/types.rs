//! Domain types for the booking engine.
//!
//! Value objects (identifiers, capacity, status) and the three persisted records:
//! [`Event`], [`Booking`] and [`Notification`].

use crate::error::ValidationError;
use crate::ordering::SortKey;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for an event
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EventId(Uuid);

impl EventId {
    /// Creates a new random `EventId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `EventId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for EventId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user (organizer or attendee)
///
/// Users are owned by the authentication layer; the engine only stores their ids.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a notification record
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NotificationId(Uuid);

impl NotificationId {
    /// Creates a new random `NotificationId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `NotificationId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for NotificationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for NotificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Value Objects
// ============================================================================

/// Seat capacity of an event. Unsigned, so `capacity >= 0` holds by construction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Capacity(u32);

impl Capacity {
    /// Creates a new `Capacity`
    #[must_use]
    pub const fn new(seats: u32) -> Self {
        Self(seats)
    }

    /// Number of seats
    #[must_use]
    pub const fn get(self) -> u32 {
        self.0
    }

    /// Whether `booked` active bookings leave at least one free seat
    #[must_use]
    pub const fn has_room_for(self, booked: u32) -> bool {
        booked < self.0
    }

    /// Seats left after `booked` active bookings
    #[must_use]
    pub const fn remaining(self, booked: u32) -> u32 {
        self.0.saturating_sub(booked)
    }
}

impl fmt::Display for Capacity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of an event.
///
/// ```text
/// Pending ──(start + grace elapsed)──▶ Completed
///    │
///    └──(organizer cancels)──────────▶ Cancelled
/// ```
///
/// `Completed` and `Cancelled` are terminal.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventStatus {
    /// Upcoming or in progress; the only status that accepts bookings
    Pending,
    /// Started more than the completion grace period ago
    Completed,
    /// Cancelled by the organizer
    Cancelled,
}

impl EventStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Parse status from its database string.
    ///
    /// Returns `None` for unknown values.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Whether bookings may be created against an event in this status
    #[must_use]
    pub const fn is_bookable(self) -> bool {
        matches!(self, Self::Pending)
    }

    /// Whether the status can never change again
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !self.is_bookable()
    }

    /// Position of the status group in listings (pending first).
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Completed => 1,
            Self::Cancelled => 2,
        }
    }
}

impl fmt::Display for EventStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Event
// ============================================================================

/// Maximum title length in characters
pub const MAX_TITLE_LEN: usize = 100;
/// Maximum description length in characters
pub const MAX_DESCRIPTION_LEN: usize = 500;
/// Maximum location length in characters
pub const MAX_LOCATION_LEN: usize = 100;
/// Maximum tag name length in characters
pub const MAX_TAG_LEN: usize = 50;

/// Organizer-supplied attributes of a new event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventAttributes {
    /// Short title
    pub title: String,
    /// Free-text description
    pub description: String,
    /// When the event starts
    pub start_time: DateTime<Utc>,
    /// Where the event takes place
    pub location: String,
    /// Number of seats
    pub capacity: Capacity,
    /// Tag names
    pub tags: BTreeSet<String>,
}

impl EventAttributes {
    /// Check field lengths.
    ///
    /// # Errors
    ///
    /// Returns the first violated constraint.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.title.trim().is_empty() {
            return Err(ValidationError::EmptyTitle);
        }
        check_len("Title", &self.title, MAX_TITLE_LEN)?;
        check_len("Description", &self.description, MAX_DESCRIPTION_LEN)?;
        check_len("Location", &self.location, MAX_LOCATION_LEN)?;
        validate_tags(&self.tags)
    }
}

/// Partial update of an event's attributes. `None` leaves a field unchanged.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventPatch {
    /// New title
    pub title: Option<String>,
    /// New description
    pub description: Option<String>,
    /// New start time
    pub start_time: Option<DateTime<Utc>>,
    /// New location
    pub location: Option<String>,
    /// New capacity
    pub capacity: Option<Capacity>,
    /// Replacement tag set
    pub tags: Option<BTreeSet<String>>,
}

impl EventPatch {
    /// Whether the patch changes nothing
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.title.is_none()
            && self.description.is_none()
            && self.start_time.is_none()
            && self.location.is_none()
            && self.capacity.is_none()
            && self.tags.is_none()
    }
}

fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), ValidationError> {
    let len = value.chars().count();
    if len > max {
        return Err(ValidationError::TooLong { field, len, max });
    }
    Ok(())
}

fn validate_tags(tags: &BTreeSet<String>) -> Result<(), ValidationError> {
    for tag in tags {
        if tag.trim().is_empty() {
            return Err(ValidationError::EmptyTag);
        }
        check_len("Tag", tag, MAX_TAG_LEN)?;
    }
    Ok(())
}

/// A capacity-limited, time-bound activity open for reservation.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    /// Event ID
    pub id: EventId,
    /// Short title
    pub title: String,
    /// Free-text description
    pub description: String,
    /// When the event starts
    pub start_time: DateTime<Utc>,
    /// Where the event takes place
    pub location: String,
    /// Number of seats
    pub capacity: Capacity,
    /// Lifecycle status
    pub status: EventStatus,
    /// User who created the event
    pub organizer_id: UserId,
    /// When the event was created
    pub created_at: DateTime<Utc>,
    /// Tag names
    pub tags: BTreeSet<String>,
}

impl Event {
    /// Build a new `Pending` event from organizer attributes.
    #[must_use]
    pub fn new(
        id: EventId,
        organizer_id: UserId,
        attributes: EventAttributes,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id,
            title: attributes.title,
            description: attributes.description,
            start_time: attributes.start_time,
            location: attributes.location,
            capacity: attributes.capacity,
            status: EventStatus::Pending,
            organizer_id,
            created_at,
            tags: attributes.tags,
        }
    }

    /// Whether `user_id` organizes this event
    #[must_use]
    pub fn is_organized_by(&self, user_id: UserId) -> bool {
        self.organizer_id == user_id
    }

    /// Whether bookings may currently be created against this event
    #[must_use]
    pub const fn is_bookable(&self) -> bool {
        self.status.is_bookable()
    }

    /// Listing order key, derived from status and start time.
    #[must_use]
    pub fn sort_key(&self) -> SortKey {
        SortKey::for_event(self)
    }

    /// Apply a patch in place.
    ///
    /// # Errors
    ///
    /// Returns the first violated field constraint; the event is left unchanged in that
    /// case.
    pub fn apply(&mut self, patch: EventPatch) -> Result<(), ValidationError> {
        if let Some(title) = &patch.title {
            if title.trim().is_empty() {
                return Err(ValidationError::EmptyTitle);
            }
            check_len("Title", title, MAX_TITLE_LEN)?;
        }
        if let Some(description) = &patch.description {
            check_len("Description", description, MAX_DESCRIPTION_LEN)?;
        }
        if let Some(location) = &patch.location {
            check_len("Location", location, MAX_LOCATION_LEN)?;
        }
        if let Some(tags) = &patch.tags {
            validate_tags(tags)?;
        }

        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
        if let Some(start_time) = patch.start_time {
            self.start_time = start_time;
        }
        if let Some(location) = patch.location {
            self.location = location;
        }
        if let Some(capacity) = patch.capacity {
            self.capacity = capacity;
        }
        if let Some(tags) = patch.tags {
            self.tags = tags;
        }
        Ok(())
    }
}

/// An event together with its current booking count.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventDetails {
    /// The event record
    pub event: Event,
    /// Active bookings
    pub booked: u32,
}

impl EventDetails {
    /// Seats still available
    #[must_use]
    pub const fn available(&self) -> u32 {
        self.event.capacity.remaining(self.booked)
    }
}

/// Listing filter. Every `None`/empty criterion matches all events.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    /// Only events in this status
    pub status: Option<EventStatus>,
    /// Only events carrying at least one of these tags
    pub tags: BTreeSet<String>,
    /// Only events whose location contains this text (case-insensitive)
    pub location: Option<String>,
    /// Only events starting on this calendar day (UTC)
    pub date: Option<NaiveDate>,
    /// Only events with at least one free seat
    pub free_seats_only: bool,
}

impl EventFilter {
    /// Whether `details` satisfies every criterion.
    #[must_use]
    pub fn matches(&self, details: &EventDetails) -> bool {
        let event = &details.event;

        if self.status.is_some_and(|status| status != event.status) {
            return false;
        }
        if !self.tags.is_empty() && self.tags.is_disjoint(&event.tags) {
            return false;
        }
        if let Some(location) = &self.location {
            if !event
                .location
                .to_lowercase()
                .contains(&location.to_lowercase())
            {
                return false;
            }
        }
        if self
            .date
            .is_some_and(|date| event.start_time.date_naive() != date)
        {
            return false;
        }
        if self.free_seats_only && details.available() == 0 {
            return false;
        }
        true
    }
}

// ============================================================================
// Booking
// ============================================================================

/// A user's reservation of one seat on one event.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Booked event
    pub event_id: EventId,
    /// Booking user
    pub user_id: UserId,
    /// When the seat was reserved
    pub created_at: DateTime<Utc>,
    /// When the "starting soon" reminder was recorded, if it has been
    pub reminder_sent_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Creates a new booking without a reminder marker
    #[must_use]
    pub const fn new(event_id: EventId, user_id: UserId, created_at: DateTime<Utc>) -> Self {
        Self {
            event_id,
            user_id,
            created_at,
            reminder_sent_at: None,
        }
    }
}

// ============================================================================
// Notification
// ============================================================================

/// What triggered a notification.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationKind {
    /// A seat was reserved
    BookingCreated,
    /// A reservation was released
    BookingCancelled,
    /// The event starts within the reminder lead time
    StartingSoon,
}

impl NotificationKind {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::BookingCreated => "booking_created",
            Self::BookingCancelled => "booking_cancelled",
            Self::StartingSoon => "starting_soon",
        }
    }

    /// Parse kind from its database string.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "booking_created" => Some(Self::BookingCreated),
            "booking_cancelled" => Some(Self::BookingCancelled),
            "starting_soon" => Some(Self::StartingSoon),
            _ => None,
        }
    }

    /// Render the message text for this trigger.
    #[must_use]
    pub fn message(self, user_id: UserId, event: &Event) -> String {
        match self {
            Self::BookingCreated => {
                format!("User {user_id} booked a seat for event {} ({})", event.id, event.title)
            }
            Self::BookingCancelled => format!(
                "User {user_id} cancelled their booking for event {} ({})",
                event.id, event.title
            ),
            Self::StartingSoon => format!(
                "Reminder for user {user_id}: event {} ({}) starts at {}",
                event.id,
                event.title,
                event.start_time.format("%Y-%m-%d %H:%M UTC")
            ),
        }
    }
}

impl fmt::Display for NotificationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Append-only notification record.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    /// Notification ID
    pub id: NotificationId,
    /// Recipient
    pub user_id: UserId,
    /// Event the notification is about
    pub event_id: EventId,
    /// Trigger
    pub kind: NotificationKind,
    /// Rendered text
    pub message: String,
    /// When the record was produced
    pub created_at: DateTime<Utc>,
}

impl Notification {
    /// Build a notification of `kind` for `user_id` about `event`.
    #[must_use]
    pub fn new(
        kind: NotificationKind,
        user_id: UserId,
        event: &Event,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: NotificationId::new(),
            user_id,
            event_id: event.id,
            kind,
            message: kind.message(user_id, event),
            created_at,
        }
    }
}

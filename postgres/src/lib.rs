//! `PostgreSQL` implementation of the seatbook [`EventStore`].
//!
//! Schema lives in `migrations/` and is embedded with [`sqlx::migrate!`]:
//!
//! - `events`: one row per event, tags as `TEXT[]`
//! - `bookings`: primary key `(event_id, user_id)`, cascades on event deletion
//! - `notifications`: append-only, cascades on event deletion
//!
//! Conditional writes lock the event row (`SELECT ... FOR UPDATE`) inside a transaction,
//! so two transactions touching the same event serialize at the database even when they
//! come from different processes.
//!
//! # Example
//!
//! ```no_run
//! use seatbook_postgres::PostgresEventStore;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let store = PostgresEventStore::connect("postgres://localhost/seatbook", 10).await?;
//! store.migrate().await?;
//! # Ok(())
//! # }
//! ```

use chrono::{DateTime, Utc};
use seatbook_core::error::StoreError;
use seatbook_core::event_store::{EventStore, StoreFuture};
use seatbook_core::types::{
    Booking, Capacity, Event, EventDetails, EventFilter, EventId, EventStatus, Notification,
    NotificationId, NotificationKind, UserId,
};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{PgExecutor, Row};
use uuid::Uuid;

macro_rules! event_columns {
    () => {
        "id, title, description, start_time, location, capacity, status, organizer_id, created_at, tags"
    };
}

macro_rules! booked_count {
    () => {
        "(SELECT COUNT(*) FROM bookings b WHERE b.event_id = events.id) AS booked"
    };
}

/// `PostgreSQL`-backed event store.
#[derive(Clone)]
pub struct PostgresEventStore {
    pool: PgPool,
}

impl PostgresEventStore {
    /// Connect to `database_url` with a pool of at most `max_connections`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if the connection fails.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Failed to connect: {e}")))?;

        Ok(Self::from_pool(pool))
    }

    /// Wrap an existing pool.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Run the embedded migrations.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::Unavailable`] if a migration fails.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("Migration failed: {e}")))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    #[must_use]
    pub const fn pool(&self) -> &PgPool {
        &self.pool
    }
}

// ============================================================================
// Error mapping
// ============================================================================

/// Map a sqlx error to a [`StoreError`], counting it against `operation`.
fn store_error(operation: &'static str) -> impl Fn(sqlx::Error) -> StoreError {
    move |e| {
        metrics::counter!("seatbook_store_errors_total", "operation" => operation).increment(1);
        let error = classify(&e);
        tracing::warn!(operation, error = %e, "Store operation failed");
        error
    }
}

fn classify(error: &sqlx::Error) -> StoreError {
    match error {
        sqlx::Error::ColumnDecode { .. }
        | sqlx::Error::Decode(_)
        | sqlx::Error::ColumnNotFound(_)
        | sqlx::Error::ColumnIndexOutOfBounds { .. }
        | sqlx::Error::TypeNotFound { .. } => StoreError::Corrupt(error.to_string()),
        _ => StoreError::Unavailable(error.to_string()),
    }
}

fn is_unique_violation(error: &sqlx::Error) -> bool {
    matches!(error, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn decode<T>(result: Result<T, sqlx::Error>) -> Result<T, StoreError> {
    result.map_err(|e| StoreError::Corrupt(e.to_string()))
}

// ============================================================================
// Row decoding
// ============================================================================

fn event_from_row(row: &PgRow) -> Result<Event, StoreError> {
    let status: String = decode(row.try_get("status"))?;
    let status = EventStatus::parse(&status)
        .ok_or_else(|| StoreError::Corrupt(format!("Unknown event status '{status}'")))?;
    let capacity: i64 = decode(row.try_get("capacity"))?;
    let capacity = u32::try_from(capacity)
        .map_err(|_| StoreError::Corrupt(format!("Capacity {capacity} out of range")))?;
    let tags: Vec<String> = decode(row.try_get("tags"))?;

    Ok(Event {
        id: EventId::from_uuid(decode(row.try_get("id"))?),
        title: decode(row.try_get("title"))?,
        description: decode(row.try_get("description"))?,
        start_time: decode(row.try_get("start_time"))?,
        location: decode(row.try_get("location"))?,
        capacity: Capacity::new(capacity),
        status,
        organizer_id: UserId::from_uuid(decode(row.try_get("organizer_id"))?),
        created_at: decode(row.try_get("created_at"))?,
        tags: tags.into_iter().collect(),
    })
}

fn details_from_row(row: &PgRow) -> Result<EventDetails, StoreError> {
    let booked: i64 = decode(row.try_get("booked"))?;
    Ok(EventDetails {
        event: event_from_row(row)?,
        booked: count_to_u32(booked)?,
    })
}

fn booking_from_row(row: &PgRow) -> Result<Booking, StoreError> {
    Ok(Booking {
        event_id: EventId::from_uuid(decode(row.try_get("event_id"))?),
        user_id: UserId::from_uuid(decode(row.try_get("user_id"))?),
        created_at: decode(row.try_get("created_at"))?,
        reminder_sent_at: decode(row.try_get("reminder_sent_at"))?,
    })
}

fn notification_from_row(row: &PgRow) -> Result<Notification, StoreError> {
    let kind: String = decode(row.try_get("kind"))?;
    let kind = NotificationKind::parse(&kind)
        .ok_or_else(|| StoreError::Corrupt(format!("Unknown notification kind '{kind}'")))?;

    Ok(Notification {
        id: NotificationId::from_uuid(decode(row.try_get("id"))?),
        user_id: UserId::from_uuid(decode(row.try_get("user_id"))?),
        event_id: EventId::from_uuid(decode(row.try_get("event_id"))?),
        kind,
        message: decode(row.try_get("message"))?,
        created_at: decode(row.try_get("created_at"))?,
    })
}

fn count_to_u32(count: i64) -> Result<u32, StoreError> {
    u32::try_from(count).map_err(|_| StoreError::Corrupt(format!("Booking count {count} out of range")))
}

fn events_from_rows(rows: &[PgRow]) -> Result<Vec<Event>, StoreError> {
    rows.iter().map(event_from_row).collect()
}

fn tag_list(event: &Event) -> Vec<String> {
    event.tags.iter().cloned().collect()
}

async fn insert_notification<'e, E>(executor: E, notification: &Notification) -> Result<(), sqlx::Error>
where
    E: PgExecutor<'e>,
{
    sqlx::query(
        "INSERT INTO notifications (id, user_id, event_id, kind, message, created_at)
         VALUES ($1, $2, $3, $4, $5, $6)",
    )
    .bind(*notification.id.as_uuid())
    .bind(*notification.user_id.as_uuid())
    .bind(*notification.event_id.as_uuid())
    .bind(notification.kind.as_str())
    .bind(&notification.message)
    .bind(notification.created_at)
    .execute(executor)
    .await?;
    Ok(())
}

// ============================================================================
// EventStore
// ============================================================================

impl EventStore for PostgresEventStore {
    fn insert_event(&self, event: Event) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            sqlx::query(
                "INSERT INTO events
                    (id, title, description, start_time, location, capacity, status,
                     organizer_id, created_at, tags)
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(*event.id.as_uuid())
            .bind(&event.title)
            .bind(&event.description)
            .bind(event.start_time)
            .bind(&event.location)
            .bind(i64::from(event.capacity.get()))
            .bind(event.status.as_str())
            .bind(*event.organizer_id.as_uuid())
            .bind(event.created_at)
            .bind(tag_list(&event))
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_unique_violation(&e) {
                    return StoreError::EventAlreadyExists(event.id);
                }
                store_error("insert_event")(e)
            })?;

            tracing::debug!(event_id = %event.id, "Inserted event");
            Ok(())
        })
    }

    fn get(&self, id: EventId) -> StoreFuture<'_, Option<Event>> {
        Box::pin(async move {
            let row = sqlx::query(concat!("SELECT ", event_columns!(), " FROM events WHERE id = $1"))
                .bind(*id.as_uuid())
                .fetch_optional(&self.pool)
                .await
                .map_err(store_error("get"))?;

            row.as_ref().map(event_from_row).transpose()
        })
    }

    fn get_details(&self, id: EventId) -> StoreFuture<'_, Option<EventDetails>> {
        Box::pin(async move {
            let row = sqlx::query(concat!(
                "SELECT ",
                event_columns!(),
                ", ",
                booked_count!(),
                " FROM events WHERE id = $1"
            ))
            .bind(*id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error("get_details"))?;

            row.as_ref().map(details_from_row).transpose()
        })
    }

    fn update_event(&self, event: Event) -> StoreFuture<'_, Event> {
        Box::pin(async move {
            let on_error = store_error("update_event");
            let mut tx = self.pool.begin().await.map_err(&on_error)?;

            let current = sqlx::query("SELECT status FROM events WHERE id = $1 FOR UPDATE")
                .bind(*event.id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(&on_error)?
                .ok_or(StoreError::EventNotFound(event.id))?;

            let status: String = decode(current.try_get("status"))?;
            let status = EventStatus::parse(&status)
                .ok_or_else(|| StoreError::Corrupt(format!("Unknown event status '{status}'")))?;
            if !status.is_bookable() {
                return Err(StoreError::NotBookable {
                    event_id: event.id,
                    status,
                });
            }

            let booked: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE event_id = $1")
                .bind(*event.id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(&on_error)?;
            let booked = count_to_u32(booked)?;
            if event.capacity.get() < booked {
                return Err(StoreError::CapacityBelowBookings {
                    event_id: event.id,
                    requested: event.capacity.get(),
                    booked,
                });
            }

            let row = sqlx::query(concat!(
                "UPDATE events
                 SET title = $2, description = $3, start_time = $4, location = $5,
                     capacity = $6, tags = $7
                 WHERE id = $1
                 RETURNING ",
                event_columns!()
            ))
            .bind(*event.id.as_uuid())
            .bind(&event.title)
            .bind(&event.description)
            .bind(event.start_time)
            .bind(&event.location)
            .bind(i64::from(event.capacity.get()))
            .bind(tag_list(&event))
            .fetch_one(&mut *tx)
            .await
            .map_err(&on_error)?;

            let updated = event_from_row(&row)?;
            tx.commit().await.map_err(&on_error)?;
            Ok(updated)
        })
    }

    fn list_pending(&self) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move {
            let rows = sqlx::query(concat!(
                "SELECT ",
                event_columns!(),
                " FROM events WHERE status = 'pending'"
            ))
            .fetch_all(&self.pool)
            .await
            .map_err(store_error("list_pending"))?;

            events_from_rows(&rows)
        })
    }

    fn list_by_status_and_time_range(
        &self,
        status: EventStatus,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move {
            let rows = sqlx::query(concat!(
                "SELECT ",
                event_columns!(),
                " FROM events WHERE status = $1 AND start_time >= $2 AND start_time < $3"
            ))
            .bind(status.as_str())
            .bind(from)
            .bind(to)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error("list_by_status_and_time_range"))?;

            events_from_rows(&rows)
        })
    }

    fn list_events(&self, filter: EventFilter) -> StoreFuture<'_, Vec<EventDetails>> {
        Box::pin(async move {
            let rows = sqlx::query(concat!(
                "SELECT ",
                event_columns!(),
                ", ",
                booked_count!(),
                " FROM events WHERE ($1::TEXT IS NULL OR status = $1)
                   AND (cardinality($2::TEXT[]) = 0 OR tags && $2)"
            ))
            .bind(filter.status.map(|status| status.as_str()))
            .bind(filter.tags.iter().cloned().collect::<Vec<_>>())
            .fetch_all(&self.pool)
            .await
            .map_err(store_error("list_events"))?;

            let mut events = Vec::with_capacity(rows.len());
            for row in &rows {
                let details = details_from_row(row)?;
                if filter.matches(&details) {
                    events.push(details);
                }
            }
            Ok(events)
        })
    }

    fn list_booked_by(&self, user_id: UserId, from: DateTime<Utc>) -> StoreFuture<'_, Vec<Event>> {
        Box::pin(async move {
            let rows = sqlx::query(concat!(
                "SELECT ",
                event_columns!(),
                " FROM events
                 WHERE id IN (SELECT event_id FROM bookings WHERE user_id = $1)
                   AND status = 'pending' AND start_time >= $2"
            ))
            .bind(*user_id.as_uuid())
            .bind(from)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error("list_booked_by"))?;

            events_from_rows(&rows)
        })
    }

    fn bulk_set_status(&self, ids: Vec<EventId>, status: EventStatus) -> StoreFuture<'_, Vec<EventId>> {
        Box::pin(async move {
            if ids.is_empty() {
                return Ok(Vec::new());
            }
            let ids: Vec<Uuid> = ids.iter().map(|id| *id.as_uuid()).collect();

            let changed: Vec<Uuid> = sqlx::query_scalar(
                "UPDATE events SET status = $1
                 WHERE id = ANY($2) AND status = 'pending'
                 RETURNING id",
            )
            .bind(status.as_str())
            .bind(&ids)
            .fetch_all(&self.pool)
            .await
            .map_err(store_error("bulk_set_status"))?;

            tracing::debug!(requested = ids.len(), changed = changed.len(), %status, "Bulk status update");
            Ok(changed.into_iter().map(EventId::from_uuid).collect())
        })
    }

    fn delete_event(&self, id: EventId) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let result = sqlx::query("DELETE FROM events WHERE id = $1")
                .bind(*id.as_uuid())
                .execute(&self.pool)
                .await
                .map_err(store_error("delete_event"))?;

            if result.rows_affected() == 0 {
                return Err(StoreError::EventNotFound(id));
            }
            Ok(())
        })
    }

    fn create_booking(&self, booking: Booking, notification: Notification) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let on_error = store_error("create_booking");
            let Booking {
                event_id,
                user_id,
                created_at,
                ..
            } = booking;
            let mut tx = self.pool.begin().await.map_err(&on_error)?;

            // Row lock serializes every booking write for this event.
            let row = sqlx::query("SELECT status, capacity FROM events WHERE id = $1 FOR UPDATE")
                .bind(*event_id.as_uuid())
                .fetch_optional(&mut *tx)
                .await
                .map_err(&on_error)?
                .ok_or(StoreError::EventNotFound(event_id))?;

            let status: String = decode(row.try_get("status"))?;
            let status = EventStatus::parse(&status)
                .ok_or_else(|| StoreError::Corrupt(format!("Unknown event status '{status}'")))?;
            if !status.is_bookable() {
                return Err(StoreError::NotBookable { event_id, status });
            }
            let capacity: i64 = decode(row.try_get("capacity"))?;

            let exists: bool = sqlx::query_scalar(
                "SELECT EXISTS(SELECT 1 FROM bookings WHERE event_id = $1 AND user_id = $2)",
            )
            .bind(*event_id.as_uuid())
            .bind(*user_id.as_uuid())
            .fetch_one(&mut *tx)
            .await
            .map_err(&on_error)?;
            if exists {
                return Err(StoreError::DuplicateBooking { event_id, user_id });
            }

            let booked: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE event_id = $1")
                .bind(*event_id.as_uuid())
                .fetch_one(&mut *tx)
                .await
                .map_err(&on_error)?;
            if booked >= capacity {
                return Err(StoreError::CapacityExceeded {
                    event_id,
                    capacity: u32::try_from(capacity).unwrap_or(u32::MAX),
                });
            }

            sqlx::query("INSERT INTO bookings (event_id, user_id, created_at) VALUES ($1, $2, $3)")
                .bind(*event_id.as_uuid())
                .bind(*user_id.as_uuid())
                .bind(created_at)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    if is_unique_violation(&e) {
                        return StoreError::DuplicateBooking { event_id, user_id };
                    }
                    on_error(e)
                })?;
            insert_notification(&mut *tx, &notification)
                .await
                .map_err(&on_error)?;

            tx.commit().await.map_err(&on_error)?;
            Ok(())
        })
    }

    fn find_booking(&self, event_id: EventId, user_id: UserId) -> StoreFuture<'_, Option<Booking>> {
        Box::pin(async move {
            let row = sqlx::query(
                "SELECT event_id, user_id, created_at, reminder_sent_at
                 FROM bookings WHERE event_id = $1 AND user_id = $2",
            )
            .bind(*event_id.as_uuid())
            .bind(*user_id.as_uuid())
            .fetch_optional(&self.pool)
            .await
            .map_err(store_error("find_booking"))?;

            row.as_ref().map(booking_from_row).transpose()
        })
    }

    fn count_bookings(&self, event_id: EventId) -> StoreFuture<'_, u32> {
        Box::pin(async move {
            let booked: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bookings WHERE event_id = $1")
                .bind(*event_id.as_uuid())
                .fetch_one(&self.pool)
                .await
                .map_err(store_error("count_bookings"))?;
            count_to_u32(booked)
        })
    }

    fn list_bookings(&self, event_id: EventId) -> StoreFuture<'_, Vec<Booking>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT event_id, user_id, created_at, reminder_sent_at
                 FROM bookings WHERE event_id = $1
                 ORDER BY created_at, user_id",
            )
            .bind(*event_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(store_error("list_bookings"))?;

            rows.iter().map(booking_from_row).collect()
        })
    }

    fn delete_booking(
        &self,
        event_id: EventId,
        user_id: UserId,
        notification: Notification,
    ) -> StoreFuture<'_, ()> {
        Box::pin(async move {
            let on_error = store_error("delete_booking");
            let mut tx = self.pool.begin().await.map_err(&on_error)?;

            let result = sqlx::query("DELETE FROM bookings WHERE event_id = $1 AND user_id = $2")
                .bind(*event_id.as_uuid())
                .bind(*user_id.as_uuid())
                .execute(&mut *tx)
                .await
                .map_err(&on_error)?;
            if result.rows_affected() == 0 {
                return Err(StoreError::BookingNotFound { event_id, user_id });
            }

            insert_notification(&mut *tx, &notification)
                .await
                .map_err(&on_error)?;
            tx.commit().await.map_err(&on_error)?;
            Ok(())
        })
    }

    fn record_reminder(&self, notification: Notification) -> StoreFuture<'_, bool> {
        Box::pin(async move {
            let on_error = store_error("record_reminder");
            let mut tx = self.pool.begin().await.map_err(&on_error)?;

            let claimed = sqlx::query(
                "UPDATE bookings SET reminder_sent_at = $3
                 WHERE event_id = $1 AND user_id = $2 AND reminder_sent_at IS NULL
                   AND EXISTS (SELECT 1 FROM events WHERE id = $1 AND status = 'pending')",
            )
            .bind(*notification.event_id.as_uuid())
            .bind(*notification.user_id.as_uuid())
            .bind(notification.created_at)
            .execute(&mut *tx)
            .await
            .map_err(&on_error)?;

            if claimed.rows_affected() == 0 {
                return Ok(false);
            }

            insert_notification(&mut *tx, &notification)
                .await
                .map_err(&on_error)?;
            tx.commit().await.map_err(&on_error)?;
            Ok(true)
        })
    }

    fn list_notifications(&self, event_id: EventId) -> StoreFuture<'_, Vec<Notification>> {
        Box::pin(async move {
            let rows = sqlx::query(
                "SELECT id, user_id, event_id, kind, message, created_at
                 FROM notifications WHERE event_id = $1
                 ORDER BY created_at, id",
            )
            .bind(*event_id.as_uuid())
            .fetch_all(&self.pool)
            .await
            .map_err(store_error("list_notifications"))?;

            rows.iter().map(notification_from_row).collect()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_failures_are_corrupt() {
        let error = sqlx::Error::ColumnNotFound("status".to_string());
        assert!(matches!(classify(&error), StoreError::Corrupt(_)));
    }

    #[test]
    fn test_pool_failures_are_transient() {
        assert!(classify(&sqlx::Error::PoolTimedOut).is_transient());
        assert!(classify(&sqlx::Error::PoolClosed).is_transient());
    }

    #[test]
    fn test_negative_count_is_corrupt() {
        assert!(matches!(count_to_u32(-1), Err(StoreError::Corrupt(_))));
        assert_eq!(count_to_u32(7), Ok(7));
    }
}

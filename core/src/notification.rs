//! Notification sink: the external collaborator that delivers notifications.
//!
//! The engine decides *that* a notification exists; a sink decides *how* it reaches the
//! user (email, push, a queue). Sinks are only ever called after the triggering write
//! has committed, and their failures never propagate to the triggering caller.

use crate::error::SinkError;
use crate::types::Notification;
use std::future::Future;
use std::pin::Pin;

/// Delivery channel for notification records.
pub trait NotificationSink: Send + Sync {
    /// Hand a notification over for delivery.
    ///
    /// # Errors
    ///
    /// - `DeliveryFailed`: the channel refused the notification; the caller may retry
    /// - `Closed`: the sink has shut down
    fn enqueue(
        &self,
        notification: &Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>>;
}

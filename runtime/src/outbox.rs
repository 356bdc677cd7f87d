//! Notification outbox.
//!
//! Every notification is written to the store in the same atomic unit as the write that
//! triggered it (`create_booking`, `delete_booking`, `record_reminder`), so the record
//! survives a crash. Once that unit has committed, the producer hands the notification to
//! the outbox without awaiting anything. A single background worker drains the outbox in
//! order and hands each notification to the [`NotificationSink`], retrying refused
//! deliveries with backoff.
//!
//! Nothing the worker does can fail the producer: a reservation stays committed even if
//! its notification never reaches the user.

use crate::metrics::NotificationMetrics;
use crate::retry::{RetryPolicy, retry_with_backoff};
use seatbook_core::error::SinkError;
use seatbook_core::notification::NotificationSink;
use seatbook_core::types::Notification;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

#[derive(Debug)]
enum Envelope {
    Deliver(Notification),
    Flush(oneshot::Sender<()>),
}

/// Producer side of the outbox. Cheap to clone.
#[derive(Debug, Clone)]
pub struct NotificationOutbox {
    tx: mpsc::UnboundedSender<Envelope>,
}

impl NotificationOutbox {
    /// Spawn the outbox worker on the current Tokio runtime.
    ///
    /// The worker exits once every `NotificationOutbox` clone has been dropped and the
    /// queue is drained; await the returned handle to wait for that.
    #[must_use]
    pub fn spawn(
        sink: Arc<dyn NotificationSink>,
        delivery_retry: RetryPolicy,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let worker = OutboxWorker {
            rx,
            sink,
            delivery_retry,
        };
        (Self { tx }, tokio::spawn(worker.run()))
    }

    /// Deliver a committed notification in the background.
    pub fn deliver(&self, notification: Notification) {
        self.send(Envelope::Deliver(notification));
    }

    /// Wait until everything queued before this call has been processed.
    ///
    /// Returns immediately if the worker is gone.
    pub async fn flush(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(Envelope::Flush(ack_tx)).is_ok() {
            let _ = ack_rx.await;
        }
    }

    fn send(&self, envelope: Envelope) {
        if let Err(mpsc::error::SendError(envelope)) = self.tx.send(envelope) {
            NotificationMetrics::record_delivery("dropped");
            tracing::warn!(?envelope, "Outbox worker stopped, notification dropped");
        }
    }
}

struct OutboxWorker {
    rx: mpsc::UnboundedReceiver<Envelope>,
    sink: Arc<dyn NotificationSink>,
    delivery_retry: RetryPolicy,
}

impl OutboxWorker {
    async fn run(mut self) {
        tracing::debug!("Notification outbox started");
        while let Some(envelope) = self.rx.recv().await {
            match envelope {
                Envelope::Deliver(notification) => self.deliver(&notification).await,
                Envelope::Flush(ack) => {
                    let _ = ack.send(());
                }
            }
        }
        tracing::debug!("Notification outbox stopped");
    }

    async fn deliver(&self, notification: &Notification) {
        match retry_with_backoff(&self.delivery_retry, || self.sink.enqueue(notification)).await {
            Ok(()) => {
                NotificationMetrics::record_delivery("delivered");
                tracing::debug!(
                    notification_id = %notification.id,
                    user_id = %notification.user_id,
                    kind = %notification.kind,
                    "Notification delivered"
                );
            }
            Err(e) => {
                NotificationMetrics::record_delivery("failed");
                tracing::error!(
                    notification_id = %notification.id,
                    user_id = %notification.user_id,
                    kind = %notification.kind,
                    error = %e,
                    "Notification delivery failed"
                );
            }
        }
    }
}

/// Sink that writes every notification to the log.
///
/// Stands in for a real delivery channel (email, push) in deployments that have none.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl NotificationSink for TracingSink {
    fn enqueue(
        &self,
        notification: &Notification,
    ) -> Pin<Box<dyn Future<Output = Result<(), SinkError>> + Send + '_>> {
        tracing::info!(
            user_id = %notification.user_id,
            event_id = %notification.event_id,
            kind = %notification.kind,
            message = %notification.message,
            "Notification"
        );
        Box::pin(async { Ok(()) })
    }
}

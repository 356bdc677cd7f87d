//! Engine configuration.

use crate::retry::RetryPolicy;
use chrono::Duration;

/// Time windows, scan cadences and retry policies of the engine.
///
/// `Default` gives the production values: events complete two hours after they start,
/// organizers can delete an event during its first hour, and reminders go out an hour
/// before the start.
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// How long after its start a `Pending` event is marked `Completed`
    pub completion_grace: Duration,
    /// How long after creation the organizer may still delete an event
    pub deletion_window: Duration,
    /// How far ahead of the start the "starting soon" reminder is sent
    pub reminder_lead: Duration,
    /// Period of the lifecycle scan
    pub lifecycle_interval: std::time::Duration,
    /// Period of the reminder scan
    pub reminder_interval: std::time::Duration,
    /// Retries for store calls failing with a transient error
    pub store_retry: RetryPolicy,
    /// Retries for notification deliveries refused by the sink
    pub delivery_retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            completion_grace: Duration::hours(2),
            deletion_window: Duration::hours(1),
            reminder_lead: Duration::hours(1),
            lifecycle_interval: std::time::Duration::from_secs(300),
            reminder_interval: std::time::Duration::from_secs(30),
            store_retry: RetryPolicy::default(),
            delivery_retry: RetryPolicy::builder()
                .max_retries(5)
                .initial_delay(std::time::Duration::from_millis(200))
                .max_delay(std::time::Duration::from_secs(30))
                .build(),
        }
    }
}

impl EngineConfig {
    /// Set the completion grace period.
    #[must_use]
    pub const fn with_completion_grace(mut self, grace: Duration) -> Self {
        self.completion_grace = grace;
        self
    }

    /// Set the deletion window.
    #[must_use]
    pub const fn with_deletion_window(mut self, window: Duration) -> Self {
        self.deletion_window = window;
        self
    }

    /// Set the reminder lead time.
    #[must_use]
    pub const fn with_reminder_lead(mut self, lead: Duration) -> Self {
        self.reminder_lead = lead;
        self
    }

    /// Set the retry policy for transient store failures.
    #[must_use]
    pub fn with_store_retry(mut self, policy: RetryPolicy) -> Self {
        self.store_retry = policy;
        self
    }

    /// Set the retry policy for notification deliveries.
    #[must_use]
    pub fn with_delivery_retry(mut self, policy: RetryPolicy) -> Self {
        self.delivery_retry = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert_eq!(config.completion_grace, Duration::hours(2));
        assert_eq!(config.deletion_window, Duration::minutes(60));
        assert_eq!(config.reminder_lead, Duration::hours(1));
        assert_eq!(config.lifecycle_interval.as_secs(), 300);
    }
}

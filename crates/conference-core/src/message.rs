//! Transport rows.

use chrono::{DateTime, Utc};

/// A message as enqueued on the transport.
///
/// Immutable once enqueued; only its claimed/delivered status changes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Serialized tagged payload.
    pub body: String,
    /// Earliest instant at which the message may be delivered.
    pub delivery_date: Option<DateTime<Utc>>,
    /// Instant after which the message is dropped undelivered.
    pub expiration_date: Option<DateTime<Utc>>,
    /// Correlation ID threading causality across messages.
    pub correlation_id: Option<String>,
    /// Idempotency key for consumers.
    pub message_id: Option<String>,
}

impl Message {
    /// Creates an immediately visible message with no metadata.
    #[must_use]
    pub fn new(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            delivery_date: None,
            expiration_date: None,
            correlation_id: None,
            message_id: None,
        }
    }

    /// Returns true if the message may be delivered at `now`.
    #[must_use]
    pub fn is_visible_at(&self, now: DateTime<Utc>) -> bool {
        self.delivery_date.is_none_or(|date| date <= now)
    }

    /// Returns true if the message's time-to-live has elapsed at `now`.
    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expiration_date.is_some_and(|date| date <= now)
    }
}

/// A message claimed from a queue for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    /// Row identifier within the queue.
    pub id: i64,
    /// The queue the message was claimed from.
    pub queue: String,
    /// How many times the message has been claimed, including this one.
    pub delivery_count: i32,
    /// The enqueued message.
    pub message: Message,
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;

    use super::*;
    use crate::clock::testing::fixed_now;

    #[test]
    fn test_visibility_honours_delivery_date() {
        let now = fixed_now();
        let mut message = Message::new("{}");
        assert!(message.is_visible_at(now));

        message.delivery_date = Some(now + TimeDelta::seconds(30));
        assert!(!message.is_visible_at(now));
        assert!(!message.is_visible_at(now + TimeDelta::seconds(29)));
        assert!(message.is_visible_at(now + TimeDelta::seconds(30)));
    }

    #[test]
    fn test_expiry_honours_expiration_date() {
        let now = fixed_now();
        let mut message = Message::new("{}");
        assert!(!message.is_expired_at(now));

        message.expiration_date = Some(now + TimeDelta::minutes(1));
        assert!(!message.is_expired_at(now));
        assert!(message.is_expired_at(now + TimeDelta::minutes(1)));
    }
}

//! Delivery envelopes.
//!
//! An [`Envelope`] wraps a command or event with the metadata the transport
//! needs: how long to defer visibility, when to give up, and which causal
//! chain the message belongs to. Envelopes are always built explicitly.

use chrono::TimeDelta;

use crate::clock::Clock;
use crate::error::DomainError;
use crate::message::Message;
use crate::serialization::{Payload, TaggedPayload};

/// A payload plus delivery metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct Envelope<T> {
    body: T,
    delay: TimeDelta,
    time_to_live: Option<TimeDelta>,
    correlation_id: Option<String>,
    message_id: Option<String>,
}

impl<T> Envelope<T> {
    /// Wraps `body` for immediate delivery with no expiry.
    #[must_use]
    pub fn new(body: T) -> Self {
        Self {
            body,
            delay: TimeDelta::zero(),
            time_to_live: None,
            correlation_id: None,
            message_id: None,
        }
    }

    /// Defers visibility of the message by `delay`.
    #[must_use]
    pub fn with_delay(mut self, delay: TimeDelta) -> Self {
        self.delay = delay;
        self
    }

    /// Discards the message if it has not been delivered within `ttl`.
    #[must_use]
    pub fn with_time_to_live(mut self, ttl: TimeDelta) -> Self {
        self.time_to_live = Some(ttl);
        self
    }

    /// Threads the message into an existing causal chain.
    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }

    /// Sets an explicit idempotency key for consumers.
    #[must_use]
    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }

    /// The wrapped payload.
    pub fn body(&self) -> &T {
        &self.body
    }

    /// Consumes the envelope, returning the payload.
    pub fn into_body(self) -> T {
        self.body
    }

    /// Visibility deferral.
    pub fn delay(&self) -> TimeDelta {
        self.delay
    }

    /// Expiry relative to enqueue time, if any.
    pub fn time_to_live(&self) -> Option<TimeDelta> {
        self.time_to_live
    }

    /// Correlation identifier, if any.
    pub fn correlation_id(&self) -> Option<&str> {
        self.correlation_id.as_deref()
    }

    /// Explicit message identifier, if any.
    pub fn message_id(&self) -> Option<&str> {
        self.message_id.as_deref()
    }
}

impl<T: Payload> Envelope<T> {
    /// Serializes the envelope into a transport row, resolving the relative
    /// delay and time-to-live against `clock`.
    ///
    /// When no message id was set, the payload's own identifier is used.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the body cannot be encoded.
    pub fn to_message(&self, clock: &dyn Clock) -> Result<Message, DomainError> {
        let now = clock.now();
        let body = TaggedPayload::from_payload(&self.body)?.encode()?;
        let delivery_date = (self.delay > TimeDelta::zero()).then(|| now + self.delay);
        let message_id = self
            .message_id
            .clone()
            .or_else(|| self.body.payload_id().map(|id| id.to_string()));

        Ok(Message {
            body,
            delivery_date,
            expiration_date: self.time_to_live.map(|ttl| now + ttl),
            correlation_id: self.correlation_id.clone(),
            message_id,
        })
    }
}

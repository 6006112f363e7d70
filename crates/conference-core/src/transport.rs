//! Transport contracts.
//!
//! A sender enqueues rows, a queue hands them out one claim at a time, and a
//! handler consumes them. Delivery is at-least-once: a row is removed only
//! after its handler succeeds.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DomainError;
use crate::message::{Message, ReceivedMessage};

/// Queue carrying commands.
pub const COMMANDS_QUEUE: &str = "commands";

/// Queue carrying published events.
pub const EVENTS_QUEUE: &str = "events";

/// Enqueues messages durably.
#[async_trait]
pub trait MessageSender: Send + Sync {
    /// Enqueues all `messages` together; either all become durable or none.
    async fn send(&self, messages: Vec<Message>) -> Result<(), DomainError>;
}

/// The receiving side of a durable queue.
#[async_trait]
pub trait MessageQueue: Send + Sync {
    /// Name of the queue being consumed.
    fn name(&self) -> &str;

    /// Claims the earliest deliverable message at `now`, if any.
    ///
    /// A claimed message is invisible to other claimers until it is
    /// completed, abandoned, or its lease lapses.
    async fn claim(&self, now: DateTime<Utc>) -> Result<Option<ReceivedMessage>, DomainError>;

    /// Removes a successfully handled message.
    async fn complete(&self, id: i64) -> Result<(), DomainError>;

    /// Releases a claim so the message can be delivered again.
    async fn abandon(&self, id: i64) -> Result<(), DomainError>;

    /// Parks a message that can never be handled, keeping it for inspection.
    async fn dead_letter(&self, id: i64, reason: &str) -> Result<(), DomainError>;
}

/// Consumes messages delivered by a receiver.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one message. Returning an error leaves it for redelivery.
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), DomainError>;
}

//! Command and event buses.
//!
//! Both buses are thin typed fronts over a [`MessageSender`]: they serialize
//! envelopes into transport rows and return once the rows are durably
//! enqueued. Processing happens later, on a receiver.

use std::sync::Arc;

use tracing::debug;

use crate::clock::Clock;
use crate::command::Command;
use crate::envelope::Envelope;
use crate::error::DomainError;
use crate::message::Message;
use crate::serialization::Payload;
use crate::transport::MessageSender;

fn to_messages<T: Payload>(
    envelopes: &[Envelope<T>],
    clock: &dyn Clock,
) -> Result<Vec<Message>, DomainError> {
    envelopes
        .iter()
        .map(|envelope| envelope.to_message(clock))
        .collect()
}

/// Sends commands to their handlers.
#[derive(Clone)]
pub struct CommandBus {
    sender: Arc<dyn MessageSender>,
    clock: Arc<dyn Clock>,
}

impl CommandBus {
    /// Creates a bus writing to `sender`.
    #[must_use]
    pub fn new(sender: Arc<dyn MessageSender>, clock: Arc<dyn Clock>) -> Self {
        Self { sender, clock }
    }

    /// Enqueues one command.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the command cannot be encoded,
    /// or the sender's error if it could not be enqueued.
    pub async fn send<C: Command>(&self, envelope: Envelope<C>) -> Result<(), DomainError> {
        self.send_batch(std::slice::from_ref(&envelope)).await
    }

    /// Enqueues several commands together. No ordering is guaranteed
    /// between them.
    ///
    /// # Errors
    ///
    /// As [`Self::send`]; on error none of the batch is enqueued.
    pub async fn send_batch<C: Command>(&self, envelopes: &[Envelope<C>]) -> Result<(), DomainError> {
        if envelopes.is_empty() {
            return Ok(());
        }
        let messages = to_messages(envelopes, self.clock.as_ref())?;
        debug!(count = messages.len(), "sending commands");
        self.sender.send(messages).await
    }
}

/// Publishes events to their subscribers.
#[derive(Clone)]
pub struct EventBus {
    sender: Arc<dyn MessageSender>,
    clock: Arc<dyn Clock>,
}

impl EventBus {
    /// Creates a bus writing to `sender`.
    #[must_use]
    pub fn new(sender: Arc<dyn MessageSender>, clock: Arc<dyn Clock>) -> Self {
        Self { sender, clock }
    }

    /// Publishes one event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the event cannot be encoded,
    /// or the sender's error if it could not be enqueued.
    pub async fn publish<E: Payload>(&self, envelope: Envelope<E>) -> Result<(), DomainError> {
        self.publish_batch(std::slice::from_ref(&envelope)).await
    }

    /// Publishes several events together. No ordering is guaranteed
    /// between them.
    ///
    /// # Errors
    ///
    /// As [`Self::publish`]; on error none of the batch is enqueued.
    pub async fn publish_batch<E: Payload>(&self, envelopes: &[Envelope<E>]) -> Result<(), DomainError> {
        if envelopes.is_empty() {
            return Ok(());
        }
        let messages = to_messages(envelopes, self.clock.as_ref())?;
        debug!(count = messages.len(), "publishing events");
        self.sender.send(messages).await
    }
}

//! Event repository abstraction.
//!
//! [`EventRepository`] is the storage contract: an append-only stream per
//! aggregate plus an outbox written in the same transaction.
//! [`EventSourcedRepository`] is the typed layer command handlers use to
//! find, get and save aggregates.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::aggregate::EventSourced;
use crate::clock::Clock;
use crate::envelope::Envelope;
use crate::error::DomainError;
use crate::event::{DomainEvent, VersionedEvent};
use crate::message::Message;

/// Stored representation of a domain event.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEvent {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub aggregate_id: Uuid,
    /// Type of the aggregate owning the stream.
    pub aggregate_type: String,
    /// Event type name for deserialization routing.
    pub event_type: String,
    /// Serialized event payload.
    pub payload: serde_json::Value,
    /// Version within the aggregate stream, starting at 0.
    pub version: i64,
    /// Correlation ID of the save that produced the event.
    pub correlation_id: Option<String>,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
}

impl StoredEvent {
    /// Converts an aggregate event into its stored form.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the payload cannot be encoded.
    pub fn from_versioned<E: DomainEvent>(
        aggregate_type: &str,
        event: &VersionedEvent<E>,
        correlation_id: Option<&str>,
    ) -> Result<Self, DomainError> {
        Ok(Self {
            event_id: event.event_id,
            aggregate_id: event.source_id,
            aggregate_type: aggregate_type.to_owned(),
            event_type: event.event_type().to_owned(),
            payload: event.kind.to_payload()?,
            version: event.version,
            correlation_id: correlation_id.map(str::to_owned),
            occurred_at: event.occurred_at,
        })
    }

    /// Converts back into an aggregate event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::MissingHandler` if the aggregate declares no
    /// variant for the stored type, or `DomainError::Serialization` if the
    /// payload does not decode to that variant.
    pub fn into_versioned<T: EventSourced>(self) -> Result<VersionedEvent<T::Event>, DomainError> {
        if !T::Event::handles(&self.event_type) {
            return Err(DomainError::MissingHandler {
                aggregate_type: T::AGGREGATE_TYPE,
                event_type: self.event_type,
            });
        }
        let kind = T::Event::from_payload(self.payload)?;
        if kind.event_type() != self.event_type {
            return Err(DomainError::Serialization(format!(
                "event {} is tagged {} but decodes as {}",
                self.event_id,
                self.event_type,
                kind.event_type()
            )));
        }
        Ok(VersionedEvent {
            event_id: self.event_id,
            source_id: self.aggregate_id,
            version: self.version,
            occurred_at: self.occurred_at,
            kind,
        })
    }
}

/// Checks that `events` continue the stream directly after `expected_version`.
///
/// # Errors
///
/// Returns `DomainError::ConcurrencyConflict` on the first gap or duplicate.
pub fn ensure_contiguous(
    aggregate_id: Uuid,
    expected_version: i64,
    events: &[StoredEvent],
) -> Result<(), DomainError> {
    let mut previous = expected_version;
    for event in events {
        if event.aggregate_id != aggregate_id || event.version != previous + 1 {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: previous,
                actual: event.version - 1,
            });
        }
        previous = event.version;
    }
    Ok(())
}

/// Repository trait for loading and appending domain events.
#[async_trait]
pub trait EventRepository: Send + Sync {
    /// Load all events for a given aggregate, ordered by version.
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError>;

    /// Append new events to an aggregate stream with optimistic concurrency.
    ///
    /// `expected_version` is the last persisted version (-1 for a new
    /// stream). `outbox` is enqueued in the same transaction: either the
    /// events and the messages are all committed, or none are.
    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
        outbox: &[Message],
    ) -> Result<(), DomainError>;
}

/// Loads and saves aggregates of type `T`.
pub struct EventSourcedRepository<T> {
    events: Arc<dyn EventRepository>,
    clock: Arc<dyn Clock>,
    _aggregate: PhantomData<fn() -> T>,
}

impl<T> Clone for EventSourcedRepository<T> {
    fn clone(&self) -> Self {
        Self {
            events: Arc::clone(&self.events),
            clock: Arc::clone(&self.clock),
            _aggregate: PhantomData,
        }
    }
}

impl<T: EventSourced> EventSourcedRepository<T> {
    /// Creates a repository over an event store.
    #[must_use]
    pub fn new(events: Arc<dyn EventRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            events,
            clock,
            _aggregate: PhantomData,
        }
    }

    /// Reconstructs the aggregate, or returns `None` if it has no events.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::MissingHandler` or `DomainError::Serialization`
    /// when the stored stream does not match the aggregate's vocabulary, and
    /// propagates store errors.
    pub async fn find(&self, id: Uuid) -> Result<Option<T>, DomainError> {
        let stored = self.events.load_events(id).await?;
        if stored.is_empty() {
            return Ok(None);
        }
        let history = stored
            .into_iter()
            .map(StoredEvent::into_versioned::<T>)
            .collect::<Result<Vec<_>, _>>()?;
        let mut aggregate = T::from_id(id);
        aggregate.load_from(history)?;
        Ok(Some(aggregate))
    }

    /// Like [`Self::find`], for callers that assume the aggregate exists.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if there are no events for
    /// `id`, plus everything [`Self::find`] returns.
    pub async fn get(&self, id: Uuid) -> Result<T, DomainError> {
        self.find(id)
            .await?
            .ok_or(DomainError::AggregateNotFound(id))
    }

    /// Persists pending events and enqueues them for publication atomically.
    ///
    /// Pending events are cleared only once the store has committed. A
    /// `ConcurrencyConflict` means another writer got there first: reload and
    /// retry the business operation.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` on a version race and
    /// propagates store and serialization errors.
    #[instrument(
        skip(self, aggregate),
        fields(aggregate_type = T::AGGREGATE_TYPE, aggregate_id = %aggregate.id())
    )]
    pub async fn save(
        &self,
        aggregate: &mut T,
        correlation_id: Option<&str>,
    ) -> Result<(), DomainError> {
        let pending = aggregate.pending_events();
        let Some(first) = pending.first() else {
            return Ok(());
        };
        let expected_version = first.version - 1;

        let stored = pending
            .iter()
            .map(|event| StoredEvent::from_versioned(T::AGGREGATE_TYPE, event, correlation_id))
            .collect::<Result<Vec<_>, _>>()?;
        let outbox = pending
            .iter()
            .map(|event| {
                let mut envelope = Envelope::new(event.clone());
                if let Some(correlation_id) = correlation_id {
                    envelope = envelope.with_correlation_id(correlation_id);
                }
                envelope.to_message(self.clock.as_ref())
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.events
            .append_events(aggregate.id(), expected_version, &stored, &outbox)
            .await?;

        debug!(
            count = stored.len(),
            version = aggregate.version(),
            "saved aggregate events"
        );
        aggregate.clear_pending_events();
        Ok(())
    }
}

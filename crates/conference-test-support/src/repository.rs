//! Test repositories: in-memory `EventRepository` implementations.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use conference_core::error::DomainError;
use conference_core::message::Message;
use conference_core::repository::{EventRepository, StoredEvent, ensure_contiguous};
use conference_core::transport::EVENTS_QUEUE;
use uuid::Uuid;

use crate::queue::InMemoryMessageQueue;

/// An event store held in memory, writing its outbox to an
/// [`InMemoryMessageQueue`] under the same lock as the events.
#[derive(Debug)]
pub struct InMemoryEventRepository {
    streams: Mutex<HashMap<Uuid, Vec<StoredEvent>>>,
    outbox: Arc<InMemoryMessageQueue>,
    fail_outbox: AtomicBool,
}

impl InMemoryEventRepository {
    /// Creates an empty store with its own `events` queue.
    #[must_use]
    pub fn new() -> Self {
        Self::with_outbox(Arc::new(InMemoryMessageQueue::new(EVENTS_QUEUE)))
    }

    /// Creates an empty store publishing to `outbox`.
    #[must_use]
    pub fn with_outbox(outbox: Arc<InMemoryMessageQueue>) -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            outbox,
            fail_outbox: AtomicBool::new(false),
        }
    }

    /// The queue receiving published events.
    #[must_use]
    pub fn outbox(&self) -> Arc<InMemoryMessageQueue> {
        Arc::clone(&self.outbox)
    }

    /// Makes every following append fail while writing the outbox, as if the
    /// process crashed mid-transaction.
    pub fn fail_outbox_writes(&self, fail: bool) {
        self.fail_outbox.store(fail, Ordering::SeqCst);
    }

    /// All events stored for `aggregate_id`.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn stream(&self, aggregate_id: Uuid) -> Vec<StoredEvent> {
        self.streams
            .lock()
            .unwrap()
            .get(&aggregate_id)
            .cloned()
            .unwrap_or_default()
    }
}

impl Default for InMemoryEventRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventRepository for InMemoryEventRepository {
    async fn load_events(&self, aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Ok(self.stream(aggregate_id))
    }

    async fn append_events(
        &self,
        aggregate_id: Uuid,
        expected_version: i64,
        events: &[StoredEvent],
        outbox: &[Message],
    ) -> Result<(), DomainError> {
        let mut streams = self.streams.lock().unwrap();
        let stream = streams.entry(aggregate_id).or_default();
        let actual = stream.last().map_or(-1, |event| event.version);
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id,
                expected: expected_version,
                actual,
            });
        }
        ensure_contiguous(aggregate_id, expected_version, events)?;
        if self.fail_outbox.load(Ordering::SeqCst) {
            return Err(DomainError::TransportUnavailable(
                "outbox write interrupted".into(),
            ));
        }
        self.outbox.enqueue(outbox);
        stream.extend_from_slice(events);
        Ok(())
    }
}

/// An event repository that fails every call with `Infrastructure`.
#[derive(Debug)]
pub struct FailingEventRepository;

#[async_trait]
impl EventRepository for FailingEventRepository {
    async fn load_events(&self, _aggregate_id: Uuid) -> Result<Vec<StoredEvent>, DomainError> {
        Err(DomainError::Infrastructure("test failure".into()))
    }

    async fn append_events(
        &self,
        _aggregate_id: Uuid,
        _expected_version: i64,
        _events: &[StoredEvent],
        _outbox: &[Message],
    ) -> Result<(), DomainError> {
        Err(DomainError::Infrastructure("test failure".into()))
    }
}

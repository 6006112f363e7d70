//! In-memory `ProcessStateRepository`.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use conference_core::error::DomainError;
use conference_core::message::Message;
use conference_core::process_manager::{ProcessRecord, ProcessStateRepository};
use conference_core::transport::COMMANDS_QUEUE;
use uuid::Uuid;

use crate::queue::InMemoryMessageQueue;

/// Process state held in memory; dispatched commands go to an
/// [`InMemoryMessageQueue`] under the same lock as the state.
#[derive(Debug)]
pub struct InMemoryProcessRepository {
    records: Mutex<HashMap<(String, Uuid), ProcessRecord>>,
    outbox: Arc<InMemoryMessageQueue>,
}

impl InMemoryProcessRepository {
    /// Creates an empty store with its own `commands` queue.
    #[must_use]
    pub fn new() -> Self {
        Self::with_outbox(Arc::new(InMemoryMessageQueue::new(COMMANDS_QUEUE)))
    }

    /// Creates an empty store dispatching to `outbox`.
    #[must_use]
    pub fn with_outbox(outbox: Arc<InMemoryMessageQueue>) -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            outbox,
        }
    }

    /// The queue receiving dispatched commands.
    #[must_use]
    pub fn outbox(&self) -> Arc<InMemoryMessageQueue> {
        Arc::clone(&self.outbox)
    }

    /// Number of stored process records.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn len(&self) -> usize {
        self.records.lock().unwrap().len()
    }

    /// Returns true if nothing has been stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryProcessRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ProcessStateRepository for InMemoryProcessRepository {
    async fn load(
        &self,
        process_type: &str,
        id: Uuid,
    ) -> Result<Option<ProcessRecord>, DomainError> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(process_type.to_owned(), id))
            .cloned())
    }

    async fn save(
        &self,
        record: &ProcessRecord,
        expected_version: i64,
        outbox: &[Message],
    ) -> Result<(), DomainError> {
        let mut records = self.records.lock().unwrap();
        let key = (record.process_type.clone(), record.id);
        let actual = records.get(&key).map_or(-1, |stored| stored.version);
        if actual != expected_version {
            return Err(DomainError::ConcurrencyConflict {
                aggregate_id: record.id,
                expected: expected_version,
                actual,
            });
        }
        self.outbox.enqueue(outbox);
        records.insert(key, record.clone());
        Ok(())
    }
}

//! Process manager (saga) abstraction.
//!
//! A process manager is a durable, versioned state machine keyed by a
//! business correlation id. It advances one input at a time, may queue
//! outbound commands, and eventually completes. Its state and its outbound
//! commands are persisted in a single transaction, mirroring how aggregates
//! persist events.

use std::marker::PhantomData;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::clock::Clock;
use crate::command::Command;
use crate::envelope::Envelope;
use crate::error::DomainError;
use crate::message::Message;

fn unsaved() -> i64 {
    -1
}

/// Identity, version, completion flag and outbound commands shared by every
/// process manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessState<C> {
    id: Uuid,
    #[serde(skip, default = "unsaved")]
    version: i64,
    completed: bool,
    #[serde(skip, default = "Vec::new")]
    pending_commands: Vec<Envelope<C>>,
}

impl<C> ProcessState<C> {
    /// Creates the state of a process that has never been saved.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: -1,
            completed: false,
            pending_commands: Vec::new(),
        }
    }

    /// Queues a command for dispatch when the process is saved.
    pub fn emit(&mut self, envelope: Envelope<C>) {
        self.pending_commands.push(envelope);
    }

    /// Marks the workflow as having reached a terminal outcome.
    pub fn complete(&mut self) {
        self.completed = true;
    }
}

/// Outcome of handling one input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// State changed and/or commands were queued; the process must be saved.
    Advanced,
    /// The input was stale, duplicate or arrived after completion.
    Ignored,
}

/// A versioned state machine coordinating a multi-step workflow.
pub trait ProcessManager: Serialize + DeserializeOwned + Send + Sync {
    /// Type name recorded alongside the persisted state.
    const PROCESS_TYPE: &'static str;

    /// Commands this process can dispatch.
    type Command: Command + Clone;

    /// Events and commands this process reacts to.
    type Input: Send;

    /// Shared identity/version state.
    fn process(&self) -> &ProcessState<Self::Command>;

    /// Mutable access to the shared identity/version state.
    fn process_mut(&mut self) -> &mut ProcessState<Self::Command>;

    /// Advances the state machine by one input.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` when the input is invalid for the
    /// current state. A failed transition must leave the process untouched.
    fn transition(
        &mut self,
        input: Self::Input,
        clock: &dyn Clock,
    ) -> Result<Transition, DomainError>;

    /// Returns the business correlation id keying this process.
    fn id(&self) -> Uuid {
        self.process().id
    }

    /// Returns the persisted version, or -1 if never saved.
    fn version(&self) -> i64 {
        self.process().version
    }

    /// Returns true once the workflow reached a terminal outcome.
    fn is_completed(&self) -> bool {
        self.process().completed
    }

    /// Commands queued since the process was loaded or last saved.
    fn pending_commands(&self) -> &[Envelope<Self::Command>] {
        &self.process().pending_commands
    }

    /// Handles one input. Once completed, every input is ignored.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`Self::transition`].
    fn handle(&mut self, input: Self::Input, clock: &dyn Clock) -> Result<Transition, DomainError> {
        if self.is_completed() {
            debug!(
                process_type = Self::PROCESS_TYPE,
                process_id = %self.id(),
                "ignoring input for completed process"
            );
            return Ok(Transition::Ignored);
        }
        self.transition(input, clock)
    }
}

/// Stored representation of a process manager.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessRecord {
    /// Business correlation id.
    pub id: Uuid,
    /// Process type name.
    pub process_type: String,
    /// Version being written.
    pub version: i64,
    /// Terminal flag.
    pub completed: bool,
    /// Serialized process state.
    pub state: serde_json::Value,
}

/// Repository trait for process manager state.
#[async_trait]
pub trait ProcessStateRepository: Send + Sync {
    /// Loads the latest record for `(process_type, id)`.
    async fn load(
        &self,
        process_type: &str,
        id: Uuid,
    ) -> Result<Option<ProcessRecord>, DomainError>;

    /// Writes `record` if the stored version still equals `expected_version`
    /// (-1 for a process never saved) and enqueues `outbox` in the same
    /// transaction.
    async fn save(
        &self,
        record: &ProcessRecord,
        expected_version: i64,
        outbox: &[Message],
    ) -> Result<(), DomainError>;
}

/// Loads and saves process managers of type `P`.
pub struct ProcessManagerRepository<P> {
    store: Arc<dyn ProcessStateRepository>,
    clock: Arc<dyn Clock>,
    _process: PhantomData<fn() -> P>,
}

impl<P> Clone for ProcessManagerRepository<P> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            clock: Arc::clone(&self.clock),
            _process: PhantomData,
        }
    }
}

impl<P: ProcessManager> ProcessManagerRepository<P> {
    /// Creates a repository over a process state store.
    #[must_use]
    pub fn new(store: Arc<dyn ProcessStateRepository>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            clock,
            _process: PhantomData,
        }
    }

    /// Loads the process keyed by `id`, if it exists.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the stored state does not
    /// decode, and propagates store errors.
    pub async fn find(&self, id: Uuid) -> Result<Option<P>, DomainError> {
        let Some(record) = self.store.load(P::PROCESS_TYPE, id).await? else {
            return Ok(None);
        };
        let mut process: P = serde_json::from_value(record.state).map_err(|e| {
            DomainError::Serialization(format!("{} {id}: {e}", P::PROCESS_TYPE))
        })?;
        let state = process.process_mut();
        state.version = record.version;
        state.completed = record.completed;
        Ok(Some(process))
    }

    /// Like [`Self::find`], for callers that assume the process exists.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::AggregateNotFound` if nothing is stored for
    /// `id`, plus everything [`Self::find`] returns.
    pub async fn get(&self, id: Uuid) -> Result<P, DomainError> {
        self.find(id)
            .await?
            .ok_or(DomainError::AggregateNotFound(id))
    }

    /// Persists the process and dispatches its queued commands atomically.
    ///
    /// Commands without their own correlation id inherit `correlation_id`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if another handler saved
    /// the same process first, and propagates store and serialization errors.
    #[instrument(
        skip(self, process),
        fields(process_type = P::PROCESS_TYPE, process_id = %process.id())
    )]
    pub async fn save(&self, process: &mut P, correlation_id: Option<&str>) -> Result<(), DomainError> {
        let expected_version = process.version();
        let record = ProcessRecord {
            id: process.id(),
            process_type: P::PROCESS_TYPE.to_owned(),
            version: expected_version + 1,
            completed: process.is_completed(),
            state: serde_json::to_value(&*process)?,
        };
        let outbox = process
            .pending_commands()
            .iter()
            .map(|envelope| match (envelope.correlation_id(), correlation_id) {
                (None, Some(correlation_id)) => envelope
                    .clone()
                    .with_correlation_id(correlation_id)
                    .to_message(self.clock.as_ref()),
                _ => envelope.to_message(self.clock.as_ref()),
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.store.save(&record, expected_version, &outbox).await?;

        debug!(
            version = record.version,
            commands = outbox.len(),
            completed = record.completed,
            "saved process state"
        );
        let state = process.process_mut();
        state.version = record.version;
        state.pending_commands.clear();
        Ok(())
    }
}

//! Event-sourced aggregate abstraction.
//!
//! Aggregate state is a pure fold over the aggregate's own event history. The
//! aggregate never touches storage: it replays what it is given and records
//! what it produces.

use uuid::Uuid;

use crate::clock::Clock;
use crate::error::DomainError;
use crate::event::{DomainEvent, VersionedEvent};

/// Identity, version and uncommitted events shared by every aggregate.
#[derive(Debug, Clone)]
pub struct AggregateState<E> {
    id: Uuid,
    version: i64,
    pending_events: Vec<VersionedEvent<E>>,
}

impl<E> AggregateState<E> {
    /// Creates the state of an aggregate with no history.
    #[must_use]
    pub fn new(id: Uuid) -> Self {
        Self {
            id,
            version: -1,
            pending_events: Vec::new(),
        }
    }

    /// Returns the aggregate identifier.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Returns the version of the last applied event, or -1.
    pub fn version(&self) -> i64 {
        self.version
    }
}

/// Trait for aggregate roots that reconstitute from event history.
///
/// `mutate` is the handler registry: an exhaustive `match` over
/// [`Self::Event`] with exactly one arm per variant.
pub trait EventSourced: Send + Sync + Sized {
    /// The closed set of events this aggregate produces and consumes.
    type Event: DomainEvent;

    /// Type name recorded alongside every stored event.
    const AGGREGATE_TYPE: &'static str;

    /// Creates a blank aggregate ready for replay.
    fn from_id(id: Uuid) -> Self;

    /// Shared identity/version state.
    fn state(&self) -> &AggregateState<Self::Event>;

    /// Mutable access to the shared identity/version state.
    fn state_mut(&mut self) -> &mut AggregateState<Self::Event>;

    /// Applies one event to the aggregate's own fields.
    fn mutate(&mut self, event: &Self::Event);

    /// Returns the aggregate identifier.
    fn id(&self) -> Uuid {
        self.state().id
    }

    /// Returns the current version.
    fn version(&self) -> i64 {
        self.state().version
    }

    /// Events produced since the aggregate was loaded or last saved.
    fn pending_events(&self) -> &[VersionedEvent<Self::Event>] {
        &self.state().pending_events
    }

    /// Clears pending events after persistence.
    fn clear_pending_events(&mut self) {
        self.state_mut().pending_events.clear();
    }

    /// Replays history. Never records pending events.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Infrastructure` if an event belongs to another
    /// aggregate or its version does not follow the current one.
    fn load_from(
        &mut self,
        past_events: impl IntoIterator<Item = VersionedEvent<Self::Event>>,
    ) -> Result<(), DomainError> {
        for event in past_events {
            let expected = self.version() + 1;
            if event.source_id != self.id() || event.version != expected {
                return Err(DomainError::Infrastructure(format!(
                    "non-contiguous stream for {} {}: expected version {expected}, got {} from {}",
                    Self::AGGREGATE_TYPE,
                    self.id(),
                    event.version,
                    event.source_id,
                )));
            }
            self.mutate(&event.kind);
            self.state_mut().version = event.version;
        }
        Ok(())
    }

    /// Records a new business event: stamps it with the next version,
    /// applies it immediately and queues it for persistence.
    fn update(&mut self, kind: Self::Event, clock: &dyn Clock) {
        let event = VersionedEvent {
            event_id: Uuid::new_v4(),
            source_id: self.id(),
            version: self.version() + 1,
            occurred_at: clock.now(),
            kind,
        };
        self.mutate(&event.kind);
        let state = self.state_mut();
        state.version = event.version;
        state.pending_events.push(event);
    }
}

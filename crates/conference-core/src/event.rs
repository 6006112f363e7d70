//! Domain event abstractions.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;
use crate::serialization::Payload;

/// Trait implemented by the closed set of event variants an aggregate
/// can apply.
///
/// The implementing type is normally an enum; `EVENT_TYPES` lists the tag of
/// every variant and is the only vocabulary the aggregate accepts on replay.
pub trait DomainEvent: Serialize + DeserializeOwned + Clone + Send + Sync + fmt::Debug {
    /// Tags of every variant, used to detect stored events with no handler.
    const EVENT_TYPES: &'static [&'static str];

    /// Returns the event type name (used for serialization routing).
    fn event_type(&self) -> &'static str;

    /// Returns true if `event_type` names one of this enum's variants.
    fn handles(event_type: &str) -> bool {
        Self::EVENT_TYPES.contains(&event_type)
    }

    /// Serializes the event payload to JSON.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the payload cannot be encoded.
    fn to_payload(&self) -> Result<serde_json::Value, DomainError> {
        Ok(serde_json::to_value(self)?)
    }

    /// Deserializes a payload previously produced by [`Self::to_payload`].
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the payload is malformed.
    fn from_payload(payload: serde_json::Value) -> Result<Self, DomainError> {
        Ok(serde_json::from_value(payload)?)
    }
}

/// An event stamped with its position in the source aggregate's stream.
///
/// Immutable once created: the version is assigned when the mutation happens
/// and never rewritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VersionedEvent<E> {
    /// Unique event identifier.
    pub event_id: Uuid,
    /// Aggregate this event belongs to.
    pub source_id: Uuid,
    /// Position within the aggregate stream, starting at 0.
    pub version: i64,
    /// Timestamp of event creation.
    pub occurred_at: DateTime<Utc>,
    /// Event-specific payload.
    pub kind: E,
}

impl<E: DomainEvent> VersionedEvent<E> {
    /// Returns the event type tag of the payload.
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }
}

impl<E: DomainEvent> Payload for VersionedEvent<E> {
    fn payload_type(&self) -> &'static str {
        self.kind.event_type()
    }

    fn payload_id(&self) -> Option<Uuid> {
        Some(self.event_id)
    }
}

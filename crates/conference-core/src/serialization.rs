//! Polymorphic payload serialization.
//!
//! Every body crossing the transport is written as an explicit
//! `{"type": <tag>, "payload": <json>}` pair. Consumers decode through a
//! [`PayloadRegistry`] that maps tags to typed decoders, so a body can be
//! turned back into its concrete command or event type without knowing in
//! advance which type to expect.

use std::collections::HashMap;
use std::fmt;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// A body that can travel over the transport.
pub trait Payload: Serialize + Send + Sync {
    /// Stable type tag written next to the serialized body.
    fn payload_type(&self) -> &'static str;

    /// Identifier used as the message id when the envelope carries none.
    fn payload_id(&self) -> Option<Uuid> {
        None
    }
}

/// The wire form of a transported body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaggedPayload {
    /// Type tag identifying the concrete payload.
    #[serde(rename = "type")]
    pub type_tag: String,
    /// The serialized payload.
    pub payload: serde_json::Value,
}

impl TaggedPayload {
    /// Wraps a payload with its type tag.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the payload cannot be
    /// represented as JSON.
    pub fn from_payload<T: Payload + ?Sized>(body: &T) -> Result<Self, DomainError> {
        Ok(Self {
            type_tag: body.payload_type().to_owned(),
            payload: serde_json::to_value(body)?,
        })
    }

    /// Encodes to the text stored in a message row.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if encoding fails.
    pub fn encode(&self) -> Result<String, DomainError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes the text stored in a message row.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the text is not a tagged
    /// payload.
    pub fn decode(text: &str) -> Result<Self, DomainError> {
        Ok(serde_json::from_str(text)?)
    }
}

type Decoder<M> = Box<dyn Fn(serde_json::Value) -> Result<M, serde_json::Error> + Send + Sync>;

/// Maps type tags to decoders producing a consumer-side type `M`.
pub struct PayloadRegistry<M> {
    decoders: HashMap<&'static str, Decoder<M>>,
}

impl<M> PayloadRegistry<M> {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    /// Registers `T` as the concrete type behind `type_tag`.
    ///
    /// # Panics
    ///
    /// Panics if `type_tag` is already registered; that is a wiring defect.
    #[must_use]
    pub fn with<T>(mut self, type_tag: &'static str) -> Self
    where
        T: DeserializeOwned + Into<M> + 'static,
    {
        let previous = self.decoders.insert(
            type_tag,
            Box::new(|value| serde_json::from_value::<T>(value).map(Into::into)),
        );
        assert!(
            previous.is_none(),
            "payload type {type_tag} registered twice"
        );
        self
    }

    /// Returns true if a decoder is registered for `type_tag`.
    #[must_use]
    pub fn contains(&self, type_tag: &str) -> bool {
        self.decoders.contains_key(type_tag)
    }

    /// Decodes a tagged payload into `M`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` if the tag is unknown or the
    /// payload does not match the registered type.
    pub fn decode(&self, tagged: &TaggedPayload) -> Result<M, DomainError> {
        let decoder = self.decoders.get(tagged.type_tag.as_str()).ok_or_else(|| {
            DomainError::Serialization(format!("unknown payload type {}", tagged.type_tag))
        })?;
        decoder(tagged.payload.clone()).map_err(|e| {
            DomainError::Serialization(format!("malformed {} payload: {e}", tagged.type_tag))
        })
    }

    /// Decodes message text straight into `M`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Serialization` on malformed text, unknown tag or
    /// mismatched payload.
    pub fn decode_str(&self, text: &str) -> Result<M, DomainError> {
        self.decode(&TaggedPayload::decode(text)?)
    }
}

impl<M> Default for PayloadRegistry<M> {
    fn default() -> Self {
        Self::new()
    }
}

impl<M> fmt::Debug for PayloadRegistry<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<_> = self.decoders.keys().collect();
        tags.sort();
        f.debug_struct("PayloadRegistry").field("types", &tags).finish()
    }
}

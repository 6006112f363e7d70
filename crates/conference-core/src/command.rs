//! Command abstractions.

use uuid::Uuid;

use crate::serialization::Payload;

/// Trait that all commands implement.
///
/// The command type used for routing is the [`Payload::payload_type`] tag.
pub trait Command: Payload + std::fmt::Debug {
    /// Unique command identifier, used by consumers as an idempotency key.
    fn command_id(&self) -> Uuid;
}

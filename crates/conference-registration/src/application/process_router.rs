//! Feeds events and expiration commands into the registration process.
//!
//! The router decodes the message, finds the process it belongs to, runs
//! the transition and saves. Saving stores the new state and dispatches the
//! process's commands together; a conflict with a concurrent save fails the
//! message so it is redelivered against the fresh state.

use std::sync::Arc;

use async_trait::async_trait;
use conference_core::clock::Clock;
use conference_core::error::DomainError;
use conference_core::event::VersionedEvent;
use conference_core::message::ReceivedMessage;
use conference_core::process_manager::{ProcessManager, ProcessManagerRepository, Transition};
use conference_core::serialization::PayloadRegistry;
use conference_core::transport::MessageHandler;
use conference_payments::domain::events::{
    PAYMENT_COMPLETED_EVENT_TYPE, PAYMENT_REJECTED_EVENT_TYPE, PaymentEvent,
};
use tracing::{debug, instrument, warn};

use crate::domain::commands::{EXPIRE_REGISTRATION_PROCESS_COMMAND_TYPE, ExpireRegistrationProcess};
use crate::domain::events::{
    ORDER_PLACED_EVENT_TYPE, OrderEvent, SEATS_RESERVED_EVENT_TYPE, SeatsAvailabilityEvent,
};
use crate::domain::process::{RegistrationInput, RegistrationProcessManager};

/// Repository type for registration processes.
pub type RegistrationProcessRepository = ProcessManagerRepository<RegistrationProcessManager>;

/// Event type tags routed to the registration process.
pub const ROUTED_EVENT_TYPES: &[&str] = &[
    ORDER_PLACED_EVENT_TYPE,
    SEATS_RESERVED_EVENT_TYPE,
    PAYMENT_COMPLETED_EVENT_TYPE,
    PAYMENT_REJECTED_EVENT_TYPE,
];

/// Command type tags routed to the registration process.
pub const ROUTED_COMMAND_TYPES: &[&str] = &[EXPIRE_REGISTRATION_PROCESS_COMMAND_TYPE];

/// Everything the router decodes.
#[derive(Debug, Clone)]
pub enum RegistrationMessage {
    /// An order event.
    Order(VersionedEvent<OrderEvent>),
    /// A seat availability event.
    Seats(VersionedEvent<SeatsAvailabilityEvent>),
    /// A payment event.
    Payment(VersionedEvent<PaymentEvent>),
    /// The scheduled expiration.
    Expire(ExpireRegistrationProcess),
}

impl From<VersionedEvent<OrderEvent>> for RegistrationMessage {
    fn from(event: VersionedEvent<OrderEvent>) -> Self {
        Self::Order(event)
    }
}

impl From<VersionedEvent<SeatsAvailabilityEvent>> for RegistrationMessage {
    fn from(event: VersionedEvent<SeatsAvailabilityEvent>) -> Self {
        Self::Seats(event)
    }
}

impl From<VersionedEvent<PaymentEvent>> for RegistrationMessage {
    fn from(event: VersionedEvent<PaymentEvent>) -> Self {
        Self::Payment(event)
    }
}

impl From<ExpireRegistrationProcess> for RegistrationMessage {
    fn from(command: ExpireRegistrationProcess) -> Self {
        Self::Expire(command)
    }
}

impl RegistrationMessage {
    /// The process input carried by this message, if the process cares.
    fn into_input(self) -> Option<RegistrationInput> {
        match self {
            Self::Order(event) => match event.kind {
                OrderEvent::OrderPlaced(e) => Some(RegistrationInput::OrderPlaced(e)),
                _ => None,
            },
            Self::Seats(event) => match event.kind {
                SeatsAvailabilityEvent::SeatsReserved(e) => {
                    Some(RegistrationInput::SeatsReserved(e))
                }
                _ => None,
            },
            Self::Payment(event) => match event.kind {
                PaymentEvent::PaymentCompleted(e) => Some(RegistrationInput::PaymentCompleted(e)),
                PaymentEvent::PaymentRejected(e) => Some(RegistrationInput::PaymentRejected(e)),
                PaymentEvent::PaymentInitiated(_) => None,
            },
            Self::Expire(command) => Some(RegistrationInput::Expire(command)),
        }
    }
}

/// Routes messages to [`RegistrationProcessManager`] instances.
pub struct RegistrationProcessRouter {
    processes: RegistrationProcessRepository,
    clock: Arc<dyn Clock>,
    registry: PayloadRegistry<RegistrationMessage>,
}

impl RegistrationProcessRouter {
    /// Creates a router over the process repository.
    #[must_use]
    pub fn new(processes: RegistrationProcessRepository, clock: Arc<dyn Clock>) -> Self {
        let registry = PayloadRegistry::new()
            .with::<VersionedEvent<OrderEvent>>(ORDER_PLACED_EVENT_TYPE)
            .with::<VersionedEvent<SeatsAvailabilityEvent>>(SEATS_RESERVED_EVENT_TYPE)
            .with::<VersionedEvent<PaymentEvent>>(PAYMENT_COMPLETED_EVENT_TYPE)
            .with::<VersionedEvent<PaymentEvent>>(PAYMENT_REJECTED_EVENT_TYPE)
            .with::<ExpireRegistrationProcess>(EXPIRE_REGISTRATION_PROCESS_COMMAND_TYPE);
        Self {
            processes,
            clock,
            registry,
        }
    }

    /// Runs one input through the process it belongs to.
    ///
    /// Only `OrderPlaced` starts a process. Any other input for a process
    /// that does not exist is dropped.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ConcurrencyConflict` if another handler saved
    /// the process first, and propagates store and transition errors.
    #[instrument(skip(self, input), fields(process_id = %input.process_id()))]
    pub async fn route(
        &self,
        input: RegistrationInput,
        correlation_id: Option<&str>,
    ) -> Result<Transition, DomainError> {
        let process_id = input.process_id();
        let mut process = match self.processes.find(process_id).await? {
            Some(process) => process,
            None if matches!(input, RegistrationInput::OrderPlaced(_)) => {
                RegistrationProcessManager::new(process_id)
            }
            None => {
                warn!("no registration process for input");
                return Ok(Transition::Ignored);
            }
        };

        let transition = process.handle(input, self.clock.as_ref())?;
        if transition == Transition::Advanced {
            self.processes.save(&mut process, correlation_id).await?;
            debug!(state = ?process.state(), version = process.version(), "registration advanced");
        }
        Ok(transition)
    }
}

#[async_trait]
impl MessageHandler for RegistrationProcessRouter {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), DomainError> {
        let decoded = self.registry.decode_str(&message.message.body)?;
        let Some(input) = decoded.into_input() else {
            return Ok(());
        };
        self.route(input, message.message.correlation_id.as_deref())
            .await
            .map(|_| ())
    }
}

//! Transport adapter feeding payment commands from the `commands` queue into
//! the command handlers.

use std::sync::Arc;

use async_trait::async_trait;
use conference_core::clock::Clock;
use conference_core::error::DomainError;
use conference_core::message::ReceivedMessage;
use conference_core::serialization::PayloadRegistry;
use conference_core::transport::MessageHandler;
use tracing::warn;

use super::command_handlers::{
    PaymentRepository, handle_cancel_payment, handle_complete_payment, handle_initiate_payment,
};
use crate::domain::commands::{
    CANCEL_PAYMENT_COMMAND_TYPE, COMPLETE_PAYMENT_COMMAND_TYPE, CancelThirdPartyProcessorPayment,
    CompleteThirdPartyProcessorPayment, INITIATE_PAYMENT_COMMAND_TYPE,
    InitiateThirdPartyProcessorPayment,
};

/// Command type tags handled by [`PaymentCommandHandler`].
pub const PAYMENT_COMMAND_TYPES: &[&str] = &[
    INITIATE_PAYMENT_COMMAND_TYPE,
    COMPLETE_PAYMENT_COMMAND_TYPE,
    CANCEL_PAYMENT_COMMAND_TYPE,
];

/// Every command the Payments context accepts.
#[derive(Debug, Clone)]
pub enum PaymentCommand {
    /// Start a payment.
    Initiate(InitiateThirdPartyProcessorPayment),
    /// Complete a payment.
    Complete(CompleteThirdPartyProcessorPayment),
    /// Cancel a payment.
    Cancel(CancelThirdPartyProcessorPayment),
}

impl From<InitiateThirdPartyProcessorPayment> for PaymentCommand {
    fn from(command: InitiateThirdPartyProcessorPayment) -> Self {
        Self::Initiate(command)
    }
}

impl From<CompleteThirdPartyProcessorPayment> for PaymentCommand {
    fn from(command: CompleteThirdPartyProcessorPayment) -> Self {
        Self::Complete(command)
    }
}

impl From<CancelThirdPartyProcessorPayment> for PaymentCommand {
    fn from(command: CancelThirdPartyProcessorPayment) -> Self {
        Self::Cancel(command)
    }
}

/// Decodes payment commands and runs them.
///
/// A command rejected by the domain (`Validation`) is logged and
/// acknowledged: redelivering it would be rejected again.
pub struct PaymentCommandHandler {
    payments: PaymentRepository,
    clock: Arc<dyn Clock>,
    registry: PayloadRegistry<PaymentCommand>,
}

impl PaymentCommandHandler {
    /// Creates a handler over the payment repository.
    #[must_use]
    pub fn new(payments: PaymentRepository, clock: Arc<dyn Clock>) -> Self {
        let registry = PayloadRegistry::new()
            .with::<InitiateThirdPartyProcessorPayment>(INITIATE_PAYMENT_COMMAND_TYPE)
            .with::<CompleteThirdPartyProcessorPayment>(COMPLETE_PAYMENT_COMMAND_TYPE)
            .with::<CancelThirdPartyProcessorPayment>(CANCEL_PAYMENT_COMMAND_TYPE);
        Self {
            payments,
            clock,
            registry,
        }
    }
}

#[async_trait]
impl MessageHandler for PaymentCommandHandler {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), DomainError> {
        let command = self.registry.decode_str(&message.message.body)?;
        let correlation_id = message.message.correlation_id.as_deref();
        let clock = self.clock.as_ref();

        let result = match &command {
            PaymentCommand::Initiate(c) => {
                handle_initiate_payment(c, correlation_id, clock, &self.payments).await
            }
            PaymentCommand::Complete(c) => {
                handle_complete_payment(c, correlation_id, clock, &self.payments).await
            }
            PaymentCommand::Cancel(c) => {
                handle_cancel_payment(c, correlation_id, clock, &self.payments).await
            }
        };

        match result {
            Ok(_) => Ok(()),
            Err(DomainError::Validation(reason)) => {
                warn!(?command, %reason, "payment command rejected");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

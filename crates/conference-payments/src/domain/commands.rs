//! Commands for the Payments context.

use conference_core::command::Command;
use conference_core::serialization::Payload;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::PaymentItem;

/// Command type tag for `InitiateThirdPartyProcessorPayment`.
pub const INITIATE_PAYMENT_COMMAND_TYPE: &str = "payments.initiate_third_party_processor_payment";
/// Command type tag for `CompleteThirdPartyProcessorPayment`.
pub const COMPLETE_PAYMENT_COMMAND_TYPE: &str = "payments.complete_third_party_processor_payment";
/// Command type tag for `CancelThirdPartyProcessorPayment`.
pub const CANCEL_PAYMENT_COMMAND_TYPE: &str = "payments.cancel_third_party_processor_payment";

/// Command to start a payment with the external processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitiateThirdPartyProcessorPayment {
    /// The command identifier.
    pub id: Uuid,
    /// The payment to create.
    pub payment_id: Uuid,
    /// The order being paid for.
    pub payment_source_id: Uuid,
    /// The conference the order belongs to.
    pub conference_id: Uuid,
    /// Description shown by the processor.
    pub description: String,
    /// Total in minor currency units.
    pub total_amount: u64,
    /// The lines making up the total.
    pub items: Vec<PaymentItem>,
}

/// Command recording that the processor accepted the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompleteThirdPartyProcessorPayment {
    /// The command identifier.
    pub id: Uuid,
    /// The payment identifier.
    pub payment_id: Uuid,
}

/// Command recording that the payment was abandoned or refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelThirdPartyProcessorPayment {
    /// The command identifier.
    pub id: Uuid,
    /// The payment identifier.
    pub payment_id: Uuid,
}

impl Payload for InitiateThirdPartyProcessorPayment {
    fn payload_type(&self) -> &'static str {
        INITIATE_PAYMENT_COMMAND_TYPE
    }

    fn payload_id(&self) -> Option<Uuid> {
        Some(self.id)
    }
}

impl Command for InitiateThirdPartyProcessorPayment {
    fn command_id(&self) -> Uuid {
        self.id
    }
}

impl Payload for CompleteThirdPartyProcessorPayment {
    fn payload_type(&self) -> &'static str {
        COMPLETE_PAYMENT_COMMAND_TYPE
    }

    fn payload_id(&self) -> Option<Uuid> {
        Some(self.id)
    }
}

impl Command for CompleteThirdPartyProcessorPayment {
    fn command_id(&self) -> Uuid {
        self.id
    }
}

impl Payload for CancelThirdPartyProcessorPayment {
    fn payload_type(&self) -> &'static str {
        CANCEL_PAYMENT_COMMAND_TYPE
    }

    fn payload_id(&self) -> Option<Uuid> {
        Some(self.id)
    }
}

impl Command for CancelThirdPartyProcessorPayment {
    fn command_id(&self) -> Uuid {
        self.id
    }
}

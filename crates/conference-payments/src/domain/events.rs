//! Domain events for the Payments context.

use conference_core::event::DomainEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type tag for `PaymentInitiated`.
pub const PAYMENT_INITIATED_EVENT_TYPE: &str = "payments.payment_initiated";
/// Event type tag for `PaymentCompleted`.
pub const PAYMENT_COMPLETED_EVENT_TYPE: &str = "payments.payment_completed";
/// Event type tag for `PaymentRejected`.
pub const PAYMENT_REJECTED_EVENT_TYPE: &str = "payments.payment_rejected";

/// One line of a payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentItem {
    /// Item identifier.
    pub id: Uuid,
    /// What is being paid for.
    pub description: String,
    /// Amount in minor currency units.
    pub amount: u64,
}

/// Emitted when a payment is started with the external processor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentInitiated {
    /// The payment identifier.
    pub payment_id: Uuid,
    /// The business entity being paid for (an order).
    pub payment_source_id: Uuid,
    /// Human-readable description shown by the processor.
    pub description: String,
    /// Total in minor currency units.
    pub total_amount: u64,
    /// The lines making up the total.
    pub items: Vec<PaymentItem>,
}

/// Emitted when the processor confirms the payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentCompleted {
    /// The payment identifier.
    pub payment_id: Uuid,
    /// The business entity that was paid for.
    pub payment_source_id: Uuid,
}

/// Emitted when the payment is cancelled or refused.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRejected {
    /// The payment identifier.
    pub payment_id: Uuid,
    /// The business entity that was not paid for.
    pub payment_source_id: Uuid,
}

/// Event payload variants for the Payments context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentEvent {
    /// A payment was initiated.
    PaymentInitiated(PaymentInitiated),
    /// A payment was completed.
    PaymentCompleted(PaymentCompleted),
    /// A payment was rejected.
    PaymentRejected(PaymentRejected),
}

impl DomainEvent for PaymentEvent {
    const EVENT_TYPES: &'static [&'static str] = &[
        PAYMENT_INITIATED_EVENT_TYPE,
        PAYMENT_COMPLETED_EVENT_TYPE,
        PAYMENT_REJECTED_EVENT_TYPE,
    ];

    fn event_type(&self) -> &'static str {
        match self {
            Self::PaymentInitiated(_) => PAYMENT_INITIATED_EVENT_TYPE,
            Self::PaymentCompleted(_) => PAYMENT_COMPLETED_EVENT_TYPE,
            Self::PaymentRejected(_) => PAYMENT_REJECTED_EVENT_TYPE,
        }
    }
}

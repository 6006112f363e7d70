//! Aggregate roots for the Payments context.

use conference_core::aggregate::{AggregateState, EventSourced};
use conference_core::clock::Clock;
use conference_core::error::DomainError;
use uuid::Uuid;

use super::events::{
    PaymentCompleted, PaymentEvent, PaymentInitiated, PaymentItem, PaymentRejected,
};

/// Lifecycle of a third-party payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentState {
    /// Created, waiting for the processor's verdict.
    Initiated,
    /// The processor accepted the payment.
    Completed,
    /// The payment was cancelled or refused.
    Cancelled,
}

/// A payment taken through an external processor.
#[derive(Debug)]
pub struct ThirdPartyProcessorPayment {
    state: AggregateState<PaymentEvent>,
    payment_state: PaymentState,
    payment_source_id: Uuid,
    description: String,
    total_amount: u64,
    items: Vec<PaymentItem>,
}

impl ThirdPartyProcessorPayment {
    /// Creates a payment, producing a `PaymentInitiated` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if there are no items or they do
    /// not add up to `total_amount`.
    pub fn initiate(
        id: Uuid,
        payment_source_id: Uuid,
        description: impl Into<String>,
        total_amount: u64,
        items: Vec<PaymentItem>,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        if items.is_empty() {
            return Err(DomainError::Validation(
                "a payment needs at least one item".into(),
            ));
        }
        let sum = items.iter().map(|item| item.amount).sum::<u64>();
        if sum != total_amount {
            return Err(DomainError::Validation(format!(
                "items add up to {sum}, expected total {total_amount}"
            )));
        }

        let mut payment = Self::from_id(id);
        payment.update(
            PaymentEvent::PaymentInitiated(PaymentInitiated {
                payment_id: id,
                payment_source_id,
                description: description.into(),
                total_amount,
                items,
            }),
            clock,
        );
        Ok(payment)
    }

    /// Marks the payment as accepted, producing a `PaymentCompleted` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` unless the payment is `Initiated`.
    pub fn complete(&mut self, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_initiated("complete")?;
        self.update(
            PaymentEvent::PaymentCompleted(PaymentCompleted {
                payment_id: self.id(),
                payment_source_id: self.payment_source_id,
            }),
            clock,
        );
        Ok(())
    }

    /// Marks the payment as refused, producing a `PaymentRejected` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` unless the payment is `Initiated`.
    pub fn cancel(&mut self, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_initiated("cancel")?;
        self.update(
            PaymentEvent::PaymentRejected(PaymentRejected {
                payment_id: self.id(),
                payment_source_id: self.payment_source_id,
            }),
            clock,
        );
        Ok(())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn payment_state(&self) -> PaymentState {
        self.payment_state
    }

    /// The order this payment is for.
    #[must_use]
    pub fn payment_source_id(&self) -> Uuid {
        self.payment_source_id
    }

    /// Description shown by the processor.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Total in minor currency units.
    #[must_use]
    pub fn total_amount(&self) -> u64 {
        self.total_amount
    }

    /// The lines making up the total.
    #[must_use]
    pub fn items(&self) -> &[PaymentItem] {
        &self.items
    }

    fn ensure_initiated(&self, operation: &str) -> Result<(), DomainError> {
        if self.payment_state == PaymentState::Initiated {
            Ok(())
        } else {
            Err(DomainError::Validation(format!(
                "cannot {operation} payment {} in state {:?}",
                self.id(),
                self.payment_state
            )))
        }
    }
}

impl EventSourced for ThirdPartyProcessorPayment {
    type Event = PaymentEvent;
    const AGGREGATE_TYPE: &'static str = "third_party_processor_payment";

    fn from_id(id: Uuid) -> Self {
        Self {
            state: AggregateState::new(id),
            payment_state: PaymentState::Initiated,
            payment_source_id: Uuid::nil(),
            description: String::new(),
            total_amount: 0,
            items: Vec::new(),
        }
    }

    fn state(&self) -> &AggregateState<PaymentEvent> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AggregateState<PaymentEvent> {
        &mut self.state
    }

    fn mutate(&mut self, event: &PaymentEvent) {
        match event {
            PaymentEvent::PaymentInitiated(e) => {
                self.payment_state = PaymentState::Initiated;
                self.payment_source_id = e.payment_source_id;
                self.description.clone_from(&e.description);
                self.total_amount = e.total_amount;
                self.items.clone_from(&e.items);
            }
            PaymentEvent::PaymentCompleted(_) => self.payment_state = PaymentState::Completed,
            PaymentEvent::PaymentRejected(_) => self.payment_state = PaymentState::Cancelled,
        }
    }
}

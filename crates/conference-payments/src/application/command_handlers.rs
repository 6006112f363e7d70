//! Command handlers for the Payments context.
//!
//! Each handler loads the payment, runs the domain operation and saves it;
//! saving writes the events and queues them for publication atomically.

use conference_core::aggregate::EventSourced;
use conference_core::clock::Clock;
use conference_core::error::DomainError;
use conference_core::repository::EventSourcedRepository;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::aggregates::ThirdPartyProcessorPayment;
use crate::domain::commands::{
    CancelThirdPartyProcessorPayment, CompleteThirdPartyProcessorPayment,
    InitiateThirdPartyProcessorPayment,
};

/// Repository type used by every payment handler.
pub type PaymentRepository = EventSourcedRepository<ThirdPartyProcessorPayment>;

/// Result of a successfully handled command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentCommandResult {
    /// The payment affected by the command.
    pub payment_id: Uuid,
    /// The payment's version after the command.
    pub version: i64,
}

/// Handles `InitiateThirdPartyProcessorPayment`. A payment that already
/// exists is left as it is, so redelivered commands are harmless.
///
/// # Errors
///
/// Returns `DomainError::Validation` if the items do not match the total,
/// and propagates repository errors.
#[instrument(skip(command, clock, repo), fields(payment_id = %command.payment_id))]
pub async fn handle_initiate_payment(
    command: &InitiateThirdPartyProcessorPayment,
    correlation_id: Option<&str>,
    clock: &dyn Clock,
    repo: &PaymentRepository,
) -> Result<PaymentCommandResult, DomainError> {
    if let Some(existing) = repo.find(command.payment_id).await? {
        debug!("payment already initiated");
        return Ok(PaymentCommandResult {
            payment_id: command.payment_id,
            version: existing.version(),
        });
    }

    let mut payment = ThirdPartyProcessorPayment::initiate(
        command.payment_id,
        command.payment_source_id,
        command.description.clone(),
        command.total_amount,
        command.items.clone(),
        clock,
    )?;
    repo.save(&mut payment, correlation_id).await?;

    Ok(PaymentCommandResult {
        payment_id: command.payment_id,
        version: payment.version(),
    })
}

/// Handles `CompleteThirdPartyProcessorPayment`.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown payment,
/// `DomainError::Validation` if it is not awaiting completion, and propagates
/// repository errors.
#[instrument(skip(command, clock, repo), fields(payment_id = %command.payment_id))]
pub async fn handle_complete_payment(
    command: &CompleteThirdPartyProcessorPayment,
    correlation_id: Option<&str>,
    clock: &dyn Clock,
    repo: &PaymentRepository,
) -> Result<PaymentCommandResult, DomainError> {
    let mut payment = repo.get(command.payment_id).await?;
    payment.complete(clock)?;
    repo.save(&mut payment, correlation_id).await?;

    Ok(PaymentCommandResult {
        payment_id: command.payment_id,
        version: payment.version(),
    })
}

/// Handles `CancelThirdPartyProcessorPayment`.
///
/// # Errors
///
/// As [`handle_complete_payment`].
#[instrument(skip(command, clock, repo), fields(payment_id = %command.payment_id))]
pub async fn handle_cancel_payment(
    command: &CancelThirdPartyProcessorPayment,
    correlation_id: Option<&str>,
    clock: &dyn Clock,
    repo: &PaymentRepository,
) -> Result<PaymentCommandResult, DomainError> {
    let mut payment = repo.get(command.payment_id).await?;
    payment.cancel(clock)?;
    repo.save(&mut payment, correlation_id).await?;

    Ok(PaymentCommandResult {
        payment_id: command.payment_id,
        version: payment.version(),
    })
}

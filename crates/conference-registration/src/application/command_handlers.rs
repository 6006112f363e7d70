//! Command handlers for the Registration context.
//!
//! Order handlers and seat availability handlers follow the same shape:
//! load the aggregate, run the domain operation, save. Saving writes the
//! events and queues them for publication in one step.

use chrono::TimeDelta;
use conference_core::aggregate::EventSourced;
use conference_core::clock::Clock;
use conference_core::error::DomainError;
use conference_core::repository::EventSourcedRepository;
use tracing::{debug, instrument};
use uuid::Uuid;

use crate::domain::aggregates::{Order, SeatsAvailability};
use crate::domain::commands::{
    AddSeats, CancelSeatReservation, CommitSeatReservation, ConfirmOrder, MakeSeatReservation,
    MarkSeatsAsReserved, PlaceOrder, RejectOrder,
};

/// Repository type used by every order handler.
pub type OrderRepository = EventSourcedRepository<Order>;

/// Repository type used by every seat availability handler.
pub type SeatsAvailabilityRepository = EventSourcedRepository<SeatsAvailability>;

/// Result of a successfully handled command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationCommandResult {
    /// The aggregate affected by the command.
    pub aggregate_id: Uuid,
    /// The aggregate's version after the command.
    pub version: i64,
}

impl RegistrationCommandResult {
    fn of<T: EventSourced>(aggregate: &T) -> Self {
        Self {
            aggregate_id: aggregate.id(),
            version: aggregate.version(),
        }
    }
}

/// Handles `PlaceOrder`. The reservation expires `reservation_window` after
/// the order is placed. An order that already exists is left as it is.
///
/// # Errors
///
/// Returns `DomainError::Validation` for an order with no seats, and
/// propagates repository errors.
#[instrument(skip(command, clock, repo), fields(order_id = %command.order_id))]
pub async fn handle_place_order(
    command: &PlaceOrder,
    reservation_window: TimeDelta,
    correlation_id: Option<&str>,
    clock: &dyn Clock,
    repo: &OrderRepository,
) -> Result<RegistrationCommandResult, DomainError> {
    if let Some(existing) = repo.find(command.order_id).await? {
        debug!("order already placed");
        return Ok(RegistrationCommandResult::of(&existing));
    }

    let mut order = Order::place(
        command.order_id,
        command.conference_id,
        command.lines.clone(),
        clock.after(reservation_window),
        clock,
    )?;
    repo.save(&mut order, correlation_id).await?;
    Ok(RegistrationCommandResult::of(&order))
}

/// Handles `MarkSeatsAsReserved`.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown order,
/// `DomainError::Validation` once the order is closed, and propagates
/// repository errors.
#[instrument(skip(command, clock, repo), fields(order_id = %command.order_id))]
pub async fn handle_mark_seats_as_reserved(
    command: &MarkSeatsAsReserved,
    correlation_id: Option<&str>,
    clock: &dyn Clock,
    repo: &OrderRepository,
) -> Result<RegistrationCommandResult, DomainError> {
    let mut order = repo.get(command.order_id).await?;
    order.mark_as_reserved(command.expiration, command.seats.clone(), clock)?;
    repo.save(&mut order, correlation_id).await?;
    Ok(RegistrationCommandResult::of(&order))
}

/// Handles `ConfirmOrder`.
///
/// # Errors
///
/// Returns `DomainError::AggregateNotFound` for an unknown order,
/// `DomainError::OutOfOrder` before seats are reserved,
/// `DomainError::Validation` once the order is closed, and propagates
/// repository errors.
#[instrument(skip(command, clock, repo), fields(order_id = %command.order_id))]
pub async fn handle_confirm_order(
    command: &ConfirmOrder,
    correlation_id: Option<&str>,
    clock: &dyn Clock,
    repo: &OrderRepository,
) -> Result<RegistrationCommandResult, DomainError> {
    let mut order = repo.get(command.order_id).await?;
    order.confirm(clock)?;
    repo.save(&mut order, correlation_id).await?;
    Ok(RegistrationCommandResult::of(&order))
}

/// Handles `RejectOrder`.
///
/// # Errors
///
/// As [`handle_mark_seats_as_reserved`].
#[instrument(skip(command, clock, repo), fields(order_id = %command.order_id))]
pub async fn handle_reject_order(
    command: &RejectOrder,
    correlation_id: Option<&str>,
    clock: &dyn Clock,
    repo: &OrderRepository,
) -> Result<RegistrationCommandResult, DomainError> {
    let mut order = repo.get(command.order_id).await?;
    order.reject(clock)?;
    repo.save(&mut order, correlation_id).await?;
    Ok(RegistrationCommandResult::of(&order))
}

/// Handles `AddSeats`, creating the conference's inventory on first use.
///
/// # Errors
///
/// Returns `DomainError::Validation` for zero seats, and propagates
/// repository errors.
#[instrument(skip(command, clock, repo), fields(conference_id = %command.conference_id))]
pub async fn handle_add_seats(
    command: &AddSeats,
    correlation_id: Option<&str>,
    clock: &dyn Clock,
    repo: &SeatsAvailabilityRepository,
) -> Result<RegistrationCommandResult, DomainError> {
    let mut availability = repo
        .find(command.conference_id)
        .await?
        .unwrap_or_else(|| SeatsAvailability::new(command.conference_id));
    availability.add_seats(command.seat_type, command.quantity, clock)?;
    repo.save(&mut availability, correlation_id).await?;
    Ok(RegistrationCommandResult::of(&availability))
}

/// Handles `MakeSeatReservation`. A conference with no inventory yet has
/// nothing on sale, so the request is rejected as invalid.
///
/// # Errors
///
/// Returns `DomainError::Validation` for a seat type not on sale, and
/// propagates repository errors.
#[instrument(
    skip(command, clock, repo),
    fields(conference_id = %command.conference_id, reservation_id = %command.reservation_id)
)]
pub async fn handle_make_seat_reservation(
    command: &MakeSeatReservation,
    correlation_id: Option<&str>,
    clock: &dyn Clock,
    repo: &SeatsAvailabilityRepository,
) -> Result<RegistrationCommandResult, DomainError> {
    let mut availability = repo
        .find(command.conference_id)
        .await?
        .unwrap_or_else(|| SeatsAvailability::new(command.conference_id));
    availability.make_reservation(command.reservation_id, &command.seats, clock)?;
    repo.save(&mut availability, correlation_id).await?;
    Ok(RegistrationCommandResult::of(&availability))
}

/// Handles `CommitSeatReservation`. Unknown conferences and reservations are
/// ignored.
///
/// # Errors
///
/// Propagates repository errors.
#[instrument(
    skip(command, clock, repo),
    fields(conference_id = %command.conference_id, reservation_id = %command.reservation_id)
)]
pub async fn handle_commit_seat_reservation(
    command: &CommitSeatReservation,
    correlation_id: Option<&str>,
    clock: &dyn Clock,
    repo: &SeatsAvailabilityRepository,
) -> Result<RegistrationCommandResult, DomainError> {
    let Some(mut availability) = repo.find(command.conference_id).await? else {
        debug!("no inventory for conference");
        return Ok(RegistrationCommandResult {
            aggregate_id: command.conference_id,
            version: -1,
        });
    };
    availability.commit_reservation(command.reservation_id, clock);
    repo.save(&mut availability, correlation_id).await?;
    Ok(RegistrationCommandResult::of(&availability))
}

/// Handles `CancelSeatReservation`, returning held seats to sale. Unknown
/// conferences and reservations are ignored.
///
/// # Errors
///
/// Propagates repository errors.
#[instrument(
    skip(command, clock, repo),
    fields(conference_id = %command.conference_id, reservation_id = %command.reservation_id)
)]
pub async fn handle_cancel_seat_reservation(
    command: &CancelSeatReservation,
    correlation_id: Option<&str>,
    clock: &dyn Clock,
    repo: &SeatsAvailabilityRepository,
) -> Result<RegistrationCommandResult, DomainError> {
    let Some(mut availability) = repo.find(command.conference_id).await? else {
        debug!("no inventory for conference");
        return Ok(RegistrationCommandResult {
            aggregate_id: command.conference_id,
            version: -1,
        });
    };
    availability.cancel_reservation(command.reservation_id, clock);
    repo.save(&mut availability, correlation_id).await?;
    Ok(RegistrationCommandResult::of(&availability))
}

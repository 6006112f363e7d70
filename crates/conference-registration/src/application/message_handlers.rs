//! Transport adapters feeding order and seat availability commands from the
//! `commands` queue into the command handlers.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeDelta;
use conference_core::clock::Clock;
use conference_core::error::DomainError;
use conference_core::message::ReceivedMessage;
use conference_core::serialization::PayloadRegistry;
use conference_core::transport::MessageHandler;
use tracing::warn;

use super::command_handlers::{
    OrderRepository, RegistrationCommandResult, SeatsAvailabilityRepository, handle_add_seats,
    handle_cancel_seat_reservation, handle_commit_seat_reservation, handle_confirm_order,
    handle_make_seat_reservation, handle_mark_seats_as_reserved, handle_place_order,
    handle_reject_order,
};
use crate::domain::commands::{
    ADD_SEATS_COMMAND_TYPE, AddSeats, CANCEL_SEAT_RESERVATION_COMMAND_TYPE,
    COMMIT_SEAT_RESERVATION_COMMAND_TYPE, CONFIRM_ORDER_COMMAND_TYPE, CancelSeatReservation,
    CommitSeatReservation, ConfirmOrder, MAKE_SEAT_RESERVATION_COMMAND_TYPE,
    MARK_SEATS_AS_RESERVED_COMMAND_TYPE, MakeSeatReservation, MarkSeatsAsReserved,
    PLACE_ORDER_COMMAND_TYPE, PlaceOrder, REJECT_ORDER_COMMAND_TYPE, RejectOrder,
};

/// Command type tags handled by [`OrderCommandHandler`].
pub const ORDER_COMMAND_TYPES: &[&str] = &[
    PLACE_ORDER_COMMAND_TYPE,
    MARK_SEATS_AS_RESERVED_COMMAND_TYPE,
    CONFIRM_ORDER_COMMAND_TYPE,
    REJECT_ORDER_COMMAND_TYPE,
];

/// Command type tags handled by [`SeatsAvailabilityCommandHandler`].
pub const SEATS_COMMAND_TYPES: &[&str] = &[
    ADD_SEATS_COMMAND_TYPE,
    MAKE_SEAT_RESERVATION_COMMAND_TYPE,
    COMMIT_SEAT_RESERVATION_COMMAND_TYPE,
    CANCEL_SEAT_RESERVATION_COMMAND_TYPE,
];

/// Commands addressed to an order.
#[derive(Debug, Clone)]
pub enum OrderCommand {
    /// Place a new order.
    Place(PlaceOrder),
    /// Record held seats.
    MarkSeatsAsReserved(MarkSeatsAsReserved),
    /// Confirm a paid order.
    Confirm(ConfirmOrder),
    /// Abandon an order.
    Reject(RejectOrder),
}

impl From<PlaceOrder> for OrderCommand {
    fn from(command: PlaceOrder) -> Self {
        Self::Place(command)
    }
}

impl From<MarkSeatsAsReserved> for OrderCommand {
    fn from(command: MarkSeatsAsReserved) -> Self {
        Self::MarkSeatsAsReserved(command)
    }
}

impl From<ConfirmOrder> for OrderCommand {
    fn from(command: ConfirmOrder) -> Self {
        Self::Confirm(command)
    }
}

impl From<RejectOrder> for OrderCommand {
    fn from(command: RejectOrder) -> Self {
        Self::Reject(command)
    }
}

/// Commands addressed to a conference's seat inventory.
#[derive(Debug, Clone)]
pub enum SeatsAvailabilityCommand {
    /// Put seats on sale.
    AddSeats(AddSeats),
    /// Hold seats for a reservation.
    MakeReservation(MakeSeatReservation),
    /// Sell held seats.
    CommitReservation(CommitSeatReservation),
    /// Release held seats.
    CancelReservation(CancelSeatReservation),
}

impl From<AddSeats> for SeatsAvailabilityCommand {
    fn from(command: AddSeats) -> Self {
        Self::AddSeats(command)
    }
}

impl From<MakeSeatReservation> for SeatsAvailabilityCommand {
    fn from(command: MakeSeatReservation) -> Self {
        Self::MakeReservation(command)
    }
}

impl From<CommitSeatReservation> for SeatsAvailabilityCommand {
    fn from(command: CommitSeatReservation) -> Self {
        Self::CommitReservation(command)
    }
}

impl From<CancelSeatReservation> for SeatsAvailabilityCommand {
    fn from(command: CancelSeatReservation) -> Self {
        Self::CancelReservation(command)
    }
}

/// Maps a handler outcome to an acknowledgement. Commands the domain refuses
/// are logged and acknowledged: redelivering them would be refused again.
fn acknowledge<C: std::fmt::Debug>(
    command: &C,
    result: Result<RegistrationCommandResult, DomainError>,
) -> Result<(), DomainError> {
    match result {
        Ok(_) => Ok(()),
        Err(DomainError::Validation(reason)) => {
            warn!(?command, %reason, "registration command rejected");
            Ok(())
        }
        Err(e) => Err(e),
    }
}

/// Decodes order commands and runs them.
pub struct OrderCommandHandler {
    orders: OrderRepository,
    clock: Arc<dyn Clock>,
    reservation_window: TimeDelta,
    registry: PayloadRegistry<OrderCommand>,
}

impl OrderCommandHandler {
    /// Creates a handler placing orders that hold seats for
    /// `reservation_window`.
    #[must_use]
    pub fn new(orders: OrderRepository, clock: Arc<dyn Clock>, reservation_window: TimeDelta) -> Self {
        let registry = PayloadRegistry::new()
            .with::<PlaceOrder>(PLACE_ORDER_COMMAND_TYPE)
            .with::<MarkSeatsAsReserved>(MARK_SEATS_AS_RESERVED_COMMAND_TYPE)
            .with::<ConfirmOrder>(CONFIRM_ORDER_COMMAND_TYPE)
            .with::<RejectOrder>(REJECT_ORDER_COMMAND_TYPE);
        Self {
            orders,
            clock,
            reservation_window,
            registry,
        }
    }
}

#[async_trait]
impl MessageHandler for OrderCommandHandler {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), DomainError> {
        let command = self.registry.decode_str(&message.message.body)?;
        let correlation_id = message.message.correlation_id.as_deref();
        let clock = self.clock.as_ref();

        let result = match &command {
            OrderCommand::Place(c) => {
                handle_place_order(c, self.reservation_window, correlation_id, clock, &self.orders)
                    .await
            }
            OrderCommand::MarkSeatsAsReserved(c) => {
                handle_mark_seats_as_reserved(c, correlation_id, clock, &self.orders).await
            }
            OrderCommand::Confirm(c) => {
                handle_confirm_order(c, correlation_id, clock, &self.orders).await
            }
            OrderCommand::Reject(c) => {
                handle_reject_order(c, correlation_id, clock, &self.orders).await
            }
        };
        acknowledge(&command, result)
    }
}

/// Decodes seat availability commands and runs them.
pub struct SeatsAvailabilityCommandHandler {
    seats: SeatsAvailabilityRepository,
    clock: Arc<dyn Clock>,
    registry: PayloadRegistry<SeatsAvailabilityCommand>,
}

impl SeatsAvailabilityCommandHandler {
    /// Creates a handler over the seat availability repository.
    #[must_use]
    pub fn new(seats: SeatsAvailabilityRepository, clock: Arc<dyn Clock>) -> Self {
        let registry = PayloadRegistry::new()
            .with::<AddSeats>(ADD_SEATS_COMMAND_TYPE)
            .with::<MakeSeatReservation>(MAKE_SEAT_RESERVATION_COMMAND_TYPE)
            .with::<CommitSeatReservation>(COMMIT_SEAT_RESERVATION_COMMAND_TYPE)
            .with::<CancelSeatReservation>(CANCEL_SEAT_RESERVATION_COMMAND_TYPE);
        Self {
            seats,
            clock,
            registry,
        }
    }
}

#[async_trait]
impl MessageHandler for SeatsAvailabilityCommandHandler {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), DomainError> {
        let command = self.registry.decode_str(&message.message.body)?;
        let correlation_id = message.message.correlation_id.as_deref();
        let clock = self.clock.as_ref();

        let result = match &command {
            SeatsAvailabilityCommand::AddSeats(c) => {
                handle_add_seats(c, correlation_id, clock, &self.seats).await
            }
            SeatsAvailabilityCommand::MakeReservation(c) => {
                handle_make_seat_reservation(c, correlation_id, clock, &self.seats).await
            }
            SeatsAvailabilityCommand::CommitReservation(c) => {
                handle_commit_seat_reservation(c, correlation_id, clock, &self.seats).await
            }
            SeatsAvailabilityCommand::CancelReservation(c) => {
                handle_cancel_seat_reservation(c, correlation_id, clock, &self.seats).await
            }
        };
        acknowledge(&command, result)
    }
}

#[cfg(test)]
mod tests {
    use conference_core::envelope::Envelope;
    use conference_core::message::Message;
    use conference_test_support::{FixedClock, InMemoryEventRepository, fixed_now};
    use uuid::Uuid;

    use super::*;
    use crate::domain::aggregates::OrderStatus;
    use crate::domain::events::{OrderLine, SeatQuantity};

    fn received(message: Message) -> ReceivedMessage {
        ReceivedMessage {
            id: 1,
            queue: "commands".to_owned(),
            delivery_count: 1,
            message,
        }
    }

    #[tokio::test]
    async fn test_place_order_message_creates_order_with_correlation() {
        // Arrange
        let clock = Arc::new(FixedClock(fixed_now()));
        let store = Arc::new(InMemoryEventRepository::new());
        let handler = OrderCommandHandler::new(
            OrderRepository::new(store.clone(), clock.clone()),
            clock.clone(),
            TimeDelta::minutes(15),
        );
        let order_id = Uuid::new_v4();
        let message = Envelope::new(PlaceOrder {
            id: Uuid::new_v4(),
            order_id,
            conference_id: Uuid::new_v4(),
            lines: vec![OrderLine {
                seat_type: Uuid::new_v4(),
                quantity: 1,
                unit_price: 100,
            }],
        })
        .with_correlation_id("corr-7")
        .to_message(clock.as_ref())
        .unwrap();

        // Act
        handler.handle(&received(message)).await.unwrap();

        // Assert
        let stream = store.stream(order_id);
        assert_eq!(stream.len(), 1);
        assert_eq!(stream[0].correlation_id.as_deref(), Some("corr-7"));
    }

    #[tokio::test]
    async fn test_confirm_for_unknown_order_is_retried() {
        let clock = Arc::new(FixedClock(fixed_now()));
        let handler = OrderCommandHandler::new(
            OrderRepository::new(Arc::new(InMemoryEventRepository::new()), clock.clone()),
            clock.clone(),
            TimeDelta::minutes(15),
        );
        let message = Envelope::new(ConfirmOrder {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
        })
        .to_message(clock.as_ref())
        .unwrap();

        let result = handler.handle(&received(message)).await;

        assert!(matches!(result, Err(DomainError::AggregateNotFound(_))));
    }

    #[tokio::test]
    async fn test_confirm_overtaking_reservation_is_retried_until_it_lands() {
        // Arrange
        let clock = Arc::new(FixedClock(fixed_now()));
        let store = Arc::new(InMemoryEventRepository::new());
        let handler = OrderCommandHandler::new(
            OrderRepository::new(store.clone(), clock.clone()),
            clock.clone(),
            TimeDelta::minutes(15),
        );
        let order_id = Uuid::new_v4();
        let seat_type = Uuid::new_v4();
        let place = Envelope::new(PlaceOrder {
            id: Uuid::new_v4(),
            order_id,
            conference_id: Uuid::new_v4(),
            lines: vec![OrderLine {
                seat_type,
                quantity: 2,
                unit_price: 100,
            }],
        })
        .to_message(clock.as_ref())
        .unwrap();
        let confirm = received(
            Envelope::new(ConfirmOrder {
                id: Uuid::new_v4(),
                order_id,
            })
            .to_message(clock.as_ref())
            .unwrap(),
        );
        let mark_reserved = Envelope::new(MarkSeatsAsReserved {
            id: Uuid::new_v4(),
            order_id,
            seats: vec![SeatQuantity {
                seat_type,
                quantity: 2,
            }],
            expiration: fixed_now() + TimeDelta::minutes(15),
        })
        .to_message(clock.as_ref())
        .unwrap();
        handler.handle(&received(place)).await.unwrap();

        // Act
        let early = handler.handle(&confirm).await;
        handler.handle(&received(mark_reserved)).await.unwrap();
        let retried = handler.handle(&confirm).await;

        // Assert
        assert!(matches!(early, Err(DomainError::OutOfOrder(_))));
        assert!(retried.is_ok());
        let order = OrderRepository::new(store, clock).get(order_id).await.unwrap();
        assert_eq!(order.status(), OrderStatus::Confirmed);
    }

    #[tokio::test]
    async fn test_reservation_for_unknown_seat_type_is_acknowledged() {
        // Arrange
        let clock = Arc::new(FixedClock(fixed_now()));
        let store = Arc::new(InMemoryEventRepository::new());
        let handler = SeatsAvailabilityCommandHandler::new(
            SeatsAvailabilityRepository::new(store.clone(), clock.clone()),
            clock.clone(),
        );
        let conference_id = Uuid::new_v4();
        let message = Envelope::new(MakeSeatReservation {
            id: Uuid::new_v4(),
            conference_id,
            reservation_id: Uuid::new_v4(),
            seats: vec![SeatQuantity {
                seat_type: Uuid::new_v4(),
                quantity: 2,
            }],
        })
        .to_message(clock.as_ref())
        .unwrap();

        // Act
        let result = handler.handle(&received(message)).await;

        // Assert
        assert!(result.is_ok());
        assert!(store.stream(conference_id).is_empty());
    }

    #[tokio::test]
    async fn test_add_seats_then_reserve_through_messages() {
        let clock = Arc::new(FixedClock(fixed_now()));
        let store = Arc::new(InMemoryEventRepository::new());
        let seats = SeatsAvailabilityRepository::new(store.clone(), clock.clone());
        let handler = SeatsAvailabilityCommandHandler::new(seats.clone(), clock.clone());
        let conference_id = Uuid::new_v4();
        let seat_type = Uuid::new_v4();
        let add = Envelope::new(AddSeats {
            id: Uuid::new_v4(),
            conference_id,
            seat_type,
            quantity: 5,
        })
        .to_message(clock.as_ref())
        .unwrap();
        let reserve = Envelope::new(MakeSeatReservation {
            id: Uuid::new_v4(),
            conference_id,
            reservation_id: Uuid::new_v4(),
            seats: vec![SeatQuantity {
                seat_type,
                quantity: 2,
            }],
        })
        .to_message(clock.as_ref())
        .unwrap();

        handler.handle(&received(add)).await.unwrap();
        handler.handle(&received(reserve)).await.unwrap();

        let availability = seats.get(conference_id).await.unwrap();
        assert_eq!(availability.remaining_seats(seat_type), 3);
    }

    #[tokio::test]
    async fn test_seat_command_on_order_handler_is_serialization_error() {
        let clock = Arc::new(FixedClock(fixed_now()));
        let handler = OrderCommandHandler::new(
            OrderRepository::new(Arc::new(InMemoryEventRepository::new()), clock.clone()),
            clock.clone(),
            TimeDelta::minutes(15),
        );
        let message = Envelope::new(AddSeats {
            id: Uuid::new_v4(),
            conference_id: Uuid::new_v4(),
            seat_type: Uuid::new_v4(),
            quantity: 1,
        })
        .to_message(clock.as_ref())
        .unwrap();

        let result = handler.handle(&received(message)).await;

        assert!(matches!(result, Err(DomainError::Serialization(_))));
    }
}

//! The registration process: reserve seats, take payment, then confirm the
//! order or release the seats.
//!
//! | state                            | input                          | commands                                  | next                             |
//! |----------------------------------|--------------------------------|-------------------------------------------|----------------------------------|
//! | NotStarted                       | OrderPlaced                    | MakeSeatReservation, Expire (delayed)     | AwaitingReservationConfirmation  |
//! | NotStarted                       | OrderPlaced (already lapsed)   | RejectOrder                               | Cancelled                        |
//! | AwaitingReservationConfirmation  | SeatsReserved (seats held)     | MarkSeatsAsReserved, InitiatePayment      | AwaitingPayment                  |
//! | AwaitingReservationConfirmation  | SeatsReserved (nothing held)   | RejectOrder, CancelSeatReservation        | Cancelled                        |
//! | AwaitingReservationConfirmation  | Expire (scheduled id)          | RejectOrder, CancelSeatReservation        | Cancelled                        |
//! | AwaitingPayment                  | PaymentCompleted               | ConfirmOrder, CommitSeatReservation       | Confirmed                        |
//! | AwaitingPayment                  | PaymentRejected                | RejectOrder, CancelSeatReservation        | Cancelled                        |
//!
//! Every other combination is ignored, including an expiration that arrives
//! after the reservation was confirmed.

use chrono::{DateTime, Utc};
use conference_core::clock::Clock;
use conference_core::command::Command;
use conference_core::envelope::Envelope;
use conference_core::error::DomainError;
use conference_core::process_manager::{ProcessManager, ProcessState, Transition};
use conference_core::serialization::Payload;
use conference_payments::domain::commands::InitiateThirdPartyProcessorPayment;
use conference_payments::domain::events::{PaymentCompleted, PaymentItem, PaymentRejected};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;

use super::commands::{
    CancelSeatReservation, CommitSeatReservation, ConfirmOrder, ExpireRegistrationProcess,
    MakeSeatReservation, MarkSeatsAsReserved, RejectOrder,
};
use super::events::{OrderLine, OrderPlaced, SeatQuantity, SeatsReserved};

/// Commands the registration process dispatches. Serialized as the inner
/// command so consumers decode the concrete type.
#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum RegistrationCommand {
    /// Hold seats for the order.
    MakeSeatReservation(MakeSeatReservation),
    /// Record the held seats on the order.
    MarkSeatsAsReserved(MarkSeatsAsReserved),
    /// Start payment for the held seats.
    InitiatePayment(InitiateThirdPartyProcessorPayment),
    /// Confirm the paid order.
    ConfirmOrder(ConfirmOrder),
    /// Abandon the order.
    RejectOrder(RejectOrder),
    /// Sell the held seats.
    CommitSeatReservation(CommitSeatReservation),
    /// Release the held seats.
    CancelSeatReservation(CancelSeatReservation),
    /// Close the reservation window.
    ExpireRegistrationProcess(ExpireRegistrationProcess),
}

impl RegistrationCommand {
    fn tag_and_id(&self) -> (&'static str, Uuid) {
        match self {
            Self::MakeSeatReservation(c) => (c.payload_type(), c.id),
            Self::MarkSeatsAsReserved(c) => (c.payload_type(), c.id),
            Self::InitiatePayment(c) => (c.payload_type(), c.id),
            Self::ConfirmOrder(c) => (c.payload_type(), c.id),
            Self::RejectOrder(c) => (c.payload_type(), c.id),
            Self::CommitSeatReservation(c) => (c.payload_type(), c.id),
            Self::CancelSeatReservation(c) => (c.payload_type(), c.id),
            Self::ExpireRegistrationProcess(c) => (c.payload_type(), c.id),
        }
    }
}

impl Payload for RegistrationCommand {
    fn payload_type(&self) -> &'static str {
        self.tag_and_id().0
    }

    fn payload_id(&self) -> Option<Uuid> {
        Some(self.tag_and_id().1)
    }
}

impl Command for RegistrationCommand {
    fn command_id(&self) -> Uuid {
        self.tag_and_id().1
    }
}

/// Inputs the registration process reacts to.
#[derive(Debug, Clone)]
pub enum RegistrationInput {
    /// An order was placed.
    OrderPlaced(OrderPlaced),
    /// Seats were held for a reservation.
    SeatsReserved(SeatsReserved),
    /// A payment went through.
    PaymentCompleted(PaymentCompleted),
    /// A payment was refused.
    PaymentRejected(PaymentRejected),
    /// The reservation window closed.
    Expire(ExpireRegistrationProcess),
}

impl RegistrationInput {
    /// The registration process this input belongs to (the order id).
    #[must_use]
    pub fn process_id(&self) -> Uuid {
        match self {
            Self::OrderPlaced(e) => e.order_id,
            Self::SeatsReserved(e) => e.reservation_id,
            Self::PaymentCompleted(e) => e.payment_source_id,
            Self::PaymentRejected(e) => e.payment_source_id,
            Self::Expire(c) => c.process_id,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::OrderPlaced(_) => "OrderPlaced",
            Self::SeatsReserved(_) => "SeatsReserved",
            Self::PaymentCompleted(_) => "PaymentCompleted",
            Self::PaymentRejected(_) => "PaymentRejected",
            Self::Expire(_) => "ExpireRegistrationProcess",
        }
    }
}

/// Where a registration stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistrationState {
    /// No order seen yet.
    NotStarted,
    /// Seats requested; waiting for them to be held.
    AwaitingReservationConfirmation,
    /// Seats held; waiting for the payment outcome.
    AwaitingPayment,
    /// Paid; seats sold. Terminal.
    Confirmed,
    /// Abandoned; seats released. Terminal.
    Cancelled,
}

/// Coordinates one order from placement to confirmation or cancellation.
/// Keyed by the order id.
#[derive(Debug, Serialize, Deserialize)]
pub struct RegistrationProcessManager {
    process: ProcessState<RegistrationCommand>,
    state: RegistrationState,
    conference_id: Uuid,
    lines: Vec<OrderLine>,
    reservation_auto_expiration: Option<DateTime<Utc>>,
    expiration_command_id: Option<Uuid>,
    payment_id: Option<Uuid>,
}

impl RegistrationProcessManager {
    /// Creates a process for `order_id` that has seen nothing yet.
    #[must_use]
    pub fn new(order_id: Uuid) -> Self {
        Self {
            process: ProcessState::new(order_id),
            state: RegistrationState::NotStarted,
            conference_id: Uuid::nil(),
            lines: Vec::new(),
            reservation_auto_expiration: None,
            expiration_command_id: None,
            payment_id: None,
        }
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> RegistrationState {
        self.state
    }

    /// The payment started for the order, once seats are held.
    #[must_use]
    pub fn payment_id(&self) -> Option<Uuid> {
        self.payment_id
    }

    /// Id of the scheduled expiration command, while one is outstanding.
    #[must_use]
    pub fn expiration_command_id(&self) -> Option<Uuid> {
        self.expiration_command_id
    }

    fn order_id(&self) -> Uuid {
        self.id()
    }

    fn emit(&mut self, command: RegistrationCommand) {
        self.process.emit(Envelope::new(command));
    }

    fn on_order_placed(&mut self, event: OrderPlaced, now: DateTime<Utc>) -> Transition {
        self.conference_id = event.conference_id;
        self.lines = event.lines;

        if event.reservation_auto_expiration <= now {
            self.emit(RegistrationCommand::RejectOrder(RejectOrder {
                id: Uuid::new_v4(),
                order_id: self.order_id(),
            }));
            self.finish(RegistrationState::Cancelled);
            return Transition::Advanced;
        }

        let seats = self
            .lines
            .iter()
            .map(|line| SeatQuantity {
                seat_type: line.seat_type,
                quantity: line.quantity,
            })
            .collect();
        self.emit(RegistrationCommand::MakeSeatReservation(MakeSeatReservation {
            id: Uuid::new_v4(),
            conference_id: self.conference_id,
            reservation_id: self.order_id(),
            seats,
        }));

        let expire = ExpireRegistrationProcess {
            id: Uuid::new_v4(),
            process_id: self.id(),
        };
        self.expiration_command_id = Some(expire.id);
        self.reservation_auto_expiration = Some(event.reservation_auto_expiration);
        self.process.emit(
            Envelope::new(RegistrationCommand::ExpireRegistrationProcess(expire))
                .with_delay(event.reservation_auto_expiration - now),
        );

        self.state = RegistrationState::AwaitingReservationConfirmation;
        Transition::Advanced
    }

    fn on_seats_reserved(&mut self, event: SeatsReserved, now: DateTime<Utc>) -> Transition {
        if event.reservation_details.is_empty() {
            self.cancel();
            return Transition::Advanced;
        }

        let items: Vec<PaymentItem> = event
            .reservation_details
            .iter()
            .map(|seat| {
                let unit_price = self
                    .lines
                    .iter()
                    .find(|line| line.seat_type == seat.seat_type)
                    .map_or(0, |line| line.unit_price);
                PaymentItem {
                    id: seat.seat_type,
                    description: format!("{} x seat type {}", seat.quantity, seat.seat_type),
                    amount: unit_price.saturating_mul(u64::from(seat.quantity)),
                }
            })
            .collect();
        let total_amount = items.iter().map(|item| item.amount).sum();
        let payment_id = Uuid::new_v4();

        self.emit(RegistrationCommand::MarkSeatsAsReserved(MarkSeatsAsReserved {
            id: Uuid::new_v4(),
            order_id: self.order_id(),
            seats: event.reservation_details,
            expiration: self.reservation_auto_expiration.unwrap_or(now),
        }));
        self.emit(RegistrationCommand::InitiatePayment(
            InitiateThirdPartyProcessorPayment {
                id: Uuid::new_v4(),
                payment_id,
                payment_source_id: self.order_id(),
                conference_id: self.conference_id,
                description: format!("Registration for order {}", self.order_id()),
                total_amount,
                items,
            },
        ));

        self.payment_id = Some(payment_id);
        self.expiration_command_id = None;
        self.state = RegistrationState::AwaitingPayment;
        Transition::Advanced
    }

    fn on_payment_completed(&mut self) -> Transition {
        self.emit(RegistrationCommand::ConfirmOrder(ConfirmOrder {
            id: Uuid::new_v4(),
            order_id: self.order_id(),
        }));
        self.emit(RegistrationCommand::CommitSeatReservation(
            CommitSeatReservation {
                id: Uuid::new_v4(),
                conference_id: self.conference_id,
                reservation_id: self.order_id(),
            },
        ));
        self.finish(RegistrationState::Confirmed);
        Transition::Advanced
    }

    fn cancel(&mut self) {
        self.emit(RegistrationCommand::RejectOrder(RejectOrder {
            id: Uuid::new_v4(),
            order_id: self.order_id(),
        }));
        self.emit(RegistrationCommand::CancelSeatReservation(
            CancelSeatReservation {
                id: Uuid::new_v4(),
                conference_id: self.conference_id,
                reservation_id: self.order_id(),
            },
        ));
        self.finish(RegistrationState::Cancelled);
    }

    fn finish(&mut self, state: RegistrationState) {
        self.state = state;
        self.expiration_command_id = None;
        self.process.complete();
    }
}

impl ProcessManager for RegistrationProcessManager {
    const PROCESS_TYPE: &'static str = "registration";
    type Command = RegistrationCommand;
    type Input = RegistrationInput;

    fn process(&self) -> &ProcessState<RegistrationCommand> {
        &self.process
    }

    fn process_mut(&mut self) -> &mut ProcessState<RegistrationCommand> {
        &mut self.process
    }

    fn transition(
        &mut self,
        input: RegistrationInput,
        clock: &dyn Clock,
    ) -> Result<Transition, DomainError> {
        use RegistrationInput as Input;
        use RegistrationState as State;

        let now = clock.now();
        let transition = match (self.state, input) {
            (State::NotStarted, Input::OrderPlaced(e)) if e.order_id == self.id() => {
                self.on_order_placed(e, now)
            }
            (State::AwaitingReservationConfirmation, Input::SeatsReserved(e))
                if e.reservation_id == self.id() =>
            {
                self.on_seats_reserved(e, now)
            }
            (State::AwaitingReservationConfirmation, Input::Expire(c))
                if Some(c.id) == self.expiration_command_id =>
            {
                self.cancel();
                Transition::Advanced
            }
            (State::AwaitingPayment, Input::PaymentCompleted(e))
                if Some(e.payment_id) == self.payment_id =>
            {
                self.on_payment_completed()
            }
            (State::AwaitingPayment, Input::PaymentRejected(e))
                if Some(e.payment_id) == self.payment_id =>
            {
                self.cancel();
                Transition::Advanced
            }
            (state, input) => {
                debug!(
                    process_id = %self.id(),
                    ?state,
                    input = input.name(),
                    "registration input ignored"
                );
                Transition::Ignored
            }
        };
        Ok(transition)
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeDelta;
    use conference_test_support::{FixedClock, fixed_now};

    use super::*;

    struct Fixture {
        order_id: Uuid,
        conference_id: Uuid,
        seat_type: Uuid,
        clock: FixedClock,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                order_id: Uuid::new_v4(),
                conference_id: Uuid::new_v4(),
                seat_type: Uuid::new_v4(),
                clock: FixedClock(fixed_now()),
            }
        }

        fn order_placed(&self, expires_in: TimeDelta) -> RegistrationInput {
            RegistrationInput::OrderPlaced(OrderPlaced {
                order_id: self.order_id,
                conference_id: self.conference_id,
                lines: vec![OrderLine {
                    seat_type: self.seat_type,
                    quantity: 3,
                    unit_price: 100,
                }],
                reservation_auto_expiration: fixed_now() + expires_in,
            })
        }

        fn seats_reserved(&self, quantity: u32) -> RegistrationInput {
            let reservation_details = if quantity == 0 {
                Vec::new()
            } else {
                vec![SeatQuantity {
                    seat_type: self.seat_type,
                    quantity,
                }]
            };
            RegistrationInput::SeatsReserved(SeatsReserved {
                conference_id: self.conference_id,
                reservation_id: self.order_id,
                reservation_details,
            })
        }

        fn awaiting_payment(&self) -> RegistrationProcessManager {
            let mut process = RegistrationProcessManager::new(self.order_id);
            process
                .handle(self.order_placed(TimeDelta::minutes(15)), &self.clock)
                .unwrap();
            process
                .handle(self.seats_reserved(2), &self.clock)
                .unwrap();
            process
        }
    }

    /// Tags of the commands queued after the first `skip`.
    fn command_types(process: &RegistrationProcessManager, skip: usize) -> Vec<&'static str> {
        process
            .pending_commands()
            .iter()
            .skip(skip)
            .map(|envelope| envelope.body().payload_type())
            .collect()
    }

    #[test]
    fn test_order_placed_requests_seats_and_schedules_expiration() {
        // Arrange
        let fixture = Fixture::new();
        let mut process = RegistrationProcessManager::new(fixture.order_id);

        // Act
        let transition = process
            .handle(fixture.order_placed(TimeDelta::minutes(15)), &fixture.clock)
            .unwrap();

        // Assert
        assert_eq!(transition, Transition::Advanced);
        assert_eq!(
            process.state(),
            RegistrationState::AwaitingReservationConfirmation
        );
        assert_eq!(
            command_types(&process, 0),
            vec![
                "registration.make_seat_reservation",
                "registration.expire_registration_process"
            ]
        );
        let expire = &process.pending_commands()[1];
        assert_eq!(expire.delay(), TimeDelta::minutes(15));
        assert_eq!(
            Some(expire.body().command_id()),
            process.expiration_command_id()
        );
    }

    #[test]
    fn test_seats_reserved_starts_payment_for_held_seats() {
        // Arrange
        let fixture = Fixture::new();
        let mut process = RegistrationProcessManager::new(fixture.order_id);
        process
            .handle(fixture.order_placed(TimeDelta::minutes(15)), &fixture.clock)
            .unwrap();
        let before = process.pending_commands().len();

        // Act
        process
            .handle(fixture.seats_reserved(2), &fixture.clock)
            .unwrap();

        // Assert
        assert_eq!(process.state(), RegistrationState::AwaitingPayment);
        assert_eq!(
            command_types(&process, before),
            vec![
                "registration.mark_seats_as_reserved",
                "payments.initiate_third_party_processor_payment"
            ]
        );
        match process.pending_commands()[before + 1].body() {
            RegistrationCommand::InitiatePayment(payment) => {
                assert_eq!(payment.total_amount, 200);
                assert_eq!(payment.payment_source_id, fixture.order_id);
                assert_eq!(Some(payment.payment_id), process.payment_id());
            }
            other => panic!("expected InitiatePayment, got {other:?}"),
        }
    }

    #[test]
    fn test_stale_expiration_after_reservation_is_ignored() {
        // Arrange
        let fixture = Fixture::new();
        let mut process = RegistrationProcessManager::new(fixture.order_id);
        process
            .handle(fixture.order_placed(TimeDelta::minutes(15)), &fixture.clock)
            .unwrap();
        let scheduled = process.expiration_command_id().unwrap();
        process
            .handle(fixture.seats_reserved(2), &fixture.clock)
            .unwrap();
        let before = process.pending_commands().len();

        // Act
        let transition = process
            .handle(
                RegistrationInput::Expire(ExpireRegistrationProcess {
                    id: scheduled,
                    process_id: fixture.order_id,
                }),
                &fixture.clock,
            )
            .unwrap();

        // Assert
        assert_eq!(transition, Transition::Ignored);
        assert_eq!(process.state(), RegistrationState::AwaitingPayment);
        assert_eq!(process.pending_commands().len(), before);
        assert!(!process.is_completed());
    }

    #[test]
    fn test_scheduled_expiration_cancels_unconfirmed_reservation() {
        let fixture = Fixture::new();
        let mut process = RegistrationProcessManager::new(fixture.order_id);
        process
            .handle(fixture.order_placed(TimeDelta::minutes(15)), &fixture.clock)
            .unwrap();
        let scheduled = process.expiration_command_id().unwrap();
        let before = process.pending_commands().len();

        let transition = process
            .handle(
                RegistrationInput::Expire(ExpireRegistrationProcess {
                    id: scheduled,
                    process_id: fixture.order_id,
                }),
                &fixture.clock,
            )
            .unwrap();

        assert_eq!(transition, Transition::Advanced);
        assert_eq!(process.state(), RegistrationState::Cancelled);
        assert!(process.is_completed());
        assert_eq!(
            command_types(&process, before),
            vec![
                "registration.reject_order",
                "registration.cancel_seat_reservation"
            ]
        );
    }

    #[test]
    fn test_expiration_with_unknown_id_is_ignored() {
        let fixture = Fixture::new();
        let mut process = RegistrationProcessManager::new(fixture.order_id);
        process
            .handle(fixture.order_placed(TimeDelta::minutes(15)), &fixture.clock)
            .unwrap();

        let transition = process
            .handle(
                RegistrationInput::Expire(ExpireRegistrationProcess {
                    id: Uuid::new_v4(),
                    process_id: fixture.order_id,
                }),
                &fixture.clock,
            )
            .unwrap();

        assert_eq!(transition, Transition::Ignored);
        assert_eq!(
            process.state(),
            RegistrationState::AwaitingReservationConfirmation
        );
    }

    #[test]
    fn test_payment_completed_confirms_and_commits() {
        let fixture = Fixture::new();
        let mut process = fixture.awaiting_payment();
        let payment_id = process.payment_id().unwrap();
        let before = process.pending_commands().len();

        process
            .handle(
                RegistrationInput::PaymentCompleted(PaymentCompleted {
                    payment_id,
                    payment_source_id: fixture.order_id,
                }),
                &fixture.clock,
            )
            .unwrap();

        assert_eq!(process.state(), RegistrationState::Confirmed);
        assert!(process.is_completed());
        assert_eq!(
            command_types(&process, before),
            vec![
                "registration.confirm_order",
                "registration.commit_seat_reservation"
            ]
        );
    }

    #[test]
    fn test_payment_rejected_releases_seats() {
        let fixture = Fixture::new();
        let mut process = fixture.awaiting_payment();
        let payment_id = process.payment_id().unwrap();
        let before = process.pending_commands().len();

        process
            .handle(
                RegistrationInput::PaymentRejected(PaymentRejected {
                    payment_id,
                    payment_source_id: fixture.order_id,
                }),
                &fixture.clock,
            )
            .unwrap();

        assert_eq!(process.state(), RegistrationState::Cancelled);
        assert_eq!(
            command_types(&process, before),
            vec![
                "registration.reject_order",
                "registration.cancel_seat_reservation"
            ]
        );
    }

    #[test]
    fn test_completed_process_ignores_everything() {
        // Arrange
        let fixture = Fixture::new();
        let mut process = fixture.awaiting_payment();
        let payment_id = process.payment_id().unwrap();
        process
            .handle(
                RegistrationInput::PaymentCompleted(PaymentCompleted {
                    payment_id,
                    payment_source_id: fixture.order_id,
                }),
                &fixture.clock,
            )
            .unwrap();
        let before = process.pending_commands().len();

        // Act
        let transition = process
            .handle(
                RegistrationInput::PaymentRejected(PaymentRejected {
                    payment_id,
                    payment_source_id: fixture.order_id,
                }),
                &fixture.clock,
            )
            .unwrap();

        // Assert
        assert_eq!(transition, Transition::Ignored);
        assert_eq!(process.state(), RegistrationState::Confirmed);
        assert_eq!(process.pending_commands().len(), before);
    }

    #[test]
    fn test_nothing_reserved_cancels_order() {
        let fixture = Fixture::new();
        let mut process = RegistrationProcessManager::new(fixture.order_id);
        process
            .handle(fixture.order_placed(TimeDelta::minutes(15)), &fixture.clock)
            .unwrap();

        process
            .handle(fixture.seats_reserved(0), &fixture.clock)
            .unwrap();

        assert_eq!(process.state(), RegistrationState::Cancelled);
        assert!(process.payment_id().is_none());
    }

    #[test]
    fn test_order_placed_after_its_deadline_is_rejected_at_once() {
        let fixture = Fixture::new();
        let mut process = RegistrationProcessManager::new(fixture.order_id);

        process
            .handle(fixture.order_placed(TimeDelta::zero()), &fixture.clock)
            .unwrap();

        assert_eq!(process.state(), RegistrationState::Cancelled);
        assert_eq!(command_types(&process, 0), vec!["registration.reject_order"]);
    }

    #[test]
    fn test_persisted_state_restores_without_queued_commands() {
        // Arrange
        let fixture = Fixture::new();
        let process = fixture.awaiting_payment();

        // Act
        let json = serde_json::to_string(&process).unwrap();
        let restored: RegistrationProcessManager = serde_json::from_str(&json).unwrap();

        // Assert
        assert_eq!(restored.id(), fixture.order_id);
        assert_eq!(restored.state(), RegistrationState::AwaitingPayment);
        assert_eq!(restored.payment_id(), process.payment_id());
        assert_eq!(
            restored.expiration_command_id(),
            process.expiration_command_id()
        );
        assert!(restored.pending_commands().is_empty());
    }

    #[test]
    fn test_untagged_command_serializes_as_inner_command() {
        let command = RegistrationCommand::ConfirmOrder(ConfirmOrder {
            id: Uuid::new_v4(),
            order_id: Uuid::new_v4(),
        });

        let json = serde_json::to_value(&command).unwrap();

        assert!(json.get("order_id").is_some());
        assert_eq!(command.payload_type(), "registration.confirm_order");
    }
}

//! Commands for the Registration context.

use chrono::{DateTime, Utc};
use conference_core::command::Command;
use conference_core::serialization::Payload;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::events::{OrderLine, SeatQuantity};

/// Command type tag for `PlaceOrder`.
pub const PLACE_ORDER_COMMAND_TYPE: &str = "registration.place_order";
/// Command type tag for `MarkSeatsAsReserved`.
pub const MARK_SEATS_AS_RESERVED_COMMAND_TYPE: &str = "registration.mark_seats_as_reserved";
/// Command type tag for `ConfirmOrder`.
pub const CONFIRM_ORDER_COMMAND_TYPE: &str = "registration.confirm_order";
/// Command type tag for `RejectOrder`.
pub const REJECT_ORDER_COMMAND_TYPE: &str = "registration.reject_order";
/// Command type tag for `AddSeats`.
pub const ADD_SEATS_COMMAND_TYPE: &str = "registration.add_seats";
/// Command type tag for `MakeSeatReservation`.
pub const MAKE_SEAT_RESERVATION_COMMAND_TYPE: &str = "registration.make_seat_reservation";
/// Command type tag for `CommitSeatReservation`.
pub const COMMIT_SEAT_RESERVATION_COMMAND_TYPE: &str = "registration.commit_seat_reservation";
/// Command type tag for `CancelSeatReservation`.
pub const CANCEL_SEAT_RESERVATION_COMMAND_TYPE: &str = "registration.cancel_seat_reservation";
/// Command type tag for `ExpireRegistrationProcess`.
pub const EXPIRE_REGISTRATION_PROCESS_COMMAND_TYPE: &str =
    "registration.expire_registration_process";

/// Command to place a new order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlaceOrder {
    /// The command identifier.
    pub id: Uuid,
    /// The order to create.
    pub order_id: Uuid,
    /// The conference the seats belong to.
    pub conference_id: Uuid,
    /// The seats requested.
    pub lines: Vec<OrderLine>,
}

/// Command recording which seats were held for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkSeatsAsReserved {
    /// The command identifier.
    pub id: Uuid,
    /// The order identifier.
    pub order_id: Uuid,
    /// The seats held.
    pub seats: Vec<SeatQuantity>,
    /// Instant after which the reservation is released.
    pub expiration: DateTime<Utc>,
}

/// Command confirming a paid order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfirmOrder {
    /// The command identifier.
    pub id: Uuid,
    /// The order identifier.
    pub order_id: Uuid,
}

/// Command abandoning an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectOrder {
    /// The command identifier.
    pub id: Uuid,
    /// The order identifier.
    pub order_id: Uuid,
}

/// Command putting more seats on sale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddSeats {
    /// The command identifier.
    pub id: Uuid,
    /// The conference identifier.
    pub conference_id: Uuid,
    /// The seat type identifier.
    pub seat_type: Uuid,
    /// How many seats to add.
    pub quantity: u32,
}

/// Command asking to hold seats for a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakeSeatReservation {
    /// The command identifier.
    pub id: Uuid,
    /// The conference identifier.
    pub conference_id: Uuid,
    /// The reservation identifier.
    pub reservation_id: Uuid,
    /// The seats wanted.
    pub seats: Vec<SeatQuantity>,
}

/// Command selling held seats for good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitSeatReservation {
    /// The command identifier.
    pub id: Uuid,
    /// The conference identifier.
    pub conference_id: Uuid,
    /// The reservation identifier.
    pub reservation_id: Uuid,
}

/// Command releasing held seats.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CancelSeatReservation {
    /// The command identifier.
    pub id: Uuid,
    /// The conference identifier.
    pub conference_id: Uuid,
    /// The reservation identifier.
    pub reservation_id: Uuid,
}

/// Delayed command telling the registration process its reservation window
/// has closed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireRegistrationProcess {
    /// The command identifier; the process only honours the one it scheduled.
    pub id: Uuid,
    /// The registration process identifier.
    pub process_id: Uuid,
}

macro_rules! command_payload {
    ($($command:ty => $tag:expr),+ $(,)?) => {
        $(
            impl Payload for $command {
                fn payload_type(&self) -> &'static str {
                    $tag
                }

                fn payload_id(&self) -> Option<Uuid> {
                    Some(self.id)
                }
            }

            impl Command for $command {
                fn command_id(&self) -> Uuid {
                    self.id
                }
            }
        )+
    };
}

command_payload! {
    PlaceOrder => PLACE_ORDER_COMMAND_TYPE,
    MarkSeatsAsReserved => MARK_SEATS_AS_RESERVED_COMMAND_TYPE,
    ConfirmOrder => CONFIRM_ORDER_COMMAND_TYPE,
    RejectOrder => REJECT_ORDER_COMMAND_TYPE,
    AddSeats => ADD_SEATS_COMMAND_TYPE,
    MakeSeatReservation => MAKE_SEAT_RESERVATION_COMMAND_TYPE,
    CommitSeatReservation => COMMIT_SEAT_RESERVATION_COMMAND_TYPE,
    CancelSeatReservation => CANCEL_SEAT_RESERVATION_COMMAND_TYPE,
    ExpireRegistrationProcess => EXPIRE_REGISTRATION_PROCESS_COMMAND_TYPE,
}

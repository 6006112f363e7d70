//! Domain events for the Registration context.

use chrono::{DateTime, Utc};
use conference_core::event::DomainEvent;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Event type tag for `OrderPlaced`.
pub const ORDER_PLACED_EVENT_TYPE: &str = "registration.order_placed";
/// Event type tag for `OrderReservationCompleted`.
pub const ORDER_RESERVATION_COMPLETED_EVENT_TYPE: &str = "registration.order_reservation_completed";
/// Event type tag for `OrderConfirmed`.
pub const ORDER_CONFIRMED_EVENT_TYPE: &str = "registration.order_confirmed";
/// Event type tag for `OrderExpired`.
pub const ORDER_EXPIRED_EVENT_TYPE: &str = "registration.order_expired";

/// Event type tag for `AvailableSeatsChanged`.
pub const AVAILABLE_SEATS_CHANGED_EVENT_TYPE: &str = "registration.available_seats_changed";
/// Event type tag for `SeatsReserved`.
pub const SEATS_RESERVED_EVENT_TYPE: &str = "registration.seats_reserved";
/// Event type tag for `SeatsReservationCommitted`.
pub const SEATS_RESERVATION_COMMITTED_EVENT_TYPE: &str = "registration.seats_reservation_committed";
/// Event type tag for `SeatsReservationCancelled`.
pub const SEATS_RESERVATION_CANCELLED_EVENT_TYPE: &str = "registration.seats_reservation_cancelled";

/// A number of seats of one type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatQuantity {
    /// The seat type identifier.
    pub seat_type: Uuid,
    /// How many seats.
    pub quantity: u32,
}

/// A signed change to the number of seats of one type still available.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatDelta {
    /// The seat type identifier.
    pub seat_type: Uuid,
    /// Negative when seats were taken, positive when returned.
    pub quantity: i64,
}

/// One line of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    /// The seat type identifier.
    pub seat_type: Uuid,
    /// Seats requested.
    pub quantity: u32,
    /// Price of one seat in minor currency units.
    pub unit_price: u64,
}

/// Emitted when a registrant places an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlaced {
    /// The order identifier.
    pub order_id: Uuid,
    /// The conference the seats belong to.
    pub conference_id: Uuid,
    /// The seats requested.
    pub lines: Vec<OrderLine>,
    /// Instant after which an unpaid reservation is released.
    pub reservation_auto_expiration: DateTime<Utc>,
}

/// Emitted once seats for the order are held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderReservationCompleted {
    /// The order identifier.
    pub order_id: Uuid,
    /// The seats actually held, possibly fewer than requested.
    pub seats: Vec<SeatQuantity>,
    /// Instant after which the reservation is released.
    pub reservation_expiration: DateTime<Utc>,
}

/// Emitted when the order has been paid for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderConfirmed {
    /// The order identifier.
    pub order_id: Uuid,
}

/// Emitted when the order is abandoned (timed out or not paid).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderExpired {
    /// The order identifier.
    pub order_id: Uuid,
}

/// Event payload variants for the `Order` aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderEvent {
    /// An order was placed.
    OrderPlaced(OrderPlaced),
    /// Seats for the order were reserved.
    OrderReservationCompleted(OrderReservationCompleted),
    /// The order was confirmed.
    OrderConfirmed(OrderConfirmed),
    /// The order expired.
    OrderExpired(OrderExpired),
}

impl DomainEvent for OrderEvent {
    const EVENT_TYPES: &'static [&'static str] = &[
        ORDER_PLACED_EVENT_TYPE,
        ORDER_RESERVATION_COMPLETED_EVENT_TYPE,
        ORDER_CONFIRMED_EVENT_TYPE,
        ORDER_EXPIRED_EVENT_TYPE,
    ];

    fn event_type(&self) -> &'static str {
        match self {
            Self::OrderPlaced(_) => ORDER_PLACED_EVENT_TYPE,
            Self::OrderReservationCompleted(_) => ORDER_RESERVATION_COMPLETED_EVENT_TYPE,
            Self::OrderConfirmed(_) => ORDER_CONFIRMED_EVENT_TYPE,
            Self::OrderExpired(_) => ORDER_EXPIRED_EVENT_TYPE,
        }
    }
}

/// Emitted whenever the number of seats still on sale changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailableSeatsChanged {
    /// The conference identifier.
    pub conference_id: Uuid,
    /// Per seat type change.
    pub seats: Vec<SeatDelta>,
}

/// Emitted when seats are held for a reservation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatsReserved {
    /// The conference identifier.
    pub conference_id: Uuid,
    /// The reservation identifier (the order identifier).
    pub reservation_id: Uuid,
    /// All seats now held by the reservation.
    pub reservation_details: Vec<SeatQuantity>,
}

/// Emitted when held seats are sold for good.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatsReservationCommitted {
    /// The conference identifier.
    pub conference_id: Uuid,
    /// The reservation identifier.
    pub reservation_id: Uuid,
}

/// Emitted when held seats are released.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeatsReservationCancelled {
    /// The conference identifier.
    pub conference_id: Uuid,
    /// The reservation identifier.
    pub reservation_id: Uuid,
    /// The seats returned to sale.
    pub released: Vec<SeatQuantity>,
}

/// Event payload variants for the `SeatsAvailability` aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SeatsAvailabilityEvent {
    /// Seats on sale changed.
    AvailableSeatsChanged(AvailableSeatsChanged),
    /// Seats were held for a reservation.
    SeatsReserved(SeatsReserved),
    /// A reservation was committed.
    SeatsReservationCommitted(SeatsReservationCommitted),
    /// A reservation was cancelled.
    SeatsReservationCancelled(SeatsReservationCancelled),
}

impl DomainEvent for SeatsAvailabilityEvent {
    const EVENT_TYPES: &'static [&'static str] = &[
        AVAILABLE_SEATS_CHANGED_EVENT_TYPE,
        SEATS_RESERVED_EVENT_TYPE,
        SEATS_RESERVATION_COMMITTED_EVENT_TYPE,
        SEATS_RESERVATION_CANCELLED_EVENT_TYPE,
    ];

    fn event_type(&self) -> &'static str {
        match self {
            Self::AvailableSeatsChanged(_) => AVAILABLE_SEATS_CHANGED_EVENT_TYPE,
            Self::SeatsReserved(_) => SEATS_RESERVED_EVENT_TYPE,
            Self::SeatsReservationCommitted(_) => SEATS_RESERVATION_COMMITTED_EVENT_TYPE,
            Self::SeatsReservationCancelled(_) => SEATS_RESERVATION_CANCELLED_EVENT_TYPE,
        }
    }
}

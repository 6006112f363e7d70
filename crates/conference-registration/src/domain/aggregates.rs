//! Aggregate roots for the Registration context.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use conference_core::aggregate::{AggregateState, EventSourced};
use conference_core::clock::Clock;
use conference_core::error::DomainError;
use uuid::Uuid;

use super::events::{
    AvailableSeatsChanged, OrderConfirmed, OrderEvent, OrderExpired, OrderLine, OrderPlaced,
    OrderReservationCompleted, SeatDelta, SeatQuantity, SeatsAvailabilityEvent,
    SeatsReservationCancelled, SeatsReservationCommitted, SeatsReserved,
};

/// Lifecycle of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStatus {
    /// Placed, seats not yet held.
    Pending,
    /// Seats held, awaiting payment.
    ReservationCompleted,
    /// Paid for.
    Confirmed,
    /// Abandoned.
    Expired,
}

/// A registrant's order for conference seats.
#[derive(Debug)]
pub struct Order {
    state: AggregateState<OrderEvent>,
    status: OrderStatus,
    conference_id: Uuid,
    lines: Vec<OrderLine>,
    reserved_seats: Vec<SeatQuantity>,
    reservation_expiration: Option<DateTime<Utc>>,
}

impl Order {
    /// Places an order, producing an `OrderPlaced` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if no seats are requested or a line
    /// asks for zero seats.
    pub fn place(
        id: Uuid,
        conference_id: Uuid,
        lines: Vec<OrderLine>,
        reservation_auto_expiration: DateTime<Utc>,
        clock: &dyn Clock,
    ) -> Result<Self, DomainError> {
        if lines.is_empty() || lines.iter().any(|line| line.quantity == 0) {
            return Err(DomainError::Validation(
                "an order needs at least one seat on every line".into(),
            ));
        }
        let mut order = Self::from_id(id);
        order.update(
            OrderEvent::OrderPlaced(OrderPlaced {
                order_id: id,
                conference_id,
                lines,
                reservation_auto_expiration,
            }),
            clock,
        );
        Ok(order)
    }

    /// Records the seats held for the order. May be repeated while the order
    /// is awaiting payment.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` once the order is confirmed or
    /// expired.
    pub fn mark_as_reserved(
        &mut self,
        expiration: DateTime<Utc>,
        seats: Vec<SeatQuantity>,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        self.ensure_open("reserve")?;
        self.update(
            OrderEvent::OrderReservationCompleted(OrderReservationCompleted {
                order_id: self.id(),
                seats,
                reservation_expiration: expiration,
            }),
            clock,
        );
        Ok(())
    }

    /// Confirms a reserved order.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::OutOfOrder` while the seat reservation has not
    /// been recorded yet, and `DomainError::Validation` once the order is
    /// confirmed or expired.
    pub fn confirm(&mut self, clock: &dyn Clock) -> Result<(), DomainError> {
        match self.status {
            OrderStatus::ReservationCompleted => {}
            OrderStatus::Pending => {
                return Err(DomainError::OutOfOrder(format!(
                    "order {} has no seat reservation yet",
                    self.id()
                )));
            }
            OrderStatus::Confirmed | OrderStatus::Expired => return Err(self.invalid("confirm")),
        }
        self.update(
            OrderEvent::OrderConfirmed(OrderConfirmed {
                order_id: self.id(),
            }),
            clock,
        );
        Ok(())
    }

    /// Abandons the order, producing an `OrderExpired` event.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` once the order is confirmed or
    /// expired.
    pub fn reject(&mut self, clock: &dyn Clock) -> Result<(), DomainError> {
        self.ensure_open("reject")?;
        self.update(
            OrderEvent::OrderExpired(OrderExpired {
                order_id: self.id(),
            }),
            clock,
        );
        Ok(())
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn status(&self) -> OrderStatus {
        self.status
    }

    /// The conference the order is for.
    #[must_use]
    pub fn conference_id(&self) -> Uuid {
        self.conference_id
    }

    /// The seats requested.
    #[must_use]
    pub fn lines(&self) -> &[OrderLine] {
        &self.lines
    }

    /// The seats held, once reserved.
    #[must_use]
    pub fn reserved_seats(&self) -> &[SeatQuantity] {
        &self.reserved_seats
    }

    /// When the current reservation lapses, once reserved.
    #[must_use]
    pub fn reservation_expiration(&self) -> Option<DateTime<Utc>> {
        self.reservation_expiration
    }

    fn ensure_open(&self, operation: &str) -> Result<(), DomainError> {
        match self.status {
            OrderStatus::Pending | OrderStatus::ReservationCompleted => Ok(()),
            OrderStatus::Confirmed | OrderStatus::Expired => Err(self.invalid(operation)),
        }
    }

    fn invalid(&self, operation: &str) -> DomainError {
        DomainError::Validation(format!(
            "cannot {operation} order {} in state {:?}",
            self.id(),
            self.status
        ))
    }
}

impl EventSourced for Order {
    type Event = OrderEvent;
    const AGGREGATE_TYPE: &'static str = "order";

    fn from_id(id: Uuid) -> Self {
        Self {
            state: AggregateState::new(id),
            status: OrderStatus::Pending,
            conference_id: Uuid::nil(),
            lines: Vec::new(),
            reserved_seats: Vec::new(),
            reservation_expiration: None,
        }
    }

    fn state(&self) -> &AggregateState<OrderEvent> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AggregateState<OrderEvent> {
        &mut self.state
    }

    fn mutate(&mut self, event: &OrderEvent) {
        match event {
            OrderEvent::OrderPlaced(e) => {
                self.status = OrderStatus::Pending;
                self.conference_id = e.conference_id;
                self.lines.clone_from(&e.lines);
            }
            OrderEvent::OrderReservationCompleted(e) => {
                self.status = OrderStatus::ReservationCompleted;
                self.reserved_seats.clone_from(&e.seats);
                self.reservation_expiration = Some(e.reservation_expiration);
            }
            OrderEvent::OrderConfirmed(_) => self.status = OrderStatus::Confirmed,
            OrderEvent::OrderExpired(_) => self.status = OrderStatus::Expired,
        }
    }
}

/// Seat inventory of one conference, keyed by the conference id.
///
/// `remaining` counts seats still on sale per seat type; seats held by a
/// pending reservation are not on sale until the reservation is cancelled.
#[derive(Debug)]
pub struct SeatsAvailability {
    state: AggregateState<SeatsAvailabilityEvent>,
    remaining: BTreeMap<Uuid, i64>,
    pending_reservations: BTreeMap<Uuid, Vec<SeatQuantity>>,
}

impl SeatsAvailability {
    /// Creates an empty inventory for `conference_id`. Nothing is recorded
    /// until seats are added.
    #[must_use]
    pub fn new(conference_id: Uuid) -> Self {
        Self::from_id(conference_id)
    }

    /// Puts `quantity` more seats of `seat_type` on sale.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` if `quantity` is zero.
    pub fn add_seats(
        &mut self,
        seat_type: Uuid,
        quantity: u32,
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if quantity == 0 {
            return Err(DomainError::Validation("cannot add zero seats".into()));
        }
        self.update(
            SeatsAvailabilityEvent::AvailableSeatsChanged(AvailableSeatsChanged {
                conference_id: self.id(),
                seats: vec![SeatDelta {
                    seat_type,
                    quantity: i64::from(quantity),
                }],
            }),
            clock,
        );
        Ok(())
    }

    /// Holds seats for `reservation_id`, replacing whatever it held before.
    ///
    /// Each seat type gets `min(wanted, on sale + already held)` seats.
    /// Produces `SeatsReserved` with the seats now held and, when the count
    /// on sale moved, `AvailableSeatsChanged`.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::Validation` for a seat type never put on sale.
    pub fn make_reservation(
        &mut self,
        reservation_id: Uuid,
        wanted: &[SeatQuantity],
        clock: &dyn Clock,
    ) -> Result<(), DomainError> {
        if let Some(unknown) = wanted
            .iter()
            .find(|seat| !self.remaining.contains_key(&seat.seat_type))
        {
            return Err(DomainError::Validation(format!(
                "seat type {} is not on sale for conference {}",
                unknown.seat_type,
                self.id()
            )));
        }

        let held = by_seat_type(
            self.pending_reservations
                .get(&reservation_id)
                .map_or(&[][..], Vec::as_slice),
        );
        let requested = by_seat_type(wanted);
        let seat_types: BTreeSet<Uuid> = held.keys().chain(requested.keys()).copied().collect();

        let mut details = Vec::new();
        let mut deltas = Vec::new();
        for seat_type in seat_types {
            let existing = held.get(&seat_type).copied().unwrap_or(0);
            let on_sale = self.remaining.get(&seat_type).copied().unwrap_or(0);
            let available =
                u32::try_from((on_sale + i64::from(existing)).max(0)).unwrap_or(u32::MAX);
            let granted = requested.get(&seat_type).copied().unwrap_or(0).min(available);

            if granted > 0 {
                details.push(SeatQuantity {
                    seat_type,
                    quantity: granted,
                });
            }
            let delta = i64::from(existing) - i64::from(granted);
            if delta != 0 {
                deltas.push(SeatDelta {
                    seat_type,
                    quantity: delta,
                });
            }
        }

        let conference_id = self.id();
        self.update(
            SeatsAvailabilityEvent::SeatsReserved(SeatsReserved {
                conference_id,
                reservation_id,
                reservation_details: details,
            }),
            clock,
        );
        if !deltas.is_empty() {
            self.update(
                SeatsAvailabilityEvent::AvailableSeatsChanged(AvailableSeatsChanged {
                    conference_id,
                    seats: deltas,
                }),
                clock,
            );
        }
        Ok(())
    }

    /// Sells the seats held by `reservation_id` for good. Unknown
    /// reservations are ignored.
    pub fn commit_reservation(&mut self, reservation_id: Uuid, clock: &dyn Clock) {
        if !self.pending_reservations.contains_key(&reservation_id) {
            return;
        }
        self.update(
            SeatsAvailabilityEvent::SeatsReservationCommitted(SeatsReservationCommitted {
                conference_id: self.id(),
                reservation_id,
            }),
            clock,
        );
    }

    /// Returns the seats held by `reservation_id` to sale. Unknown
    /// reservations are ignored.
    pub fn cancel_reservation(&mut self, reservation_id: Uuid, clock: &dyn Clock) {
        let Some(released) = self.pending_reservations.get(&reservation_id).cloned() else {
            return;
        };
        let conference_id = self.id();
        let returned: Vec<SeatDelta> = released
            .iter()
            .map(|seat| SeatDelta {
                seat_type: seat.seat_type,
                quantity: i64::from(seat.quantity),
            })
            .collect();
        self.update(
            SeatsAvailabilityEvent::SeatsReservationCancelled(SeatsReservationCancelled {
                conference_id,
                reservation_id,
                released,
            }),
            clock,
        );
        if !returned.is_empty() {
            self.update(
                SeatsAvailabilityEvent::AvailableSeatsChanged(AvailableSeatsChanged {
                    conference_id,
                    seats: returned,
                }),
                clock,
            );
        }
    }

    /// Seats of `seat_type` still on sale.
    #[must_use]
    pub fn remaining_seats(&self, seat_type: Uuid) -> i64 {
        self.remaining.get(&seat_type).copied().unwrap_or(0)
    }

    /// Seats currently held by `reservation_id`, if it is pending.
    #[must_use]
    pub fn reservation(&self, reservation_id: Uuid) -> Option<&[SeatQuantity]> {
        self.pending_reservations
            .get(&reservation_id)
            .map(Vec::as_slice)
    }
}

fn by_seat_type(seats: &[SeatQuantity]) -> BTreeMap<Uuid, u32> {
    let mut totals = BTreeMap::new();
    for seat in seats {
        let total: &mut u32 = totals.entry(seat.seat_type).or_default();
        *total = total.saturating_add(seat.quantity);
    }
    totals
}

impl EventSourced for SeatsAvailability {
    type Event = SeatsAvailabilityEvent;
    const AGGREGATE_TYPE: &'static str = "seats_availability";

    fn from_id(id: Uuid) -> Self {
        Self {
            state: AggregateState::new(id),
            remaining: BTreeMap::new(),
            pending_reservations: BTreeMap::new(),
        }
    }

    fn state(&self) -> &AggregateState<SeatsAvailabilityEvent> {
        &self.state
    }

    fn state_mut(&mut self) -> &mut AggregateState<SeatsAvailabilityEvent> {
        &mut self.state
    }

    fn mutate(&mut self, event: &SeatsAvailabilityEvent) {
        match event {
            SeatsAvailabilityEvent::AvailableSeatsChanged(e) => {
                for seat in &e.seats {
                    *self.remaining.entry(seat.seat_type).or_insert(0) += seat.quantity;
                }
            }
            SeatsAvailabilityEvent::SeatsReserved(e) => {
                if e.reservation_details.is_empty() {
                    self.pending_reservations.remove(&e.reservation_id);
                } else {
                    self.pending_reservations
                        .insert(e.reservation_id, e.reservation_details.clone());
                }
            }
            SeatsAvailabilityEvent::SeatsReservationCommitted(SeatsReservationCommitted {
                reservation_id,
                ..
            })
            | SeatsAvailabilityEvent::SeatsReservationCancelled(SeatsReservationCancelled {
                reservation_id,
                ..
            }) => {
                self.pending_reservations.remove(reservation_id);
            }
        }
    }
}

//! Conference system: Registration bounded context.
//!
//! Responsible for orders, per-conference seat availability, and the
//! registration process that ties seat reservation to payment.

pub mod application;
pub mod domain;

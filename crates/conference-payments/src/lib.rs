//! Conference system: Payments bounded context.
//!
//! Tracks payments taken through an external processor, from initiation to
//! completion or rejection.

pub mod application;
pub mod domain;

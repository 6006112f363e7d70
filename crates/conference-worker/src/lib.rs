//! Conference system background worker.
//!
//! Reads configuration, wires the Postgres-backed repositories and queues to
//! the domain handlers, and runs one receiver per queue until shut down.

pub mod config;
pub mod error;
pub mod wiring;

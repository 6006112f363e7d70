//! Conference Core: event-sourcing and messaging abstractions.
//!
//! This crate defines the aggregate framework, the repository and transport
//! contracts, the command/event buses and the process-manager contract that
//! every other crate builds on. It contains no database code.

pub mod aggregate;
pub mod bus;
pub mod clock;
pub mod command;
pub mod envelope;
pub mod error;
pub mod event;
pub mod message;
pub mod process_manager;
pub mod repository;
pub mod serialization;
pub mod transport;

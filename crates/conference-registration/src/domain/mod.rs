//! Registration aggregates, commands, events and the registration process.

pub mod aggregates;
pub mod commands;
pub mod events;
pub mod process;

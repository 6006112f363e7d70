//! Payment command handling.

pub mod command_handlers;
pub mod message_handlers;

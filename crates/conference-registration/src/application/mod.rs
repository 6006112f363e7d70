//! Registration command handling and process routing.

pub mod command_handlers;
pub mod message_handlers;
pub mod process_router;

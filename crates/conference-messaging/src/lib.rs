//! Message receivers and dispatchers.
//!
//! A [`receiver::MessageReceiver`] polls one durable queue and hands each
//! deliverable message to a [`conference_core::transport::MessageHandler`],
//! usually a [`dispatcher::MessageDispatcher`] routing by payload type.

pub mod dispatcher;
pub mod receiver;
pub mod retry;

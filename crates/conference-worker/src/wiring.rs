//! Connects queues, repositories and handlers.
//!
//! Two receivers run side by side:
//!
//! | queue      | routes                                                                |
//! |------------|-----------------------------------------------------------------------|
//! | `commands` | payment, order and seat commands; the registration expiration command |
//! | `events`   | events the registration process reacts to; every other event is acked |

use std::sync::Arc;

use chrono::TimeDelta;
use conference_core::clock::Clock;
use conference_core::error::DomainError;
use conference_core::event::DomainEvent;
use conference_core::process_manager::{ProcessManagerRepository, ProcessStateRepository};
use conference_core::repository::{EventRepository, EventSourcedRepository};
use conference_core::transport::{COMMANDS_QUEUE, EVENTS_QUEUE, MessageHandler, MessageQueue};
use conference_messaging::dispatcher::MessageDispatcher;
use conference_messaging::receiver::{MessageReceiver, ReceiverConfig};
use conference_payments::application::message_handlers::{
    PAYMENT_COMMAND_TYPES, PaymentCommandHandler,
};
use conference_payments::domain::events::PaymentEvent;
use conference_registration::application::message_handlers::{
    ORDER_COMMAND_TYPES, OrderCommandHandler, SEATS_COMMAND_TYPES, SeatsAvailabilityCommandHandler,
};
use conference_registration::application::process_router::{
    ROUTED_COMMAND_TYPES, ROUTED_EVENT_TYPES, RegistrationProcessRouter,
};
use conference_registration::domain::events::{OrderEvent, SeatsAvailabilityEvent};
use conference_store::pg_event_repository::PgEventRepository;
use conference_store::pg_message_queue::PgMessageQueue;
use conference_store::pg_process_repository::PgProcessRepository;
use sqlx::PgPool;
use tracing::info;

use crate::config::WorkerConfig;

/// The handler for each queue.
pub struct Dispatchers {
    /// Handles the `commands` queue.
    pub commands: Arc<dyn MessageHandler>,
    /// Handles the `events` queue.
    pub events: Arc<dyn MessageHandler>,
}

impl Dispatchers {
    /// Builds both dispatchers over the given stores.
    ///
    /// # Panics
    ///
    /// Panics if two handlers claim the same type tag, which is a wiring
    /// bug caught at startup.
    #[must_use]
    pub fn new(
        events: &Arc<dyn EventRepository>,
        processes: &Arc<dyn ProcessStateRepository>,
        clock: &Arc<dyn Clock>,
        reservation_window: TimeDelta,
    ) -> Self {
        let payments: Arc<dyn MessageHandler> = Arc::new(PaymentCommandHandler::new(
            EventSourcedRepository::new(Arc::clone(events), Arc::clone(clock)),
            Arc::clone(clock),
        ));
        let orders: Arc<dyn MessageHandler> = Arc::new(OrderCommandHandler::new(
            EventSourcedRepository::new(Arc::clone(events), Arc::clone(clock)),
            Arc::clone(clock),
            reservation_window,
        ));
        let seats: Arc<dyn MessageHandler> = Arc::new(SeatsAvailabilityCommandHandler::new(
            EventSourcedRepository::new(Arc::clone(events), Arc::clone(clock)),
            Arc::clone(clock),
        ));
        let router: Arc<dyn MessageHandler> = Arc::new(RegistrationProcessRouter::new(
            ProcessManagerRepository::new(Arc::clone(processes), Arc::clone(clock)),
            Arc::clone(clock),
        ));

        let commands = MessageDispatcher::new()
            .route_all(PAYMENT_COMMAND_TYPES, &payments)
            .route_all(ORDER_COMMAND_TYPES, &orders)
            .route_all(SEATS_COMMAND_TYPES, &seats)
            .route_all(ROUTED_COMMAND_TYPES, &router);

        let mut events = MessageDispatcher::new().route_all(ROUTED_EVENT_TYPES, &router);
        let published = OrderEvent::EVENT_TYPES
            .iter()
            .chain(SeatsAvailabilityEvent::EVENT_TYPES)
            .chain(PaymentEvent::EVENT_TYPES);
        for type_tag in published {
            if !events.handles(type_tag) {
                events = events.ignore(*type_tag);
            }
        }

        Self {
            commands: Arc::new(commands),
            events: Arc::new(events),
        }
    }
}

/// Runs one receiver per queue.
pub struct Worker {
    commands: MessageReceiver,
    events: MessageReceiver,
    dispatchers: Dispatchers,
}

impl Worker {
    /// Creates a stopped worker over the given queues.
    #[must_use]
    pub fn new(
        command_queue: Arc<dyn MessageQueue>,
        event_queue: Arc<dyn MessageQueue>,
        dispatchers: Dispatchers,
        clock: &Arc<dyn Clock>,
        config: &ReceiverConfig,
    ) -> Self {
        Self {
            commands: MessageReceiver::new(command_queue, Arc::clone(clock), config.clone()),
            events: MessageReceiver::new(event_queue, Arc::clone(clock), config.clone()),
            dispatchers,
        }
    }

    /// Creates a stopped worker backed by Postgres.
    #[must_use]
    pub fn postgres(pool: &PgPool, config: &WorkerConfig, clock: &Arc<dyn Clock>) -> Self {
        let events: Arc<dyn EventRepository> = Arc::new(PgEventRepository::new(pool.clone()));
        let processes: Arc<dyn ProcessStateRepository> =
            Arc::new(PgProcessRepository::new(pool.clone()));
        let dispatchers = Dispatchers::new(&events, &processes, clock, config.reservation_window);

        Self::new(
            Arc::new(PgMessageQueue::new(pool.clone(), COMMANDS_QUEUE, config.lease)),
            Arc::new(PgMessageQueue::new(pool.clone(), EVENTS_QUEUE, config.lease)),
            dispatchers,
            clock,
            &config.receiver_config(),
        )
    }

    /// Starts both receivers.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ReceiverAlreadyStarted` if the worker is
    /// already running.
    pub fn start(&mut self) -> Result<(), DomainError> {
        self.commands.start(Arc::clone(&self.dispatchers.commands))?;
        self.events.start(Arc::clone(&self.dispatchers.events))?;
        info!("worker started");
        Ok(())
    }

    /// Stops both receivers, waiting for in-flight messages.
    pub async fn stop(&mut self) {
        self.commands.stop().await;
        self.events.stop().await;
        info!("worker stopped");
    }

    /// Returns true while the receivers are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.commands.is_running() || self.events.is_running()
    }
}

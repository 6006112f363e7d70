//! Shared helpers for worker integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use conference_core::bus::CommandBus;
use conference_core::clock::Clock;
use conference_core::process_manager::{ProcessManagerRepository, ProcessStateRepository};
use conference_core::repository::{EventRepository, EventSourcedRepository};
use conference_core::transport::{COMMANDS_QUEUE, EVENTS_QUEUE};
use conference_messaging::receiver::{Delivery, MessageReceiver, ReceiverConfig};
use conference_registration::domain::aggregates::{Order, SeatsAvailability};
use conference_registration::domain::process::RegistrationProcessManager;
use conference_store::pg_event_repository::PgEventRepository;
use conference_store::pg_message_queue::{PgMessageQueue, PgMessageSender};
use conference_store::pg_process_repository::PgProcessRepository;
use conference_test_support::ManualClock;
use conference_worker::wiring::Dispatchers;
use chrono::TimeDelta;
use sqlx::PgPool;

/// The whole system over one database, driven message by message.
pub struct TestSystem {
    pub pool: PgPool,
    pub clock: Arc<ManualClock>,
    pub bus: CommandBus,
    dispatchers: Dispatchers,
    commands: MessageReceiver,
    events: MessageReceiver,
}

impl TestSystem {
    pub fn new(pool: PgPool) -> Self {
        let clock = Arc::new(ManualClock::default());
        let dyn_clock: Arc<dyn Clock> = clock.clone();
        let events: Arc<dyn EventRepository> = Arc::new(PgEventRepository::new(pool.clone()));
        let processes: Arc<dyn ProcessStateRepository> =
            Arc::new(PgProcessRepository::new(pool.clone()));
        let lease = TimeDelta::seconds(30);

        Self {
            dispatchers: Dispatchers::new(&events, &processes, &dyn_clock, TimeDelta::minutes(15)),
            commands: MessageReceiver::new(
                Arc::new(PgMessageQueue::new(pool.clone(), COMMANDS_QUEUE, lease)),
                dyn_clock.clone(),
                ReceiverConfig::default(),
            ),
            events: MessageReceiver::new(
                Arc::new(PgMessageQueue::new(pool.clone(), EVENTS_QUEUE, lease)),
                dyn_clock.clone(),
                ReceiverConfig::default(),
            ),
            bus: CommandBus::new(
                Arc::new(PgMessageSender::new(pool.clone(), COMMANDS_QUEUE)),
                dyn_clock,
            ),
            pool,
            clock,
        }
    }

    /// Delivers messages on both queues until neither has anything visible.
    pub async fn drain(&self) {
        loop {
            let command = self
                .commands
                .receive_once(self.dispatchers.commands.as_ref())
                .await
                .unwrap();
            let event = self
                .events
                .receive_once(self.dispatchers.events.as_ref())
                .await
                .unwrap();
            assert_ne!(command, Delivery::DeadLettered);
            assert_ne!(event, Delivery::DeadLettered);
            if command == Delivery::Idle && event == Delivery::Idle {
                break;
            }
        }
    }

    pub fn orders(&self) -> EventSourcedRepository<Order> {
        EventSourcedRepository::new(
            Arc::new(PgEventRepository::new(self.pool.clone())),
            self.clock.clone(),
        )
    }

    pub fn seats(&self) -> EventSourcedRepository<SeatsAvailability> {
        EventSourcedRepository::new(
            Arc::new(PgEventRepository::new(self.pool.clone())),
            self.clock.clone(),
        )
    }

    pub fn registrations(&self) -> ProcessManagerRepository<RegistrationProcessManager> {
        ProcessManagerRepository::new(
            Arc::new(PgProcessRepository::new(self.pool.clone())),
            self.clock.clone(),
        )
    }

    /// Rows still in the `messages` table, dead-lettered or not.
    pub async fn pending_rows(&self) -> i64 {
        sqlx::query_scalar("SELECT COUNT(*) FROM messages")
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}

//! Polling receiver for a durable queue.
//!
//! The receiver claims one message at a time, hands it to its handler, and
//! settles the claim from the outcome:
//!
//! | outcome                                  | queue action  |
//! |------------------------------------------|---------------|
//! | handled                                  | `complete`    |
//! | expired before delivery                  | `complete`    |
//! | `Serialization` / `MissingHandler` error | `dead_letter` |
//! | any other handler error                  | `abandon`     |
//!
//! Queue failures never stop the loop; it backs off and tries again.

use std::sync::Arc;
use std::time::Duration;

use conference_core::clock::Clock;
use conference_core::error::DomainError;
use conference_core::transport::{MessageHandler, MessageQueue};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::retry::RetryPolicy;

/// Timing knobs for a [`MessageReceiver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceiverConfig {
    /// Pause after finding the queue empty.
    pub poll_interval: Duration,
    /// Pause after a handler failure, before claiming again.
    pub failure_delay: Duration,
    /// Backoff while the queue itself is failing.
    pub retry: RetryPolicy,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(500),
            failure_delay: Duration::from_secs(1),
            retry: RetryPolicy::default(),
        }
    }
}

/// What happened on one claim attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Nothing deliverable was on the queue.
    Idle,
    /// The handler succeeded and the message was removed.
    Handled,
    /// The message's time-to-live had elapsed; it was removed unhandled.
    Expired,
    /// The handler failed; the message stays for redelivery.
    Failed,
    /// The message can never be handled and was parked.
    DeadLettered,
}

struct Running {
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// Consumes one queue on a background task.
pub struct MessageReceiver {
    queue: Arc<dyn MessageQueue>,
    clock: Arc<dyn Clock>,
    config: ReceiverConfig,
    running: Option<Running>,
}

impl MessageReceiver {
    /// Creates a stopped receiver for `queue`.
    #[must_use]
    pub fn new(queue: Arc<dyn MessageQueue>, clock: Arc<dyn Clock>, config: ReceiverConfig) -> Self {
        Self {
            queue,
            clock,
            config,
            running: None,
        }
    }

    /// Returns true between `start` and `stop`.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    /// Starts delivering messages to `handler` on a spawned task.
    ///
    /// # Errors
    ///
    /// Returns `DomainError::ReceiverAlreadyStarted` if the receiver is
    /// already running.
    pub fn start(&mut self, handler: Arc<dyn MessageHandler>) -> Result<(), DomainError> {
        if self.running.is_some() {
            return Err(DomainError::ReceiverAlreadyStarted);
        }
        let (shutdown, shutdown_rx) = watch::channel(false);
        let worker = Worker {
            queue: Arc::clone(&self.queue),
            clock: Arc::clone(&self.clock),
            config: self.config.clone(),
            handler,
        };
        let span = info_span!("receiver", queue = %self.queue.name());
        let task = tokio::spawn(worker.run(shutdown_rx).instrument(span));
        info!(queue = %self.queue.name(), "receiver started");
        self.running = Some(Running { shutdown, task });
        Ok(())
    }

    /// Signals the loop to stop and waits for the in-flight message, if any,
    /// to finish. Calling `stop` on a stopped receiver does nothing.
    pub async fn stop(&mut self) {
        let Some(running) = self.running.take() else {
            return;
        };
        // The task may already have exited; there is nobody to tell then.
        let _ = running.shutdown.send(true);
        if let Err(e) = running.task.await {
            error!(queue = %self.queue.name(), error = %e, "receiver task ended abnormally");
        }
        info!(queue = %self.queue.name(), "receiver stopped");
    }

    /// Claims and settles at most one message on the caller's task.
    ///
    /// # Errors
    ///
    /// Returns the queue's error if claiming or settling failed.
    pub async fn receive_once(&self, handler: &dyn MessageHandler) -> Result<Delivery, DomainError> {
        deliver_next(self.queue.as_ref(), handler, self.clock.as_ref()).await
    }
}

struct Worker {
    queue: Arc<dyn MessageQueue>,
    clock: Arc<dyn Clock>,
    config: ReceiverConfig,
    handler: Arc<dyn MessageHandler>,
}

impl Worker {
    async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut failures: u32 = 0;
        while !*shutdown.borrow() {
            let outcome =
                deliver_next(self.queue.as_ref(), self.handler.as_ref(), self.clock.as_ref()).await;
            let pause = match outcome {
                Ok(Delivery::Idle) => {
                    failures = 0;
                    Some(self.config.poll_interval)
                }
                Ok(Delivery::Failed) => {
                    failures = 0;
                    Some(self.config.failure_delay)
                }
                Ok(_) => {
                    failures = 0;
                    None
                }
                Err(e) => {
                    let delay = self.config.retry.delay_for_attempt(failures);
                    failures = failures.saturating_add(1);
                    warn!(
                        error = %e,
                        attempt = failures,
                        delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                        "queue unavailable, backing off"
                    );
                    Some(delay)
                }
            };
            if let Some(pause) = pause {
                tokio::select! {
                    () = tokio::time::sleep(pause) => {}
                    changed = shutdown.changed() => {
                        if changed.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }
}

async fn deliver_next(
    queue: &dyn MessageQueue,
    handler: &dyn MessageHandler,
    clock: &dyn Clock,
) -> Result<Delivery, DomainError> {
    let now = clock.now();
    let Some(received) = queue.claim(now).await? else {
        return Ok(Delivery::Idle);
    };

    if received.message.is_expired_at(now) {
        debug!(
            id = received.id,
            message_id = ?received.message.message_id,
            "dropping expired message"
        );
        queue.complete(received.id).await?;
        return Ok(Delivery::Expired);
    }

    match handler.handle(&received).await {
        Ok(()) => {
            queue.complete(received.id).await?;
            debug!(id = received.id, "message handled");
            Ok(Delivery::Handled)
        }
        Err(e @ (DomainError::Serialization(_) | DomainError::MissingHandler { .. })) => {
            error!(
                id = received.id,
                correlation_id = ?received.message.correlation_id,
                error = %e,
                "message cannot be handled, dead-lettering"
            );
            queue.dead_letter(received.id, &e.to_string()).await?;
            Ok(Delivery::DeadLettered)
        }
        Err(e) => {
            warn!(
                id = received.id,
                delivery_count = received.delivery_count,
                correlation_id = ?received.message.correlation_id,
                error = %e,
                "handler failed, message left for redelivery"
            );
            queue.abandon(received.id).await?;
            Ok(Delivery::Failed)
        }
    }
}

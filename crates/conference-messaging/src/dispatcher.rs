//! Routes received messages to handlers by payload type tag.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use conference_core::error::DomainError;
use conference_core::message::ReceivedMessage;
use conference_core::serialization::TaggedPayload;
use conference_core::transport::MessageHandler;
use tracing::trace;

enum Route {
    Handler(Arc<dyn MessageHandler>),
    Ignore,
}

/// A [`MessageHandler`] that forwards each message to the handler
/// registered for its type tag.
///
/// Every tag maps to exactly one route. Messages whose tag was never
/// registered fail with `DomainError::Serialization` and get dead-lettered by
/// the receiver.
#[derive(Default)]
pub struct MessageDispatcher {
    routes: HashMap<&'static str, Route>,
}

impl MessageDispatcher {
    /// Creates a dispatcher with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Routes `type_tag` to `handler`.
    ///
    /// # Panics
    ///
    /// Panics if `type_tag` already has a route; registration happens once at
    /// startup.
    #[must_use]
    pub fn route(mut self, type_tag: &'static str, handler: Arc<dyn MessageHandler>) -> Self {
        self.insert(type_tag, Route::Handler(handler));
        self
    }

    /// Routes every tag in `type_tags` to the same handler.
    ///
    /// # Panics
    ///
    /// As [`Self::route`].
    #[must_use]
    pub fn route_all(mut self, type_tags: &[&'static str], handler: &Arc<dyn MessageHandler>) -> Self {
        for type_tag in type_tags {
            self.insert(type_tag, Route::Handler(Arc::clone(handler)));
        }
        self
    }

    /// Acknowledges `type_tag` without handling it.
    ///
    /// # Panics
    ///
    /// As [`Self::route`].
    #[must_use]
    pub fn ignore(mut self, type_tag: &'static str) -> Self {
        self.insert(type_tag, Route::Ignore);
        self
    }

    /// Returns true if `type_tag` has a route.
    #[must_use]
    pub fn handles(&self, type_tag: &str) -> bool {
        self.routes.contains_key(type_tag)
    }

    fn insert(&mut self, type_tag: &'static str, route: Route) {
        let previous = self.routes.insert(type_tag, route);
        assert!(previous.is_none(), "duplicate route for {type_tag}");
    }
}

#[async_trait]
impl MessageHandler for MessageDispatcher {
    async fn handle(&self, message: &ReceivedMessage) -> Result<(), DomainError> {
        let tagged = TaggedPayload::decode(&message.message.body)?;
        match self.routes.get(tagged.type_tag.as_str()) {
            Some(Route::Handler(handler)) => handler.handle(message).await,
            Some(Route::Ignore) => {
                trace!(type_tag = %tagged.type_tag, "ignoring message");
                Ok(())
            }
            None => Err(DomainError::Serialization(format!(
                "no route for payload type {}",
                tagged.type_tag
            ))),
        }
    }
}

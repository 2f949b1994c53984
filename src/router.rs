//! Dispatch of normalized events to their registered handlers.
//!
//! The router is a name-keyed registry populated once at startup. Dispatch
//! isolates failures: a handler error is logged with full event context and
//! the stream moves on to the next event, so one bad payload can never stall
//! ingestion.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::BoxFuture;
use tracing::{debug, error, warn};

use crate::error::{IndexerError, IndexerResult};
use crate::normalize::NormalizedEvent;

/// A registered event handler.
///
/// Handlers take ownership of the event and return a boxed future so the
/// registry can hold heterogeneous closures behind one type.
pub type EventHandler =
    Arc<dyn Fn(NormalizedEvent) -> BoxFuture<'static, IndexerResult<()>> + Send + Sync>;

/// Name-keyed event handler registry.
#[derive(Default)]
pub struct EventRouter {
    handlers: HashMap<&'static str, EventHandler>,
}

impl EventRouter {
    /// Create an empty router.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for the event named `event`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexerError::DuplicateRegistration`] if a handler is
    /// already registered under that name. Silent replacement would mask a
    /// wiring bug, so registration is strict.
    pub fn register(&mut self, event: &'static str, handler: EventHandler) -> IndexerResult<()> {
        if self.handlers.contains_key(event) {
            return Err(IndexerError::duplicate_registration(event));
        }
        self.handlers.insert(event, handler);
        debug!(event, "Registered event handler");
        Ok(())
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Whether no handlers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch `event` to its handler.
    ///
    /// Events with no registered handler are dropped with a warning. Handler
    /// failures are logged and swallowed; dispatch never propagates an error
    /// to the ingest loop.
    pub async fn dispatch(&self, event: NormalizedEvent) {
        let name = event.name();
        let Some(handler) = self.handlers.get(name) else {
            warn!(event = name, "No handler registered, dropping event");
            return;
        };

        debug!(event = name, "Dispatching event");
        if let Err(e) = handler(event).await {
            error!(event = name, error = %e, "Event handler failed, skipping event");
        }
    }
}

impl std::fmt::Debug for EventRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.handlers.keys().collect();
        names.sort_unstable();
        f.debug_struct("EventRouter").field("events", &names).finish()
    }
}

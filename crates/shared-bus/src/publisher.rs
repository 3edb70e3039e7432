//! # Event Publisher
//!
//! Defines the publishing side of the event bus and the in-process
//! `EventBus` itself.
//!
//! ## Dispatch Model
//!
//! ```text
//! publish(event)
//!   │  lock ─ snapshot handlers for event.topic() ─ unlock
//!   │
//!   ├─ enter pending ─ spawn ─► handler A ─┐
//!   ├─ enter pending ─ spawn ─► handler B ─┤  each isolated:
//!   └─ enter pending ─ spawn ─► handler C ─┘  Err / panic → error! log
//!   │
//!   └─ return scheduled count (never awaits handlers)
//! ```
//!
//! There is no ordering between handlers of one event, nor between
//! topics. The lock is never held across a handler.

use crate::events::{Event, Topic};
use crate::pending::{PendingGuard, PendingTasks};
use crate::subscriber::{DynHandler, EventStream, SubscriberTable};
use async_trait::async_trait;
use forge_telemetry::{BUS_EVENTS_PUBLISHED, BUS_HANDLER_FAILURES};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace, warn};

/// Errors from bus construction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    /// The bus was created outside a Tokio runtime.
    #[error("event bus must be created inside a Tokio runtime")]
    NoRuntime,
}

/// Trait for publishing events to the bus.
///
/// This is the interface stages use to emit events for consumption by
/// other stages.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish an event to the bus.
    ///
    /// # Returns
    ///
    /// The number of handlers scheduled. Zero is not an error.
    async fn publish(&self, event: Event) -> usize;

    /// Get the total number of events published.
    fn events_published(&self) -> u64;
}

/// In-process, topic-keyed publish/subscribe bus.
///
/// Created once at process start and shared by `Arc` with every stage.
/// Handler tasks run on the Tokio runtime that was current when the bus
/// was built.
pub struct EventBus {
    /// Handler lists by topic.
    subscribers: Arc<SubscriberTable>,

    /// In-flight handler invocations.
    pending: Arc<PendingTasks>,

    /// Runtime that executes handler tasks.
    runtime: Handle,

    /// Total events published.
    events_published: AtomicU64,
}

impl EventBus {
    /// Create a bus bound to the current Tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics when called outside a Tokio runtime. Use [`EventBus::try_new`]
    /// to get an error instead.
    #[must_use]
    pub fn new() -> Self {
        Self::with_handle(Handle::current())
    }

    /// Create a bus bound to the current Tokio runtime, if there is one.
    pub fn try_new() -> Result<Self, BusError> {
        Handle::try_current()
            .map(Self::with_handle)
            .map_err(|_| BusError::NoRuntime)
    }

    /// Create a bus that spawns handlers on the given runtime.
    #[must_use]
    pub fn with_handle(runtime: Handle) -> Self {
        Self {
            subscribers: Arc::new(SubscriberTable::default()),
            pending: Arc::new(PendingTasks::new()),
            runtime,
            events_published: AtomicU64::new(0),
        }
    }

    /// Register a handler for a topic.
    ///
    /// Idempotent per (topic, handler identity). Returns `true` when the
    /// handler was newly added.
    pub fn subscribe(&self, topic: Topic, handler: DynHandler) -> bool {
        let name = handler.name().to_string();
        let added = self.subscribers.add(topic, handler);
        if added {
            debug!(topic = %topic, handler = %name, "Handler subscribed");
        } else {
            trace!(topic = %topic, handler = %name, "Handler already subscribed");
        }
        added
    }

    /// Remove a handler from a topic. Absent handlers are ignored.
    ///
    /// Returns `true` when a handler was removed.
    pub fn unsubscribe(&self, topic: Topic, handler: &DynHandler) -> bool {
        let removed = self.subscribers.remove(topic, handler);
        if removed {
            debug!(topic = %topic, handler = %handler.name(), "Handler unsubscribed");
        }
        removed
    }

    /// Drop every subscription. In-flight invocations keep running.
    pub fn clear(&self) {
        self.subscribers.clear();
        debug!("All subscriptions cleared");
    }

    /// Get a stream of events published on a topic.
    ///
    /// The stream's forwarding handler is unsubscribed when it is dropped.
    #[must_use]
    pub fn stream(&self, topic: Topic) -> EventStream {
        EventStream::subscribe(&self.subscribers, topic)
    }

    /// Number of handlers subscribed to a topic.
    #[must_use]
    pub fn subscriber_count(&self, topic: Topic) -> usize {
        self.subscribers.count(topic)
    }

    /// Number of handler invocations still in flight.
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.pending.count()
    }

    /// Wait until no handler invocation is in flight.
    ///
    /// Covers cascades: handlers that publish while running keep the bus
    /// busy until their follow-ups finish too.
    ///
    /// # Returns
    ///
    /// `true` when the bus drained, `false` when the timeout elapsed first.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        let pending = self.pending.count();
        if pending == 0 {
            return true;
        }

        info!(pending, "EventBus: waiting for pending handlers");
        match tokio::time::timeout(timeout, self.pending.wait_idle()).await {
            Ok(()) => {
                info!("EventBus: all handlers completed");
                true
            }
            Err(_) => {
                warn!(
                    pending = self.pending.count(),
                    timeout_ms = timeout.as_millis() as u64,
                    "EventBus: timeout reached while waiting for handlers"
                );
                false
            }
        }
    }
}

#[async_trait]
impl EventPublisher for EventBus {
    async fn publish(&self, event: Event) -> usize {
        let topic = event.topic();

        // Always increment counter (event was attempted)
        self.events_published.fetch_add(1, Ordering::Relaxed);
        BUS_EVENTS_PUBLISHED.with_label_values(&[topic.as_str()]).inc();

        let handlers = self.subscribers.snapshot(topic);
        if handlers.is_empty() {
            debug!(topic = %topic, "No subscribers for topic");
            return 0;
        }

        debug!(topic = %topic, handlers = handlers.len(), "Event published");

        let event = Arc::new(event);
        let scheduled = handlers.len();
        for handler in handlers {
            let guard = self.pending.enter();
            self.runtime
                .spawn(dispatch(topic, handler, Arc::clone(&event), guard));
        }
        scheduled
    }

    fn events_published(&self) -> u64 {
        self.events_published.load(Ordering::Relaxed)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Run one handler with failure isolation.
async fn dispatch(topic: Topic, handler: DynHandler, event: Arc<Event>, _guard: PendingGuard) {
    trace!(topic = %topic, handler = %handler.name(), "Dispatching");

    // `handle` itself runs inside the guarded future, so a panic while the
    // handler builds its future is caught too.
    let run = async { handler.handle(event).await };
    match AssertUnwindSafe(run).catch_unwind().await {
        Ok(Ok(())) => {
            trace!(topic = %topic, handler = %handler.name(), "Handler completed");
        }
        Ok(Err(e)) => {
            BUS_HANDLER_FAILURES
                .with_label_values(&[topic.as_str(), "error"])
                .inc();
            error!(
                topic = %topic,
                handler = %handler.name(),
                error = %format!("{e:#}"),
                "EventBus handler error"
            );
        }
        Err(panic) => {
            BUS_HANDLER_FAILURES
                .with_label_values(&[topic.as_str(), "panic"])
                .inc();
            error!(
                topic = %topic,
                handler = %handler.name(),
                panic = %panic_message(panic.as_ref()),
                "EventBus handler panicked"
            );
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

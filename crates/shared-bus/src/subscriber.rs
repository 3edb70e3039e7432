//! # Event Subscriber
//!
//! Defines the subscription side of the event bus: the handler contract,
//! the per-topic subscriber table and a `Stream` adapter for consumers that
//! prefer pulling events.

use crate::events::{Event, Topic};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Weak};
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::Stream;
use tracing::debug;

/// An async callback registered against one topic.
///
/// Identity is the `Arc` allocation: subscribing the same `Arc` twice to a
/// topic is a no-op, and `unsubscribe` removes by the same identity.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs when the handler fails.
    fn name(&self) -> &str;

    /// Process one event.
    ///
    /// Errors are logged by the bus and never reach the publisher.
    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()>;
}

/// Shared handle to a handler.
pub type DynHandler = Arc<dyn EventHandler>;

/// Pointer identity of a handler, ignoring vtables.
pub(crate) fn same_handler(a: &DynHandler, b: &DynHandler) -> bool {
    std::ptr::eq(Arc::as_ptr(a).cast::<()>(), Arc::as_ptr(b).cast::<()>())
}

/// Handler backed by a closure.
pub struct FnHandler<F> {
    name: String,
    f: F,
}

#[async_trait]
impl<F, Fut> EventHandler for FnHandler<F>
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        (self.f)(event).await
    }
}

/// Wrap a closure as a shareable handler.
///
/// Keep the returned `Arc` to unsubscribe later.
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> DynHandler
where
    F: Fn(Arc<Event>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(FnHandler {
        name: name.into(),
        f,
    })
}

// =============================================================================
// SUBSCRIBER TABLE
// =============================================================================

/// Per-topic handler lists behind the bus's single lock.
#[derive(Default)]
pub(crate) struct SubscriberTable {
    topics: Mutex<HashMap<Topic, Vec<DynHandler>>>,
}

impl SubscriberTable {
    /// Add a handler; returns `false` when it was already subscribed.
    pub(crate) fn add(&self, topic: Topic, handler: DynHandler) -> bool {
        let mut topics = self.topics.lock();
        let handlers = topics.entry(topic).or_default();
        if handlers.iter().any(|h| same_handler(h, &handler)) {
            return false;
        }
        handlers.push(handler);
        true
    }

    /// Remove a handler; returns `false` when it was not subscribed.
    pub(crate) fn remove(&self, topic: Topic, handler: &DynHandler) -> bool {
        let mut topics = self.topics.lock();
        let Some(handlers) = topics.get_mut(&topic) else {
            return false;
        };
        let before = handlers.len();
        handlers.retain(|h| !same_handler(h, handler));
        let removed = handlers.len() != before;
        if handlers.is_empty() {
            topics.remove(&topic);
        }
        removed
    }

    /// Copy of the current handler list for a topic.
    pub(crate) fn snapshot(&self, topic: Topic) -> Vec<DynHandler> {
        self.topics.lock().get(&topic).cloned().unwrap_or_default()
    }

    pub(crate) fn count(&self, topic: Topic) -> usize {
        self.topics.lock().get(&topic).map_or(0, Vec::len)
    }

    pub(crate) fn clear(&self) {
        self.topics.lock().clear();
    }
}

// =============================================================================
// STREAMS
// =============================================================================

/// Handler that forwards events into a channel.
struct ChannelHandler {
    name: String,
    sender: mpsc::UnboundedSender<Arc<Event>>,
}

#[async_trait]
impl EventHandler for ChannelHandler {
    fn name(&self) -> &str {
        &self.name
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        // A dropped receiver means the stream is going away; nothing to do.
        let _ = self.sender.send(event);
        Ok(())
    }
}

/// A stream of events for one topic.
///
/// Implements `tokio_stream::Stream`. Dropping the stream unsubscribes its
/// forwarding handler.
pub struct EventStream {
    topic: Topic,
    receiver: mpsc::UnboundedReceiver<Arc<Event>>,
    handler: DynHandler,
    table: Weak<SubscriberTable>,
}

impl EventStream {
    pub(crate) fn subscribe(table: &Arc<SubscriberTable>, topic: Topic) -> Self {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handler: DynHandler = Arc::new(ChannelHandler {
            name: format!("stream:{topic}"),
            sender,
        });
        table.add(topic, Arc::clone(&handler));
        debug!(topic = %topic, "Event stream subscribed");

        Self {
            topic,
            receiver,
            handler,
            table: Arc::downgrade(table),
        }
    }

    /// Topic this stream follows.
    #[must_use]
    pub fn topic(&self) -> Topic {
        self.topic
    }

    /// Receive the next event.
    ///
    /// Returns `None` only if the bus was dropped.
    pub async fn recv(&mut self) -> Option<Arc<Event>> {
        self.receiver.recv().await
    }

    /// Receive an already-delivered event without waiting.
    pub fn try_recv(&mut self) -> Option<Arc<Event>> {
        self.receiver.try_recv().ok()
    }
}

impl Stream for EventStream {
    type Item = Arc<Event>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_recv(cx)
    }
}

impl Drop for EventStream {
    fn drop(&mut self) {
        if let Some(table) = self.table.upgrade() {
            table.remove(self.topic, &self.handler);
        }
        debug!(topic = %self.topic, "Event stream dropped");
    }
}

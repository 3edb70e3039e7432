//! # Pending Handler Tracking
//!
//! Counts in-flight handler invocations so callers can wait for the
//! pipeline to settle.
//!
//! A `PendingGuard` is taken synchronously inside `publish`, before the
//! dispatch task is spawned, and released when that task ends for any
//! reason (success, error, panic, or the runtime dropping it). A handler
//! that publishes follow-up events takes their guards before its own is
//! released, so the count cannot reach zero in the middle of a cascade.

use forge_telemetry::BUS_PENDING_HANDLERS;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Set of in-flight handler invocations.
#[derive(Debug, Default)]
pub struct PendingTasks {
    count: AtomicUsize,
    idle: Notify,
}

impl PendingTasks {
    /// Create an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register one in-flight invocation.
    #[must_use = "the invocation is pending until the guard is dropped"]
    pub fn enter(self: &Arc<Self>) -> PendingGuard {
        self.count.fetch_add(1, Ordering::SeqCst);
        BUS_PENDING_HANDLERS.inc();
        PendingGuard {
            tasks: Arc::clone(self),
        }
    }

    /// Number of in-flight invocations.
    #[must_use]
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Wait until no invocation is in flight.
    ///
    /// Re-checks the count after every wake-up, since finished handlers may
    /// have scheduled more work.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            // Register interest before reading the count so a release in
            // between is not missed.
            notified.as_mut().enable();

            if self.count() == 0 {
                return;
            }
            notified.await;
        }
    }

    fn leave(&self) {
        BUS_PENDING_HANDLERS.dec();
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Keeps one invocation pending while alive.
#[derive(Debug)]
pub struct PendingGuard {
    tasks: Arc<PendingTasks>,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.tasks.leave();
    }
}

//! # Stage Context
//!
//! What every stage receives at construction: the shared bus and the
//! cancellation token of the current run.

use crate::events::{Event, LogEvent, Topic};
use crate::publisher::{EventBus, EventPublisher};
use forge_telemetry::STAGE_SKIPS;
use shared_types::{LogLevel, StageId};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::warn;

/// Bus handle plus run-scoped cancellation.
#[derive(Clone)]
pub struct StageContext {
    bus: Arc<EventBus>,
    cancel: CancellationToken,
}

impl StageContext {
    /// Context with a fresh, never-cancelled token.
    #[must_use]
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self::with_cancellation(bus, CancellationToken::new())
    }

    /// Context sharing an existing token.
    #[must_use]
    pub fn with_cancellation(bus: Arc<EventBus>, cancel: CancellationToken) -> Self {
        Self { bus, cancel }
    }

    /// The shared bus.
    #[must_use]
    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Token that fires when the run is cancelled.
    #[must_use]
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// True once the run was cancelled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Publish an event on the shared bus.
    pub async fn publish(&self, event: Event) -> usize {
        self.bus.publish(event).await
    }

    /// Publish a user-facing log line.
    pub async fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.publish(Event::Log(LogEvent::new(level, message))).await;
    }

    /// Record that a stage withheld its output for one unit of work.
    ///
    /// Nothing is published on the stage's output topic. The failure goes to
    /// the dead-letter topic and the activity log instead.
    pub async fn report_failure(&self, stage: StageId, doc_id: Option<&str>, reason: impl Into<String>) {
        let reason = reason.into();
        STAGE_SKIPS.with_label_values(&[stage.as_str()]).inc();
        warn!(stage = %stage, doc_id = doc_id.unwrap_or("-"), reason = %reason, "Stage withheld output");

        let message = match doc_id {
            Some(doc_id) => format!("{}: {} ({})", stage.as_str(), reason, doc_id),
            None => format!("{}: {}", stage.as_str(), reason),
        };
        self.publish(Event::Log(LogEvent::error(message).about(Topic::DeadLetter)))
            .await;
        self.publish(Event::stage_failed(stage, doc_id, reason)).await;
    }
}

//! # Shared Bus - Event Bus for Inter-Stage Communication
//!
//! Implements the choreography pattern every pipeline stage relies on.
//!
//! ## Architecture Rules
//!
//! - All inter-stage communication goes through the shared bus
//! - **Direct calls between stages are forbidden**
//! - One bus per process, created at start-up and injected by `Arc`
//!
//! ## Choreography Pattern
//!
//! ```text
//! ┌──────────────┐                    ┌──────────────┐
//! │   Stage A    │                    │   Stage B    │
//! │              │    publish()       │              │
//! │              │ ──────┐            │              │
//! └──────────────┘       │            └──────────────┘
//!                        ▼                    ↑
//!                  ┌──────────────┐          │
//!                  │  Event Bus   │          │
//!                  │              │ ─────────┘
//!                  └──────────────┘  subscribe()
//! ```
//!
//! ## Guarantees
//!
//! - **Fire-and-forget**: `publish` schedules handlers and returns
//! - **Fault isolation**: a failing or panicking handler is logged and
//!   affects nothing else
//! - **Drain barrier**: `wait_until_idle` covers cascades of events
//! - **Dead-letter topic**: stages report withheld output on `dlq.stage`
//!
//! Not durable: in-flight events are lost if the process dies.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod context;
pub mod events;
pub mod pending;
pub mod publisher;
pub mod subscriber;

// Re-export main types
pub use context::StageContext;
pub use events::{Event, Topic};
pub use pending::{PendingGuard, PendingTasks};
pub use publisher::{BusError, EventBus, EventPublisher};
pub use subscriber::{handler_fn, DynHandler, EventHandler, EventStream, FnHandler};

/// Dead-letter topic for withheld stage output.
pub const DLQ_TOPIC: &str = "dlq.stage";

/// Default drain timeout for `wait_until_idle` callers.
pub const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 60;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dlq_topic_name() {
        assert_eq!(Topic::DeadLetter.as_str(), DLQ_TOPIC);
    }

    #[test]
    fn test_default_idle_timeout() {
        assert_eq!(DEFAULT_IDLE_TIMEOUT_SECS, 60);
    }
}

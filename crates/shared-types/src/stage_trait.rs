//! # Stage Trait - Plug-and-Play Pipeline Stages
//!
//! Defines the contract every pipeline stage implements to take part in
//! the event-driven choreography.
//!
//! ## Design Philosophy
//!
//! - **Event-only communication**: stages never call each other
//! - **Graceful degradation**: a missing stage leaves its output topics empty
//! - **Idempotent start**: handlers are built once, so a second `start()`
//!   re-subscribes the same handler and the bus ignores the duplicate
//!
//! ## Example Implementation
//!
//! ```rust,ignore
//! use shared_types::{Stage, StageError, StageId, StageStatus};
//! use async_trait::async_trait;
//!
//! pub struct MyStage { /* ... */ }
//!
//! #[async_trait]
//! impl Stage for MyStage {
//!     fn id(&self) -> StageId { StageId::Metadata }
//!     fn name(&self) -> &'static str { "Document Metadata" }
//!     async fn start(&self) -> Result<(), StageError> { Ok(()) }
//!     async fn stop(&self) -> Result<(), StageError> { Ok(()) }
//!     async fn health_check(&self) -> StageStatus { StageStatus::Healthy }
//! }
//! ```

use crate::entities::StageId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Error type for stage lifecycle operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageError {
    /// The stage that encountered the error.
    pub stage_id: StageId,
    /// Error kind.
    pub kind: StageErrorKind,
    /// Human-readable error message.
    pub message: String,
}

impl StageError {
    /// Create a new stage error.
    pub fn new(stage_id: StageId, kind: StageErrorKind, message: impl Into<String>) -> Self {
        Self {
            stage_id,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.stage_id, self.kind, self.message)
    }
}

impl std::error::Error for StageError {}

/// Categories of stage errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageErrorKind {
    /// Stage failed to initialize.
    InitializationFailed,
    /// Stage is not available (disabled or missing dependency).
    NotAvailable,
    /// Stage failed to shut down gracefully.
    ShutdownFailed,
    /// Configuration error.
    ConfigurationError,
}

impl fmt::Display for StageErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InitializationFailed => write!(f, "InitializationFailed"),
            Self::NotAvailable => write!(f, "NotAvailable"),
            Self::ShutdownFailed => write!(f, "ShutdownFailed"),
            Self::ConfigurationError => write!(f, "ConfigurationError"),
        }
    }
}

/// Health status of a stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageStatus {
    /// Subscribed and processing events.
    Healthy,
    /// Running, but its last unit of work failed.
    Degraded,
    /// Not subscribed.
    Stopped,
    /// Failed to start or stop.
    Error,
    /// Start in progress.
    Starting,
    /// Stop in progress.
    ShuttingDown,
}

/// Metadata about a stage for discovery and logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageInfo {
    /// Unique identifier.
    pub id: StageId,
    /// Human-readable name.
    pub name: String,
    /// Brief description.
    pub description: String,
    /// Topics this stage publishes.
    pub publishes: Vec<String>,
    /// Topics this stage subscribes to.
    pub subscribes: Vec<String>,
    /// Whether the stage calls an LLM.
    pub uses_llm: bool,
    /// Whether a start failure aborts the pipeline.
    pub required: bool,
}

impl StageInfo {
    /// Create a new stage info with required fields.
    pub fn new(id: StageId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            description: String::new(),
            publishes: Vec::new(),
            subscribes: Vec::new(),
            uses_llm: false,
            required: false,
        }
    }

    /// Mark as required stage.
    #[must_use]
    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    /// Mark as LLM-backed.
    #[must_use]
    pub fn uses_llm(mut self) -> Self {
        self.uses_llm = true;
        self
    }

    /// Set the description.
    #[must_use]
    pub fn described_as(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Set topics this stage publishes.
    #[must_use]
    pub fn publishes_events(mut self, events: Vec<&str>) -> Self {
        self.publishes = events.into_iter().map(String::from).collect();
        self
    }

    /// Set topics this stage subscribes to.
    #[must_use]
    pub fn subscribes_to(mut self, events: Vec<&str>) -> Self {
        self.subscribes = events.into_iter().map(String::from).collect();
        self
    }
}

/// The trait every pipeline stage implements.
///
/// A stage holds its bus handle and pre-built handlers. `start()`
/// subscribes them, `stop()` unsubscribes them. Between the two, the
/// stage reacts to events only; it exposes no request/reply surface.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Get the unique identifier for this stage.
    fn id(&self) -> StageId;

    /// Get the human-readable name.
    fn name(&self) -> &'static str;

    /// Get detailed information about this stage.
    fn info(&self) -> StageInfo {
        StageInfo::new(self.id(), self.name())
    }

    /// Subscribe the stage's handlers.
    ///
    /// Must be safe to call more than once.
    async fn start(&self) -> Result<(), StageError>;

    /// Unsubscribe the stage's handlers.
    ///
    /// In-flight handler invocations are not cancelled.
    async fn stop(&self) -> Result<(), StageError>;

    /// Check the health of the stage.
    async fn health_check(&self) -> StageStatus;
}

/// A type-erased stage handle for the registry.
pub type DynStage = Box<dyn Stage>;

//! # Pipeline Events
//!
//! Defines every topic and payload that flows through the shared bus.
//!
//! Topics form a closed set known at compile time. Each `Event` variant
//! wraps one typed payload and derives its own topic, so a publisher can
//! never put a payload on the wrong topic. The dotted wire names
//! (`Topic::as_str`) are stable and appear in logs, metrics labels and the
//! serialized form of an event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shared_types::entities::{
    DocumentMetadata, Entity, EntityId, GraphStats, LogLevel, Relationship, RelationshipId,
    StageId,
};
use std::fmt;
use std::str::FromStr;

/// Event topics for subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Topic {
    // =========================================================================
    // UI / SHELL
    // =========================================================================
    /// User-facing activity log line.
    LogsEvent,
    /// Workspace layout description.
    WorkspaceSchema,
    /// Status bar text.
    StatusText,
    /// Navigation selection.
    NavSelect,
    /// Generic user action.
    UserAction,

    // =========================================================================
    // CORE PIPELINE
    // =========================================================================
    /// A document chunk entered the pipeline.
    DataIngested,
    /// Header metadata was recovered from a chunk.
    DocumentMetadata,
    /// Entities were extracted from a chunk.
    EntityExtracted,
    /// Relationships were resolved between extracted entities.
    RelationshipFound,
    /// The knowledge graph changed.
    GraphUpdated,
    /// Reserved for synthesized intelligence products.
    IntelligenceSynthesized,

    // =========================================================================
    // EMBEDDINGS
    // =========================================================================
    /// An entity was embedded.
    EntityEmbedded,
    /// A relationship was embedded.
    RelationshipEmbedded,

    // =========================================================================
    // INTELLIGENCE
    // =========================================================================
    /// Two entities were merged as duplicates.
    EntityMerged,
    /// An entity profile was generated.
    SemanticProfile,
    /// A narrative was generated for a document.
    NarrativeGenerated,
    /// Graph structure analysis finished.
    GraphAnalysis,
    /// A relationship was inferred from graph structure.
    InferredRelationship,
    /// Summary card for an extracted entity.
    EntityCardReady,

    // =========================================================================
    // LIFECYCLE
    // =========================================================================
    /// A long-running intelligence step started.
    ProcessingStarted,
    /// A long-running intelligence step ended.
    ProcessingEnded,
    /// A project was opened.
    ProjectOpened,
    /// A project was closed.
    ProjectClosed,

    /// A stage withheld its output for one unit of work.
    DeadLetter,
}

impl Topic {
    /// Every topic, in declaration order.
    pub const ALL: [Topic; 24] = [
        Self::LogsEvent,
        Self::WorkspaceSchema,
        Self::StatusText,
        Self::NavSelect,
        Self::UserAction,
        Self::DataIngested,
        Self::DocumentMetadata,
        Self::EntityExtracted,
        Self::RelationshipFound,
        Self::GraphUpdated,
        Self::IntelligenceSynthesized,
        Self::EntityEmbedded,
        Self::RelationshipEmbedded,
        Self::EntityMerged,
        Self::SemanticProfile,
        Self::NarrativeGenerated,
        Self::GraphAnalysis,
        Self::InferredRelationship,
        Self::EntityCardReady,
        Self::ProcessingStarted,
        Self::ProcessingEnded,
        Self::ProjectOpened,
        Self::ProjectClosed,
        Self::DeadLetter,
    ];

    /// Stable dotted name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::LogsEvent => "logs.event",
            Self::WorkspaceSchema => "workspace.schema",
            Self::StatusText => "status.text",
            Self::NavSelect => "nav.select",
            Self::UserAction => "user.action",
            Self::DataIngested => "data.ingested",
            Self::DocumentMetadata => "document.metadata",
            Self::EntityExtracted => "entity.extracted",
            Self::RelationshipFound => "relationship.found",
            Self::GraphUpdated => "graph.updated",
            Self::IntelligenceSynthesized => "intelligence.synthesized",
            Self::EntityEmbedded => "entity.embedded",
            Self::RelationshipEmbedded => "relationship.embedded",
            Self::EntityMerged => "entity.merged",
            Self::SemanticProfile => "semantic.profile",
            Self::NarrativeGenerated => "narrative.generated",
            Self::GraphAnalysis => "graph.analysis",
            Self::InferredRelationship => "relationship.inferred",
            Self::EntityCardReady => "entity_card.ready",
            Self::ProcessingStarted => "intelligence.processing.start",
            Self::ProcessingEnded => "intelligence.processing.end",
            Self::ProjectOpened => "project.opened",
            Self::ProjectClosed => "project.closed",
            Self::DeadLetter => crate::DLQ_TOPIC,
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when parsing an unknown topic name.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown topic: {0}")]
pub struct UnknownTopic(pub String);

impl FromStr for Topic {
    type Err = UnknownTopic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownTopic(s.to_string()))
    }
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// User-facing activity log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEvent {
    pub message: String,
    pub level: LogLevel,
    /// Topic the message relates to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub topic: Option<String>,
    pub ts: DateTime<Utc>,
}

impl LogEvent {
    /// Create a log line stamped with the current time.
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            level,
            topic: None,
            ts: Utc::now(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Warning, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Success, message)
    }

    /// Associate the line with a topic.
    #[must_use]
    pub fn about(mut self, topic: Topic) -> Self {
        self.topic = Some(topic.as_str().to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceSchema {
    pub schema: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusText {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavSelect {
    pub id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserAction {
    pub action: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

/// A document chunk entering the pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataIngested {
    pub doc_id: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadataExtracted {
    pub doc_id: String,
    pub metadata: DocumentMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityExtracted {
    pub doc_id: String,
    pub entities: Vec<Entity>,
}

/// One batch of resolved relationships.
///
/// Resolution may split a document's relationships across several events;
/// only the last carries `is_complete = true`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipFound {
    pub doc_id: String,
    pub relationships: Vec<Relationship>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_index: Option<usize>,
    #[serde(default = "default_true")]
    pub is_complete: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphUpdated {
    pub doc_id: String,
    /// Totals for the whole graph; node and edge lists for this document so far.
    pub graph_stats: GraphStats,
    /// Every relationship batch of the document has been applied.
    #[serde(default = "default_true")]
    pub is_complete: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntelligenceSynthesized {
    pub doc_id: String,
    pub summary: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityEmbedded {
    pub entity_id: EntityId,
    pub doc_id: String,
    pub entity_type: String,
    pub text: String,
    pub vector: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipEmbedded {
    pub relationship_id: RelationshipId,
    pub doc_id: String,
    pub text: String,
    pub vector: Vec<f32>,
}

/// Two entities judged to be the same real-world thing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMerged {
    pub kept_id: EntityId,
    pub merged_id: EntityId,
    pub kept_text: String,
    pub merged_text: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticProfile {
    pub entity_id: EntityId,
    pub name: String,
    pub entity_type: String,
    pub summary: String,
    #[serde(default)]
    pub key_attributes: Vec<String>,
    pub importance: f32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NarrativeGenerated {
    pub doc_id: String,
    pub narrative: String,
}

/// A node ranked by degree centrality.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CentralNode {
    pub id: String,
    pub degree: usize,
    pub centrality: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphAnalysisReport {
    pub doc_id: String,
    pub node_count: usize,
    pub edge_count: usize,
    pub component_count: usize,
    pub largest_component: usize,
    pub top_central: Vec<CentralNode>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferredRelationship {
    pub source: String,
    pub target: String,
    pub relation_type: String,
    pub confidence: f64,
    pub shared_neighbors: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityCardReady {
    pub entity_id: EntityId,
    pub entity_type: String,
    pub label: String,
    pub relationship_count: usize,
}

/// Progress of a long-running step; used for both start and end.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessingProgress {
    pub stage: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectOpened {
    pub project_path: String,
    pub project_name: String,
    pub entity_count: usize,
    pub relationship_count: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectClosed {
    pub project_path: String,
}

/// A stage withheld its output event for one unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub stage: StageId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    pub reason: String,
}

// =============================================================================
// EVENT
// =============================================================================

/// All events that can be published to the bus.
///
/// Serialized as `{"topic": "<dotted name>", "payload": {...}}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "topic", content = "payload")]
pub enum Event {
    #[serde(rename = "logs.event")]
    Log(LogEvent),
    #[serde(rename = "workspace.schema")]
    WorkspaceSchema(WorkspaceSchema),
    #[serde(rename = "status.text")]
    StatusText(StatusText),
    #[serde(rename = "nav.select")]
    NavSelect(NavSelect),
    #[serde(rename = "user.action")]
    UserAction(UserAction),
    #[serde(rename = "data.ingested")]
    DataIngested(DataIngested),
    #[serde(rename = "document.metadata")]
    DocumentMetadata(DocumentMetadataExtracted),
    #[serde(rename = "entity.extracted")]
    EntityExtracted(EntityExtracted),
    #[serde(rename = "relationship.found")]
    RelationshipFound(RelationshipFound),
    #[serde(rename = "graph.updated")]
    GraphUpdated(GraphUpdated),
    #[serde(rename = "intelligence.synthesized")]
    IntelligenceSynthesized(IntelligenceSynthesized),
    #[serde(rename = "entity.embedded")]
    EntityEmbedded(EntityEmbedded),
    #[serde(rename = "relationship.embedded")]
    RelationshipEmbedded(RelationshipEmbedded),
    #[serde(rename = "entity.merged")]
    EntityMerged(EntityMerged),
    #[serde(rename = "semantic.profile")]
    SemanticProfile(SemanticProfile),
    #[serde(rename = "narrative.generated")]
    NarrativeGenerated(NarrativeGenerated),
    #[serde(rename = "graph.analysis")]
    GraphAnalysis(GraphAnalysisReport),
    #[serde(rename = "relationship.inferred")]
    InferredRelationship(InferredRelationship),
    #[serde(rename = "entity_card.ready")]
    EntityCardReady(EntityCardReady),
    #[serde(rename = "intelligence.processing.start")]
    ProcessingStarted(ProcessingProgress),
    #[serde(rename = "intelligence.processing.end")]
    ProcessingEnded(ProcessingProgress),
    #[serde(rename = "project.opened")]
    ProjectOpened(ProjectOpened),
    #[serde(rename = "project.closed")]
    ProjectClosed(ProjectClosed),
    #[serde(rename = "dlq.stage")]
    StageFailed(StageFailure),
}

impl Event {
    /// Get the topic this event is delivered on.
    #[must_use]
    pub fn topic(&self) -> Topic {
        match self {
            Self::Log(_) => Topic::LogsEvent,
            Self::WorkspaceSchema(_) => Topic::WorkspaceSchema,
            Self::StatusText(_) => Topic::StatusText,
            Self::NavSelect(_) => Topic::NavSelect,
            Self::UserAction(_) => Topic::UserAction,
            Self::DataIngested(_) => Topic::DataIngested,
            Self::DocumentMetadata(_) => Topic::DocumentMetadata,
            Self::EntityExtracted(_) => Topic::EntityExtracted,
            Self::RelationshipFound(_) => Topic::RelationshipFound,
            Self::GraphUpdated(_) => Topic::GraphUpdated,
            Self::IntelligenceSynthesized(_) => Topic::IntelligenceSynthesized,
            Self::EntityEmbedded(_) => Topic::EntityEmbedded,
            Self::RelationshipEmbedded(_) => Topic::RelationshipEmbedded,
            Self::EntityMerged(_) => Topic::EntityMerged,
            Self::SemanticProfile(_) => Topic::SemanticProfile,
            Self::NarrativeGenerated(_) => Topic::NarrativeGenerated,
            Self::GraphAnalysis(_) => Topic::GraphAnalysis,
            Self::InferredRelationship(_) => Topic::InferredRelationship,
            Self::EntityCardReady(_) => Topic::EntityCardReady,
            Self::ProcessingStarted(_) => Topic::ProcessingStarted,
            Self::ProcessingEnded(_) => Topic::ProcessingEnded,
            Self::ProjectOpened(_) => Topic::ProjectOpened,
            Self::ProjectClosed(_) => Topic::ProjectClosed,
            Self::StageFailed(_) => Topic::DeadLetter,
        }
    }

    /// Document the event concerns, when it has one.
    #[must_use]
    pub fn doc_id(&self) -> Option<&str> {
        match self {
            Self::DataIngested(e) => Some(&e.doc_id),
            Self::DocumentMetadata(e) => Some(&e.doc_id),
            Self::EntityExtracted(e) => Some(&e.doc_id),
            Self::RelationshipFound(e) => Some(&e.doc_id),
            Self::GraphUpdated(e) => Some(&e.doc_id),
            Self::IntelligenceSynthesized(e) => Some(&e.doc_id),
            Self::EntityEmbedded(e) => Some(&e.doc_id),
            Self::RelationshipEmbedded(e) => Some(&e.doc_id),
            Self::NarrativeGenerated(e) => Some(&e.doc_id),
            Self::GraphAnalysis(e) => Some(&e.doc_id),
            Self::StageFailed(e) => e.doc_id.as_deref(),
            _ => None,
        }
    }

    // =========================================================================
    // CONSTRUCTORS
    // =========================================================================

    /// A document chunk received for extraction.
    pub fn data_ingested(doc_id: impl Into<String>, content: impl Into<String>) -> Self {
        Self::DataIngested(DataIngested {
            doc_id: doc_id.into(),
            content: content.into(),
        })
    }

    /// Entities extracted from a chunk.
    pub fn entity_extracted(doc_id: impl Into<String>, entities: Vec<Entity>) -> Self {
        Self::EntityExtracted(EntityExtracted {
            doc_id: doc_id.into(),
            entities,
        })
    }

    /// A single, complete batch of relationships.
    pub fn relationship_found(doc_id: impl Into<String>, relationships: Vec<Relationship>) -> Self {
        Self::RelationshipFound(RelationshipFound {
            doc_id: doc_id.into(),
            relationships,
            batch_index: None,
            is_complete: true,
        })
    }

    /// One batch of a multi-batch relationship result.
    pub fn relationship_batch(
        doc_id: impl Into<String>,
        relationships: Vec<Relationship>,
        batch_index: usize,
        is_complete: bool,
    ) -> Self {
        Self::RelationshipFound(RelationshipFound {
            doc_id: doc_id.into(),
            relationships,
            batch_index: Some(batch_index),
            is_complete,
        })
    }

    /// The graph changed and the document's relationships are all applied.
    pub fn graph_updated(doc_id: impl Into<String>, graph_stats: GraphStats) -> Self {
        Self::graph_progress(doc_id, graph_stats, true)
    }

    /// The graph changed; `is_complete` once the document's last batch landed.
    pub fn graph_progress(doc_id: impl Into<String>, graph_stats: GraphStats, is_complete: bool) -> Self {
        Self::GraphUpdated(GraphUpdated {
            doc_id: doc_id.into(),
            graph_stats,
            is_complete,
        })
    }

    /// User-facing log line.
    pub fn log(level: LogLevel, message: impl Into<String>) -> Self {
        Self::Log(LogEvent::new(level, message))
    }

    /// Start of a long-running step.
    pub fn processing_started(stage: impl Into<String>, message: impl Into<String>, total: Option<usize>) -> Self {
        Self::ProcessingStarted(ProcessingProgress {
            stage: stage.into(),
            message: message.into(),
            total,
            current: None,
        })
    }

    /// End of a long-running step.
    pub fn processing_ended(
        stage: impl Into<String>,
        message: impl Into<String>,
        total: Option<usize>,
        current: Option<usize>,
    ) -> Self {
        Self::ProcessingEnded(ProcessingProgress {
            stage: stage.into(),
            message: message.into(),
            total,
            current,
        })
    }

    /// A stage withheld its output.
    pub fn stage_failed(stage: StageId, doc_id: Option<&str>, reason: impl Into<String>) -> Self {
        Self::StageFailed(StageFailure {
            stage,
            doc_id: doc_id.map(str::to_string),
            reason: reason.into(),
        })
    }
}

//! # Core Domain Entities
//!
//! Defines the knowledge-graph entities that flow between pipeline stages.
//!
//! ## Clusters
//!
//! - **Extraction**: `Entity`, `Relationship`
//! - **Graph**: `GraphNode`, `GraphEdge`, `GraphStats`
//! - **Documents**: `DocumentMetadata`
//! - **Identity**: `StageId`, derived `EntityId` / `RelationshipId`
//!
//! ## Stable Identifiers
//!
//! Persistence is upsert-style, so every row is keyed by an identifier
//! derived from content rather than generated at random:
//!
//! ```text
//! EntityId       = sha256(lower(type) ":" lower(trim(text)))[..16]
//! RelationshipId = sha256(source_id ":" RELATION_TYPE ":" target_id)[..16]
//! ```
//!
//! Replaying the same event therefore touches the same rows.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

// =============================================================================
// CLUSTER A: EXTRACTION
// =============================================================================

/// Hex identifier derived from entity content.
pub type EntityId = String;

/// Hex identifier derived from relationship endpoints and type.
pub type RelationshipId = String;

/// Free-form attributes attached to an extracted entity.
pub type Attributes = BTreeMap<String, serde_json::Value>;

/// Number of digest bytes kept in derived identifiers.
const ID_BYTES: usize = 16;

/// Derive the stable identifier of an entity.
#[must_use]
pub fn derive_entity_id(entity_type: &str, text: &str) -> EntityId {
    let mut hasher = Sha256::new();
    hasher.update(entity_type.trim().to_lowercase().as_bytes());
    hasher.update(b":");
    hasher.update(text.trim().to_lowercase().as_bytes());
    hex::encode(&hasher.finalize()[..ID_BYTES])
}

/// Derive the stable identifier of a relationship between two entities.
#[must_use]
pub fn derive_relationship_id(source_id: &str, relation_type: &str, target_id: &str) -> RelationshipId {
    let mut hasher = Sha256::new();
    hasher.update(source_id.as_bytes());
    hasher.update(b":");
    hasher.update(relation_type.trim().to_uppercase().as_bytes());
    hasher.update(b":");
    hasher.update(target_id.as_bytes());
    hex::encode(&hasher.finalize()[..ID_BYTES])
}

/// A named thing found in a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Upper-cased category, e.g. `PERSON` or `ORGANIZATION`.
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Surface text as it appeared in the document, trimmed.
    pub text: String,
    /// Additional key/value facts supplied by the extractor.
    #[serde(default)]
    pub attributes: Attributes,
}

impl Entity {
    /// Create a normalized entity: type upper-cased, text trimmed.
    pub fn new(entity_type: impl AsRef<str>, text: impl AsRef<str>) -> Self {
        Self {
            entity_type: entity_type.as_ref().trim().to_uppercase(),
            text: text.as_ref().trim().to_string(),
            attributes: Attributes::new(),
        }
    }

    /// Attach an attribute.
    #[must_use]
    pub fn with_attribute(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.attributes.insert(key.into(), value);
        self
    }

    /// Stable identifier for upserts.
    #[must_use]
    pub fn id(&self) -> EntityId {
        derive_entity_id(&self.entity_type, &self.text)
    }
}

/// A typed, directed link between two entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
    /// Source entity text.
    pub source: String,
    /// Target entity text.
    pub target: String,
    /// Upper-snake-case relation label, e.g. `WORKS_FOR`.
    pub relation_type: String,
    /// Extractor confidence in `[0, 1]`.
    #[serde(default = "default_confidence")]
    pub confidence: f64,
    /// Entity type of the source, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_type: Option<String>,
    /// Entity type of the target, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_type: Option<String>,
}

fn default_confidence() -> f64 {
    1.0
}

impl Relationship {
    /// Create a relationship with full confidence and unknown endpoint types.
    pub fn new(
        source: impl Into<String>,
        target: impl Into<String>,
        relation_type: impl AsRef<str>,
    ) -> Self {
        Self {
            source: source.into(),
            target: target.into(),
            relation_type: relation_type.as_ref().trim().to_uppercase(),
            confidence: default_confidence(),
            source_type: None,
            target_type: None,
        }
    }

    /// Set the confidence, clamped to `[0, 1]`.
    #[must_use]
    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = confidence.clamp(0.0, 1.0);
        self
    }

    /// Set endpoint entity types.
    #[must_use]
    pub fn with_types(mut self, source_type: impl Into<String>, target_type: impl Into<String>) -> Self {
        self.source_type = Some(source_type.into());
        self.target_type = Some(target_type.into());
        self
    }

    /// Identifier of the source entity.
    #[must_use]
    pub fn source_id(&self) -> EntityId {
        derive_entity_id(self.source_type.as_deref().unwrap_or(UNKNOWN_TYPE), &self.source)
    }

    /// Identifier of the target entity.
    #[must_use]
    pub fn target_id(&self) -> EntityId {
        derive_entity_id(self.target_type.as_deref().unwrap_or(UNKNOWN_TYPE), &self.target)
    }

    /// Stable identifier for upserts.
    #[must_use]
    pub fn id(&self) -> RelationshipId {
        derive_relationship_id(&self.source_id(), &self.relation_type, &self.target_id())
    }
}

// =============================================================================
// CLUSTER B: GRAPH
// =============================================================================

/// Node type used when the extractor did not supply one.
pub const UNKNOWN_TYPE: &str = "Unknown";

/// A node in the knowledge graph, keyed by entity name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GraphNode {
    /// Entity name (graph key).
    pub id: String,
    /// Entity type, `Unknown` when absent.
    #[serde(rename = "type")]
    pub node_type: String,
}

/// A directed edge in the knowledge graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphEdge {
    /// Source node id.
    pub source: String,
    /// Target node id.
    pub target: String,
    /// Relation label.
    #[serde(rename = "type")]
    pub relation_type: String,
    /// Highest confidence seen for this edge.
    pub confidence: f64,
    /// Document that first contributed the edge.
    pub doc_id: String,
}

/// Snapshot of the graph published after each update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStats {
    /// Total nodes in the graph.
    pub node_count: usize,
    /// Total edges in the graph.
    pub edge_count: usize,
    /// Nodes touched by the triggering document.
    pub nodes: Vec<GraphNode>,
    /// Edges touched by the triggering document.
    pub edges: Vec<GraphEdge>,
}

// =============================================================================
// CLUSTER C: DOCUMENTS
// =============================================================================

/// Header fields recovered from a report-style document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    /// Classification marking, e.g. `SECRET // NOFORN`.
    pub classification: Option<String>,
    /// Report or signal identifier.
    pub report_id: Option<String>,
    /// Report date as written in the document.
    pub date: Option<String>,
    /// Message precedence.
    pub precedence: Option<String>,
    /// Operational zone.
    pub zone: Option<String>,
    /// Unit that prepared the report.
    pub authoring_unit: Option<String>,
}

impl DocumentMetadata {
    /// True when no field was recovered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.classification.is_none()
            && self.report_id.is_none()
            && self.date.is_none()
            && self.precedence.is_none()
            && self.zone.is_none()
            && self.authoring_unit.is_none()
    }
}

/// Severity of a user-facing log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Success,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Success => "success",
        };
        f.write_str(s)
    }
}

// =============================================================================
// CLUSTER D: STAGE IDENTITY
// =============================================================================

/// Identifier of a pipeline stage.
///
/// Discriminants match the `fg-NN` crate numbers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum StageId {
    Metadata = 1,
    Extraction = 2,
    Resolution = 3,
    Graph = 4,
    Persistence = 5,
    Embedding = 6,
    VectorIndex = 7,
    Deduplication = 8,
    GraphInsights = 9,
    Profiler = 10,
    Narrative = 11,
    EntityCards = 12,
}

impl StageId {
    /// All stages in start order.
    pub const ALL: [StageId; 12] = [
        Self::Metadata,
        Self::Extraction,
        Self::Resolution,
        Self::Graph,
        Self::Persistence,
        Self::Embedding,
        Self::VectorIndex,
        Self::Deduplication,
        Self::GraphInsights,
        Self::Profiler,
        Self::Narrative,
        Self::EntityCards,
    ];

    /// Numeric identifier.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Short snake-case name used in logs and metrics labels.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Metadata => "metadata",
            Self::Extraction => "extraction",
            Self::Resolution => "resolution",
            Self::Graph => "graph",
            Self::Persistence => "persistence",
            Self::Embedding => "embedding",
            Self::VectorIndex => "vector_index",
            Self::Deduplication => "deduplication",
            Self::GraphInsights => "graph_insights",
            Self::Profiler => "profiler",
            Self::Narrative => "narrative",
            Self::EntityCards => "entity_cards",
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fg-{:02}-{}", self.as_u8(), self.as_str())
    }
}

//! # Stored Records
//!
//! Rows kept by a knowledge store. Every row is keyed by a content-derived
//! identifier, so writing the same input twice yields the same row.

use serde::{Deserialize, Serialize};
use shared_types::{Attributes, DocumentMetadata, Entity, EntityId, Relationship, RelationshipId};
use std::collections::BTreeSet;

/// A persisted entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub entity_type: String,
    pub text: String,
    pub attributes: Attributes,
    /// Chunks the entity was seen in.
    pub doc_ids: BTreeSet<String>,
}

impl EntityRecord {
    #[must_use]
    pub fn from_entity(doc_id: &str, entity: &Entity) -> Self {
        Self {
            id: entity.id(),
            entity_type: entity.entity_type.clone(),
            text: entity.text.clone(),
            attributes: entity.attributes.clone(),
            doc_ids: BTreeSet::from([doc_id.to_string()]),
        }
    }

    /// Fold a later sighting into this row.
    ///
    /// Attributes already present keep their first value.
    pub fn absorb(&mut self, other: &Self) {
        for (key, value) in &other.attributes {
            self.attributes
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }
        self.doc_ids.extend(other.doc_ids.iter().cloned());
    }
}

/// A persisted relationship between two entity rows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipRecord {
    pub id: RelationshipId,
    pub source_id: EntityId,
    pub target_id: EntityId,
    pub source: String,
    pub target: String,
    pub relation_type: String,
    pub confidence: f64,
    pub doc_ids: BTreeSet<String>,
}

impl RelationshipRecord {
    #[must_use]
    pub fn from_relationship(doc_id: &str, rel: &Relationship) -> Self {
        Self {
            id: rel.id(),
            source_id: rel.source_id(),
            target_id: rel.target_id(),
            source: rel.source.clone(),
            target: rel.target.clone(),
            relation_type: rel.relation_type.clone(),
            confidence: rel.confidence,
            doc_ids: BTreeSet::from([doc_id.to_string()]),
        }
    }
}

/// Header fields of one chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub doc_id: String,
    pub metadata: DocumentMetadata,
}

/// LLM-written description of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileRecord {
    pub entity_id: EntityId,
    pub name: String,
    pub entity_type: String,
    pub summary: String,
    pub key_attributes: Vec<String>,
    pub importance: f32,
}

/// Row totals of a store.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreCounts {
    pub entities: usize,
    pub relationships: usize,
    pub documents: usize,
    pub profiles: usize,
    pub narratives: usize,
    pub merges: usize,
}

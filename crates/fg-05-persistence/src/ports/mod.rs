//! # Outbound Ports
//!
//! The storage backend the persistence stage writes through.
//!
//! Production deployments plug in a database adapter; `InMemoryKnowledgeStore`
//! is the reference implementation used by the runtime and tests.

use crate::domain::{
    DocumentRecord, EntityRecord, ProfileRecord, RelationshipRecord, StoreCounts, StoreError,
};
use shared_types::{DocumentMetadata, Entity, EntityId, Relationship};

/// Upsert-style store for pipeline output.
///
/// ## Idempotence
///
/// Every write is keyed by a stable id. Writing the same input twice must
/// leave the store as it was after the first write.
pub trait KnowledgeStore: Send + Sync {
    /// Insert or update an entity seen in `doc_id`.
    fn upsert_entity(&self, doc_id: &str, entity: &Entity) -> Result<EntityId, StoreError>;

    /// Insert or update a relationship seen in `doc_id`.
    fn upsert_relationship(&self, doc_id: &str, relationship: &Relationship) -> Result<(), StoreError>;

    /// Replace the header fields of `doc_id`.
    fn upsert_document_metadata(&self, doc_id: &str, metadata: &DocumentMetadata) -> Result<(), StoreError>;

    /// Fold `merged_id` into `kept_id`.
    ///
    /// Later writes naming `merged_id` land on `kept_id`.
    fn merge_entities(&self, kept_id: &str, merged_id: &str) -> Result<(), StoreError>;

    /// Insert or replace the profile of an entity.
    fn store_profile(&self, profile: ProfileRecord) -> Result<(), StoreError>;

    /// Insert or replace the narrative of a document.
    fn store_narrative(&self, doc_id: &str, narrative: &str) -> Result<(), StoreError>;

    fn counts(&self) -> Result<StoreCounts, StoreError>;

    fn entities(&self) -> Result<Vec<EntityRecord>, StoreError>;

    fn relationships(&self) -> Result<Vec<RelationshipRecord>, StoreError>;

    /// Relationships with `entity_id` (or the row it was merged into) at
    /// either end.
    fn relationship_count(&self, entity_id: &str) -> Result<usize, StoreError>;

    fn entity(&self, id: &str) -> Result<Option<EntityRecord>, StoreError>;

    fn document(&self, doc_id: &str) -> Result<Option<DocumentRecord>, StoreError>;

    fn profile(&self, entity_id: &str) -> Result<Option<ProfileRecord>, StoreError>;

    fn narrative(&self, doc_id: &str) -> Result<Option<String>, StoreError>;

    /// Remove every row.
    fn clear(&self) -> Result<(), StoreError>;
}

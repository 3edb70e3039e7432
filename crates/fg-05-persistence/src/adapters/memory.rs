//! In-memory knowledge store.

use crate::domain::{
    DocumentRecord, EntityRecord, ProfileRecord, RelationshipRecord, StoreCounts, StoreError,
};
use crate::ports::KnowledgeStore;
use parking_lot::RwLock;
use shared_types::{derive_relationship_id, DocumentMetadata, Entity, EntityId, Relationship};
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Default)]
struct Tables {
    entities: BTreeMap<EntityId, EntityRecord>,
    /// merged id -> kept id
    aliases: HashMap<EntityId, EntityId>,
    relationships: BTreeMap<String, RelationshipRecord>,
    documents: BTreeMap<String, DocumentRecord>,
    profiles: BTreeMap<EntityId, ProfileRecord>,
    narratives: BTreeMap<String, String>,
}

impl Tables {
    fn resolve(&self, id: &str) -> EntityId {
        let mut current = id;
        // Alias chains are acyclic; the bound only guards against corruption.
        for _ in 0..=self.aliases.len() {
            match self.aliases.get(current) {
                Some(next) => current = next.as_str(),
                None => break,
            }
        }
        current.to_string()
    }

    fn put_entity(&mut self, record: EntityRecord) {
        match self.entities.get_mut(&record.id) {
            Some(existing) => existing.absorb(&record),
            None => {
                self.entities.insert(record.id.clone(), record);
            }
        }
    }

    fn put_relationship(&mut self, mut record: RelationshipRecord) {
        record.source_id = self.resolve(&record.source_id);
        record.target_id = self.resolve(&record.target_id);
        if record.source_id == record.target_id {
            return;
        }
        record.id = derive_relationship_id(&record.source_id, &record.relation_type, &record.target_id);
        if let Some(source) = self.entities.get(&record.source_id) {
            record.source = source.text.clone();
        }
        if let Some(target) = self.entities.get(&record.target_id) {
            record.target = target.text.clone();
        }

        match self.relationships.get_mut(&record.id) {
            Some(existing) => {
                existing.confidence = existing.confidence.max(record.confidence);
                existing.doc_ids.extend(record.doc_ids);
            }
            None => {
                self.relationships.insert(record.id.clone(), record);
            }
        }
    }
}

/// Knowledge store held entirely in process memory.
#[derive(Debug, Default)]
pub struct InMemoryKnowledgeStore {
    tables: RwLock<Tables>,
}

impl InMemoryKnowledgeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl KnowledgeStore for InMemoryKnowledgeStore {
    fn upsert_entity(&self, doc_id: &str, entity: &Entity) -> Result<EntityId, StoreError> {
        if entity.text.is_empty() {
            return Err(StoreError::InvalidRecord(format!(
                "{} entity without text",
                entity.entity_type
            )));
        }
        let mut tables = self.tables.write();
        let mut record = EntityRecord::from_entity(doc_id, entity);
        record.id = tables.resolve(&record.id);
        let id = record.id.clone();
        tables.put_entity(record);
        Ok(id)
    }

    fn upsert_relationship(&self, doc_id: &str, relationship: &Relationship) -> Result<(), StoreError> {
        if relationship.source.is_empty() || relationship.target.is_empty() {
            return Err(StoreError::InvalidRecord(format!(
                "{} relationship with an empty endpoint",
                relationship.relation_type
            )));
        }
        self.tables
            .write()
            .put_relationship(RelationshipRecord::from_relationship(doc_id, relationship));
        Ok(())
    }

    fn upsert_document_metadata(&self, doc_id: &str, metadata: &DocumentMetadata) -> Result<(), StoreError> {
        self.tables.write().documents.insert(
            doc_id.to_string(),
            DocumentRecord {
                doc_id: doc_id.to_string(),
                metadata: metadata.clone(),
            },
        );
        Ok(())
    }

    fn merge_entities(&self, kept_id: &str, merged_id: &str) -> Result<(), StoreError> {
        if kept_id == merged_id {
            return Err(StoreError::SelfMerge(kept_id.to_string()));
        }
        let mut tables = self.tables.write();
        let kept = tables.resolve(kept_id);
        let merged = tables.resolve(merged_id);
        if kept == merged {
            return Ok(());
        }
        tables.aliases.insert(merged.clone(), kept.clone());

        if let Some(mut record) = tables.entities.remove(&merged) {
            record.id = kept.clone();
            if let Some(existing) = tables.entities.get(&kept) {
                record.text = existing.text.clone();
                record.entity_type = existing.entity_type.clone();
            }
            tables.put_entity(record);
        }

        let touched: Vec<String> = tables
            .relationships
            .values()
            .filter(|r| r.source_id == merged || r.target_id == merged)
            .map(|r| r.id.clone())
            .collect();
        for id in touched {
            if let Some(record) = tables.relationships.remove(&id) {
                tables.put_relationship(record);
            }
        }

        if let Some(mut profile) = tables.profiles.remove(&merged) {
            if !tables.profiles.contains_key(&kept) {
                profile.entity_id = kept.clone();
                tables.profiles.insert(kept, profile);
            }
        }
        Ok(())
    }

    fn store_profile(&self, mut profile: ProfileRecord) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        profile.entity_id = tables.resolve(&profile.entity_id);
        tables.profiles.insert(profile.entity_id.clone(), profile);
        Ok(())
    }

    fn store_narrative(&self, doc_id: &str, narrative: &str) -> Result<(), StoreError> {
        self.tables
            .write()
            .narratives
            .insert(doc_id.to_string(), narrative.to_string());
        Ok(())
    }

    fn counts(&self) -> Result<StoreCounts, StoreError> {
        let tables = self.tables.read();
        Ok(StoreCounts {
            entities: tables.entities.len(),
            relationships: tables.relationships.len(),
            documents: tables.documents.len(),
            profiles: tables.profiles.len(),
            narratives: tables.narratives.len(),
            merges: tables.aliases.len(),
        })
    }

    fn entities(&self) -> Result<Vec<EntityRecord>, StoreError> {
        Ok(self.tables.read().entities.values().cloned().collect())
    }

    fn relationships(&self) -> Result<Vec<RelationshipRecord>, StoreError> {
        Ok(self.tables.read().relationships.values().cloned().collect())
    }

    fn relationship_count(&self, entity_id: &str) -> Result<usize, StoreError> {
        let tables = self.tables.read();
        let id = tables.resolve(entity_id);
        Ok(tables
            .relationships
            .values()
            .filter(|r| r.source_id == id || r.target_id == id)
            .count())
    }

    fn entity(&self, id: &str) -> Result<Option<EntityRecord>, StoreError> {
        let tables = self.tables.read();
        Ok(tables.entities.get(&tables.resolve(id)).cloned())
    }

    fn document(&self, doc_id: &str) -> Result<Option<DocumentRecord>, StoreError> {
        Ok(self.tables.read().documents.get(doc_id).cloned())
    }

    fn profile(&self, entity_id: &str) -> Result<Option<ProfileRecord>, StoreError> {
        let tables = self.tables.read();
        Ok(tables.profiles.get(&tables.resolve(entity_id)).cloned())
    }

    fn narrative(&self, doc_id: &str) -> Result<Option<String>, StoreError> {
        Ok(self.tables.read().narratives.get(doc_id).cloned())
    }

    fn clear(&self) -> Result<(), StoreError> {
        *self.tables.write() = Tables::default();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Entity {
        Entity::new("PERSON", "Alice")
    }

    fn works_for() -> Relationship {
        Relationship::new("Alice", "ACME", "WORKS_FOR").with_types("PERSON", "ORGANIZATION")
    }

    #[test]
    fn test_entity_upsert_is_idempotent() {
        let store = InMemoryKnowledgeStore::new();
        let first = store.upsert_entity("d1", &alice()).unwrap();
        let second = store.upsert_entity("d1", &alice()).unwrap();
        assert_eq!(first, second);
        assert_eq!(store.counts().unwrap().entities, 1);

        store.upsert_entity("d2", &Entity::new("person", " alice ")).unwrap();
        let record = store.entity(&first).unwrap().unwrap();
        assert_eq!(record.doc_ids.len(), 2);
    }

    #[test]
    fn test_empty_entity_rejected() {
        let store = InMemoryKnowledgeStore::new();
        let err = store.upsert_entity("d1", &Entity::new("PERSON", "  ")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidRecord(_)));
    }

    #[test]
    fn test_relationship_keeps_max_confidence() {
        let store = InMemoryKnowledgeStore::new();
        store.upsert_relationship("d1", &works_for().with_confidence(0.4)).unwrap();
        store.upsert_relationship("d2", &works_for().with_confidence(0.8)).unwrap();
        store.upsert_relationship("d2", &works_for().with_confidence(0.1)).unwrap();

        let rels = store.relationships().unwrap();
        assert_eq!(rels.len(), 1);
        assert!((rels[0].confidence - 0.8).abs() < f64::EPSILON);
        assert_eq!(rels[0].doc_ids.len(), 2);
    }

    #[test]
    fn test_merge_folds_rows_and_rewrites_edges() {
        let store = InMemoryKnowledgeStore::new();
        let kept = store.upsert_entity("d1", &alice()).unwrap();
        let merged = store
            .upsert_entity("d2", &Entity::new("PERSON", "Alice Smith"))
            .unwrap();
        store
            .upsert_relationship(
                "d2",
                &Relationship::new("Alice Smith", "ACME", "WORKS_FOR").with_types("PERSON", "ORGANIZATION"),
            )
            .unwrap();

        store.merge_entities(&kept, &merged).unwrap();

        let counts = store.counts().unwrap();
        assert_eq!(counts.entities, 1);
        assert_eq!(counts.merges, 1);
        let rel = &store.relationships().unwrap()[0];
        assert_eq!(rel.source_id, kept);
        assert_eq!(rel.source, "Alice");
        assert_eq!(store.entity(&merged).unwrap().unwrap().id, kept);
    }

    #[test]
    fn test_merge_before_sighting_redirects_later_writes() {
        let store = InMemoryKnowledgeStore::new();
        let kept = alice().id();
        let late = Entity::new("PERSON", "A. Smith");
        store.merge_entities(&kept, &late.id()).unwrap();

        let id = store.upsert_entity("d3", &late).unwrap();
        assert_eq!(id, kept);
        assert_eq!(store.counts().unwrap().entities, 1);
    }

    #[test]
    fn test_merge_replay_and_self_merge() {
        let store = InMemoryKnowledgeStore::new();
        store.merge_entities("a", "b").unwrap();
        store.merge_entities("a", "b").unwrap();
        store.merge_entities("b", "a").unwrap();
        assert_eq!(store.counts().unwrap().merges, 1);
        assert_eq!(store.merge_entities("a", "a"), Err(StoreError::SelfMerge("a".into())));
    }

    #[test]
    fn test_merge_drops_self_loops() {
        let store = InMemoryKnowledgeStore::new();
        let a = store.upsert_entity("d1", &alice()).unwrap();
        let b = store
            .upsert_entity("d1", &Entity::new("PERSON", "Alice Smith"))
            .unwrap();
        store
            .upsert_relationship(
                "d1",
                &Relationship::new("Alice", "Alice Smith", "ALIAS_OF").with_types("PERSON", "PERSON"),
            )
            .unwrap();
        store.merge_entities(&a, &b).unwrap();
        assert!(store.relationships().unwrap().is_empty());
    }

    #[test]
    fn test_relationship_count_follows_merges() {
        let store = InMemoryKnowledgeStore::new();
        store.upsert_relationship("d1", &works_for()).unwrap();
        store
            .upsert_relationship(
                "d1",
                &Relationship::new("Alice", "Berlin", "LIVES_IN").with_types("PERSON", "LOCATION"),
            )
            .unwrap();
        let alice_id = alice().id();
        assert_eq!(store.relationship_count(&alice_id).unwrap(), 2);
        assert_eq!(store.relationship_count("missing").unwrap(), 0);

        let alias = Entity::new("PERSON", "A. Smith").id();
        store.merge_entities(&alice_id, &alias).unwrap();
        assert_eq!(store.relationship_count(&alias).unwrap(), 2);
    }

    #[test]
    fn test_clear() {
        let store = InMemoryKnowledgeStore::new();
        store.upsert_entity("d1", &alice()).unwrap();
        store.store_narrative("d1", "Alice works for ACME.").unwrap();
        store.clear().unwrap();
        assert_eq!(store.counts().unwrap(), StoreCounts::default());
    }
}

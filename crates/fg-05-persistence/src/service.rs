//! Persistence stage wiring.

use crate::domain::{ProfileRecord, StoreError};
use crate::ports::KnowledgeStore;
use async_trait::async_trait;
use shared_bus::{DynHandler, Event, EventHandler, StageContext, Topic};
use shared_types::{Stage, StageError, StageId, StageInfo, StageStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Topics whose payloads are written to the store.
pub const PERSISTED_TOPICS: [Topic; 6] = [
    Topic::DocumentMetadata,
    Topic::EntityExtracted,
    Topic::RelationshipFound,
    Topic::EntityMerged,
    Topic::SemanticProfile,
    Topic::NarrativeGenerated,
];

struct PersistHandler {
    ctx: StageContext,
    store: Arc<dyn KnowledgeStore>,
}

impl PersistHandler {
    /// Write one event. Returns the number of rows touched.
    fn persist(&self, event: &Event) -> Result<usize, StoreError> {
        match event {
            Event::DocumentMetadata(extracted) => {
                self.store
                    .upsert_document_metadata(&extracted.doc_id, &extracted.metadata)?;
                Ok(1)
            }
            Event::EntityExtracted(extracted) => {
                for entity in &extracted.entities {
                    self.store.upsert_entity(&extracted.doc_id, entity)?;
                }
                Ok(extracted.entities.len())
            }
            Event::RelationshipFound(found) => {
                for rel in &found.relationships {
                    self.store.upsert_relationship(&found.doc_id, rel)?;
                }
                Ok(found.relationships.len())
            }
            Event::EntityMerged(merged) => {
                self.store.merge_entities(&merged.kept_id, &merged.merged_id)?;
                Ok(1)
            }
            Event::SemanticProfile(profile) => {
                self.store.store_profile(ProfileRecord {
                    entity_id: profile.entity_id.clone(),
                    name: profile.name.clone(),
                    entity_type: profile.entity_type.clone(),
                    summary: profile.summary.clone(),
                    key_attributes: profile.key_attributes.clone(),
                    importance: profile.importance,
                })?;
                Ok(1)
            }
            Event::NarrativeGenerated(narrative) => {
                self.store
                    .store_narrative(&narrative.doc_id, &narrative.narrative)?;
                Ok(1)
            }
            _ => Ok(0),
        }
    }
}

#[async_trait]
impl EventHandler for PersistHandler {
    fn name(&self) -> &str {
        "fg-05-persistence.store"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        match self.persist(&event) {
            Ok(rows) => {
                debug!(topic = %event.topic(), rows, "Persisted");
            }
            Err(e) => {
                self.ctx
                    .report_failure(StageId::Persistence, event.doc_id(), e.to_string())
                    .await;
            }
        }
        Ok(())
    }
}

/// Stage 5: writes pipeline output through a [`KnowledgeStore`].
pub struct PersistenceStage {
    ctx: StageContext,
    store: Arc<dyn KnowledgeStore>,
    handler: DynHandler,
    running: AtomicBool,
}

impl PersistenceStage {
    pub fn new(ctx: StageContext, store: Arc<dyn KnowledgeStore>) -> Self {
        let handler: DynHandler = Arc::new(PersistHandler {
            ctx: ctx.clone(),
            store: Arc::clone(&store),
        });
        Self {
            ctx,
            store,
            handler,
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn KnowledgeStore> {
        &self.store
    }
}

#[async_trait]
impl Stage for PersistenceStage {
    fn id(&self) -> StageId {
        StageId::Persistence
    }

    fn name(&self) -> &'static str {
        "Persistence"
    }

    fn info(&self) -> StageInfo {
        StageInfo::new(self.id(), self.name())
            .described_as("Upserts metadata, entities, relationships, merges, profiles and narratives")
            .required()
            .subscribes_to(PERSISTED_TOPICS.iter().map(|t| t.as_str()).collect())
            .publishes_events(vec![])
    }

    async fn start(&self) -> Result<(), StageError> {
        let bus = self.ctx.bus();
        for topic in PERSISTED_TOPICS {
            bus.subscribe(topic, Arc::clone(&self.handler));
        }
        self.running.store(true, Ordering::SeqCst);
        info!(stage = %self.id(), "Stage started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), StageError> {
        let bus = self.ctx.bus();
        for topic in PERSISTED_TOPICS {
            bus.unsubscribe(topic, &self.handler);
        }
        self.running.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn health_check(&self) -> StageStatus {
        if self.running.load(Ordering::SeqCst) {
            StageStatus::Healthy
        } else {
            StageStatus::Stopped
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::InMemoryKnowledgeStore;
    use shared_bus::events::{DocumentMetadataExtracted, EntityMerged, NarrativeGenerated};
    use shared_bus::{EventBus, EventPublisher};
    use shared_types::{DocumentMetadata, Entity, Relationship};
    use std::time::Duration;

    async fn running_stage(bus: &Arc<EventBus>) -> (PersistenceStage, Arc<InMemoryKnowledgeStore>) {
        let store = Arc::new(InMemoryKnowledgeStore::new());
        let stage = PersistenceStage::new(StageContext::new(Arc::clone(bus)), store.clone());
        stage.start().await.unwrap();
        (stage, store)
    }

    fn sample_events() -> Vec<Event> {
        vec![
            Event::DocumentMetadata(DocumentMetadataExtracted {
                doc_id: "r_chunk_0".into(),
                metadata: DocumentMetadata {
                    classification: Some("SECRET".into()),
                    ..DocumentMetadata::default()
                },
            }),
            Event::entity_extracted(
                "r_chunk_0",
                vec![Entity::new("PERSON", "Alice"), Entity::new("ORGANIZATION", "ACME")],
            ),
            Event::relationship_found(
                "r_chunk_0",
                vec![Relationship::new("Alice", "ACME", "WORKS_FOR").with_types("PERSON", "ORGANIZATION")],
            ),
            Event::NarrativeGenerated(NarrativeGenerated {
                doc_id: "r_chunk_0".into(),
                narrative: "Alice works for ACME.".into(),
            }),
        ]
    }

    #[tokio::test]
    async fn test_persists_every_topic() {
        let bus = Arc::new(EventBus::new());
        let (_stage, store) = running_stage(&bus).await;

        for event in sample_events() {
            bus.publish(event).await;
        }
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);

        let counts = store.counts().unwrap();
        assert_eq!(counts.documents, 1);
        assert_eq!(counts.entities, 2);
        assert_eq!(counts.relationships, 1);
        assert_eq!(counts.narratives, 1);
        assert_eq!(
            store.document("r_chunk_0").unwrap().unwrap().metadata.classification.as_deref(),
            Some("SECRET")
        );
    }

    #[tokio::test]
    async fn test_replay_is_idempotent() {
        let bus = Arc::new(EventBus::new());
        let (_stage, store) = running_stage(&bus).await;

        for event in sample_events() {
            bus.publish(event).await;
        }
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);
        let first = (store.counts().unwrap(), store.entities().unwrap(), store.relationships().unwrap());

        for event in sample_events() {
            bus.publish(event).await;
        }
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);
        let second = (store.counts().unwrap(), store.entities().unwrap(), store.relationships().unwrap());

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_store_error_goes_to_dead_letter() {
        let bus = Arc::new(EventBus::new());
        let (_stage, store) = running_stage(&bus).await;
        let mut dlq = bus.stream(Topic::DeadLetter);

        bus.publish(Event::EntityMerged(EntityMerged {
            kept_id: "same".into(),
            merged_id: "same".into(),
            kept_text: "Alice".into(),
            merged_text: "Alice".into(),
            similarity: 1.0,
        }))
        .await;
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);

        let failure = dlq.try_recv().unwrap();
        assert!(matches!(failure.as_ref(), Event::StageFailed(f) if f.stage == StageId::Persistence));
        assert_eq!(store.counts().unwrap().merges, 0);
    }

    #[tokio::test]
    async fn test_stop_unsubscribes() {
        let bus = Arc::new(EventBus::new());
        let (stage, store) = running_stage(&bus).await;
        assert_eq!(stage.health_check().await, StageStatus::Healthy);
        stage.stop().await.unwrap();

        bus.publish(Event::entity_extracted("d", vec![Entity::new("PERSON", "Bob")]))
            .await;
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);
        assert_eq!(store.counts().unwrap().entities, 0);
        assert_eq!(bus.subscriber_count(Topic::EntityExtracted), 0);
    }
}

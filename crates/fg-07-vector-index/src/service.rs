//! Vector indexing stage wiring.

use crate::ports::{Collection, VectorIndex, VectorPayload};
use async_trait::async_trait;
use shared_bus::{DynHandler, Event, EventHandler, StageContext, Topic};
use shared_types::{Stage, StageError, StageId, StageInfo, StageStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

struct IndexHandler {
    ctx: StageContext,
    index: Arc<dyn VectorIndex>,
}

#[async_trait]
impl EventHandler for IndexHandler {
    fn name(&self) -> &str {
        "fg-07-vector-index.upsert"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        let (collection, id, vector, payload) = match event.as_ref() {
            Event::EntityEmbedded(e) => (
                Collection::Entities,
                &e.entity_id,
                &e.vector,
                VectorPayload {
                    doc_id: e.doc_id.clone(),
                    text: e.text.clone(),
                    entity_type: Some(e.entity_type.clone()),
                },
            ),
            Event::RelationshipEmbedded(e) => (
                Collection::Relationships,
                &e.relationship_id,
                &e.vector,
                VectorPayload {
                    doc_id: e.doc_id.clone(),
                    text: e.text.clone(),
                    entity_type: None,
                },
            ),
            _ => return Ok(()),
        };

        match self.index.upsert(collection, id, vector.clone(), payload).await {
            Ok(()) => debug!(collection = %collection, id = %id, "Vector indexed"),
            Err(e) => {
                self.ctx
                    .report_failure(StageId::VectorIndex, event.doc_id(), e.to_string())
                    .await;
            }
        }
        Ok(())
    }
}

/// Stage 7: keeps the vector index in step with the embedding stage.
pub struct VectorIndexStage {
    ctx: StageContext,
    index: Arc<dyn VectorIndex>,
    handler: DynHandler,
    running: AtomicBool,
}

impl VectorIndexStage {
    pub fn new(ctx: StageContext, index: Arc<dyn VectorIndex>) -> Self {
        let handler: DynHandler = Arc::new(IndexHandler {
            ctx: ctx.clone(),
            index: Arc::clone(&index),
        });
        Self {
            ctx,
            index,
            handler,
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn index(&self) -> &Arc<dyn VectorIndex> {
        &self.index
    }
}

#[async_trait]
impl Stage for VectorIndexStage {
    fn id(&self) -> StageId {
        StageId::VectorIndex
    }

    fn name(&self) -> &'static str {
        "Vector Indexing"
    }

    fn info(&self) -> StageInfo {
        StageInfo::new(self.id(), self.name())
            .described_as("Indexes entity and relationship embeddings for similarity search")
            .subscribes_to(vec![
                Topic::EntityEmbedded.as_str(),
                Topic::RelationshipEmbedded.as_str(),
            ])
            .publishes_events(vec![])
    }

    async fn start(&self) -> Result<(), StageError> {
        let bus = self.ctx.bus();
        bus.subscribe(Topic::EntityEmbedded, Arc::clone(&self.handler));
        bus.subscribe(Topic::RelationshipEmbedded, Arc::clone(&self.handler));
        self.running.store(true, Ordering::SeqCst);
        info!(stage = %self.id(), dimension = self.index.dimension(), "Stage started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), StageError> {
        let bus = self.ctx.bus();
        bus.unsubscribe(Topic::EntityEmbedded, &self.handler);
        bus.unsubscribe(Topic::RelationshipEmbedded, &self.handler);
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
    use crate::adapters::InMemoryVectorIndex;
    use crate::ports::SearchQuery;
    use shared_bus::events::{EntityEmbedded, RelationshipEmbedded};
    use shared_bus::{EventBus, EventPublisher};
    use std::time::Duration;

    fn entity_event(id: &str, vector: Vec<f32>) -> Event {
        Event::EntityEmbedded(EntityEmbedded {
            entity_id: id.into(),
            doc_id: "d1".into(),
            entity_type: "PERSON".into(),
            text: id.into(),
            vector,
        })
    }

    #[tokio::test]
    async fn test_indexes_both_collections() {
        let bus = Arc::new(EventBus::new());
        let index = Arc::new(InMemoryVectorIndex::new(2));
        let stage = VectorIndexStage::new(StageContext::new(Arc::clone(&bus)), index.clone());
        stage.start().await.unwrap();

        bus.publish(entity_event("e1", vec![1.0, 0.0])).await;
        bus.publish(Event::RelationshipEmbedded(RelationshipEmbedded {
            relationship_id: "r1".into(),
            doc_id: "d1".into(),
            text: "a knows b".into(),
            vector: vec![0.0, 1.0],
        }))
        .await;
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);

        assert_eq!(index.len(Collection::Entities).await.unwrap(), 1);
        assert_eq!(index.len(Collection::Relationships).await.unwrap(), 1);
        let hits = index
            .search(Collection::Entities, &SearchQuery::new(vec![1.0, 0.0]))
            .await
            .unwrap();
        assert_eq!(hits[0].payload.entity_type.as_deref(), Some("PERSON"));
    }

    #[tokio::test]
    async fn test_bad_vector_reported() {
        let bus = Arc::new(EventBus::new());
        let index = Arc::new(InMemoryVectorIndex::new(2));
        let stage = VectorIndexStage::new(StageContext::new(Arc::clone(&bus)), index.clone());
        stage.start().await.unwrap();
        let mut dlq = bus.stream(Topic::DeadLetter);

        bus.publish(entity_event("e1", vec![1.0, 0.0, 0.0])).await;
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);

        assert_eq!(index.len(Collection::Entities).await.unwrap(), 0);
        let failure = dlq.try_recv().unwrap();
        assert!(matches!(failure.as_ref(), Event::StageFailed(f) if f.stage == StageId::VectorIndex));
    }
}

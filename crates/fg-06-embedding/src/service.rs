//! Embedding stage wiring.

use crate::ports::{EmbedError, Embedder};
use async_trait::async_trait;
use shared_bus::events::{EntityEmbedded, RelationshipEmbedded};
use shared_bus::{DynHandler, Event, EventHandler, StageContext, Topic};
use shared_types::{Entity, Relationship, Stage, StageError, StageId, StageInfo, StageStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Text embedded for a relationship: `source relation target`.
#[must_use]
pub fn relationship_text(rel: &Relationship) -> String {
    format!(
        "{} {} {}",
        rel.source,
        rel.relation_type.replace('_', " ").to_lowercase(),
        rel.target
    )
}

struct EntityHandler {
    ctx: StageContext,
    embedder: Arc<dyn Embedder>,
}

impl EntityHandler {
    async fn embed_one(&self, doc_id: &str, entity: &Entity) -> Result<bool, EmbedError> {
        let vector = match self.embedder.embed(&entity.text).await {
            Ok(vector) => vector,
            Err(EmbedError::EmptyInput) => return Ok(false),
            Err(e) => return Err(e),
        };
        check_dimension(self.embedder.as_ref(), &vector)?;
        self.ctx
            .publish(Event::EntityEmbedded(EntityEmbedded {
                entity_id: entity.id(),
                doc_id: doc_id.to_string(),
                entity_type: entity.entity_type.clone(),
                text: entity.text.clone(),
                vector,
            }))
            .await;
        Ok(true)
    }
}

#[async_trait]
impl EventHandler for EntityHandler {
    fn name(&self) -> &str {
        "fg-06-embedding.entity_extracted"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        let Event::EntityExtracted(extracted) = event.as_ref() else {
            return Ok(());
        };
        if self.ctx.is_cancelled() {
            return Ok(());
        }

        let mut embedded = 0usize;
        for entity in &extracted.entities {
            match self.embed_one(&extracted.doc_id, entity).await {
                Ok(true) => embedded += 1,
                Ok(false) => {}
                Err(e) => {
                    self.ctx
                        .report_failure(StageId::Embedding, Some(&extracted.doc_id), e.to_string())
                        .await;
                    return Ok(());
                }
            }
        }
        debug!(doc_id = %extracted.doc_id, embedded, "Entities embedded");
        Ok(())
    }
}

struct RelationshipHandler {
    ctx: StageContext,
    embedder: Arc<dyn Embedder>,
}

impl RelationshipHandler {
    async fn embed_one(&self, doc_id: &str, rel: &Relationship) -> Result<(), EmbedError> {
        let text = relationship_text(rel);
        let vector = self.embedder.embed(&text).await?;
        check_dimension(self.embedder.as_ref(), &vector)?;
        self.ctx
            .publish(Event::RelationshipEmbedded(RelationshipEmbedded {
                relationship_id: rel.id(),
                doc_id: doc_id.to_string(),
                text,
                vector,
            }))
            .await;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for RelationshipHandler {
    fn name(&self) -> &str {
        "fg-06-embedding.relationship_found"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        let Event::RelationshipFound(found) = event.as_ref() else {
            return Ok(());
        };
        if self.ctx.is_cancelled() {
            return Ok(());
        }

        for rel in &found.relationships {
            if let Err(e) = self.embed_one(&found.doc_id, rel).await {
                self.ctx
                    .report_failure(StageId::Embedding, Some(&found.doc_id), e.to_string())
                    .await;
                return Ok(());
            }
        }
        debug!(doc_id = %found.doc_id, embedded = found.relationships.len(), "Relationships embedded");
        Ok(())
    }
}

fn check_dimension(embedder: &dyn Embedder, vector: &[f32]) -> Result<(), EmbedError> {
    if vector.len() == embedder.dimension() {
        Ok(())
    } else {
        Err(EmbedError::DimensionMismatch {
            expected: embedder.dimension(),
            actual: vector.len(),
        })
    }
}

/// Stage 6: embeds entities and relationships.
pub struct EmbeddingStage {
    ctx: StageContext,
    entity_handler: DynHandler,
    relationship_handler: DynHandler,
    running: AtomicBool,
}

impl EmbeddingStage {
    pub fn new(ctx: StageContext, embedder: Arc<dyn Embedder>) -> Self {
        let entity_handler: DynHandler = Arc::new(EntityHandler {
            ctx: ctx.clone(),
            embedder: Arc::clone(&embedder),
        });
        let relationship_handler: DynHandler = Arc::new(RelationshipHandler {
            ctx: ctx.clone(),
            embedder,
        });
        Self {
            ctx,
            entity_handler,
            relationship_handler,
            running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Stage for EmbeddingStage {
    fn id(&self) -> StageId {
        StageId::Embedding
    }

    fn name(&self) -> &'static str {
        "Embedding"
    }

    fn info(&self) -> StageInfo {
        StageInfo::new(self.id(), self.name())
            .described_as("Embeds extracted entities and resolved relationships")
            .subscribes_to(vec![
                Topic::EntityExtracted.as_str(),
                Topic::RelationshipFound.as_str(),
            ])
            .publishes_events(vec![
                Topic::EntityEmbedded.as_str(),
                Topic::RelationshipEmbedded.as_str(),
            ])
    }

    async fn start(&self) -> Result<(), StageError> {
        let bus = self.ctx.bus();
        bus.subscribe(Topic::EntityExtracted, Arc::clone(&self.entity_handler));
        bus.subscribe(Topic::RelationshipFound, Arc::clone(&self.relationship_handler));
        self.running.store(true, Ordering::SeqCst);
        info!(stage = %self.id(), "Stage started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), StageError> {
        let bus = self.ctx.bus();
        bus.unsubscribe(Topic::EntityExtracted, &self.entity_handler);
        bus.unsubscribe(Topic::RelationshipFound, &self.relationship_handler);
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

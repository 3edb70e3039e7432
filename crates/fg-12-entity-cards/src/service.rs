//! Entity card stage wiring.

use crate::domain::entity_card;
use async_trait::async_trait;
use fg_05_persistence::KnowledgeStore;
use shared_bus::{DynHandler, Event, EventHandler, StageContext, Topic};
use shared_types::{Stage, StageError, StageId, StageInfo, StageStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

struct CardHandler {
    ctx: StageContext,
    store: Arc<dyn KnowledgeStore>,
}

#[async_trait]
impl EventHandler for CardHandler {
    fn name(&self) -> &str {
        "fg-12-entity-cards.entity_extracted"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        let Event::EntityExtracted(extracted) = event.as_ref() else {
            return Ok(());
        };

        let mut published = 0;
        for entity in &extracted.entities {
            // A store error costs the card its count, not the card itself.
            let count = self.store.relationship_count(&entity.id()).unwrap_or_else(|e| {
                warn!(entity = %entity.text, error = %e, "Relationship count unavailable");
                0
            });
            let Some(card) = entity_card(entity, count) else {
                debug!(doc_id = %extracted.doc_id, "Entity without text, no card");
                continue;
            };
            self.ctx.publish(Event::EntityCardReady(card)).await;
            published += 1;
        }
        debug!(doc_id = %extracted.doc_id, published, "Entity cards published");
        Ok(())
    }
}

/// Stage 12: entity cards.
pub struct EntityCardStage {
    ctx: StageContext,
    handler: DynHandler,
    running: AtomicBool,
}

impl EntityCardStage {
    pub fn new(ctx: StageContext, store: Arc<dyn KnowledgeStore>) -> Self {
        let handler: DynHandler = Arc::new(CardHandler {
            ctx: ctx.clone(),
            store,
        });
        Self {
            ctx,
            handler,
            running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Stage for EntityCardStage {
    fn id(&self) -> StageId {
        StageId::EntityCards
    }

    fn name(&self) -> &'static str {
        "Entity Cards"
    }

    fn info(&self) -> StageInfo {
        StageInfo::new(self.id(), self.name())
            .described_as("Publishes a summary card for every extracted entity")
            .subscribes_to(vec![Topic::EntityExtracted.as_str()])
            .publishes_events(vec![Topic::EntityCardReady.as_str()])
    }

    async fn start(&self) -> Result<(), StageError> {
        self.ctx
            .bus()
            .subscribe(Topic::EntityExtracted, Arc::clone(&self.handler));
        self.running.store(true, Ordering::SeqCst);
        info!(stage = %self.id(), "Stage started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), StageError> {
        self.ctx.bus().unsubscribe(Topic::EntityExtracted, &self.handler);
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

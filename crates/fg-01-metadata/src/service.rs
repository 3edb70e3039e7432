//! Metadata stage wiring.

use crate::domain::extract_metadata;
use async_trait::async_trait;
use shared_bus::events::DocumentMetadataExtracted;
use shared_bus::{DynHandler, Event, EventHandler, StageContext, Topic};
use shared_types::{Stage, StageError, StageId, StageInfo, StageStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

const STAGE_NAME: &str = "Document Metadata";

/// Handler for `data.ingested`.
struct MetadataHandler {
    ctx: StageContext,
}

#[async_trait]
impl EventHandler for MetadataHandler {
    fn name(&self) -> &str {
        "fg-01-metadata.data_ingested"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        let Event::DataIngested(ingested) = event.as_ref() else {
            return Ok(());
        };
        if self.ctx.is_cancelled() {
            return Ok(());
        }

        if ingested.content.trim().is_empty() {
            warn!(doc_id = %ingested.doc_id, "Document has no content");
            return Ok(());
        }

        let metadata = extract_metadata(&ingested.content);
        if metadata.is_empty() {
            debug!(doc_id = %ingested.doc_id, "No metadata in document header");
            return Ok(());
        }

        info!(doc_id = %ingested.doc_id, ?metadata, "Extracted document metadata");
        self.ctx
            .publish(Event::DocumentMetadata(DocumentMetadataExtracted {
                doc_id: ingested.doc_id.clone(),
                metadata,
            }))
            .await;
        Ok(())
    }
}

/// Stage 1: report header metadata.
pub struct MetadataStage {
    ctx: StageContext,
    handler: DynHandler,
    running: AtomicBool,
}

impl MetadataStage {
    pub fn new(ctx: StageContext) -> Self {
        let handler: DynHandler = Arc::new(MetadataHandler { ctx: ctx.clone() });
        Self {
            ctx,
            handler,
            running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Stage for MetadataStage {
    fn id(&self) -> StageId {
        StageId::Metadata
    }

    fn name(&self) -> &'static str {
        STAGE_NAME
    }

    fn info(&self) -> StageInfo {
        StageInfo::new(self.id(), self.name())
            .described_as("Extracts classification, report id, date and origin from report headers")
            .subscribes_to(vec![Topic::DataIngested.as_str()])
            .publishes_events(vec![Topic::DocumentMetadata.as_str()])
    }

    async fn start(&self) -> Result<(), StageError> {
        self.ctx
            .bus()
            .subscribe(Topic::DataIngested, Arc::clone(&self.handler));
        self.running.store(true, Ordering::SeqCst);
        info!(stage = %self.id(), "Stage started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), StageError> {
        self.ctx.bus().unsubscribe(Topic::DataIngested, &self.handler);
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
    use shared_bus::{EventBus, EventPublisher};
    use std::time::Duration;

    #[tokio::test]
    async fn test_publishes_metadata_for_report() {
        let bus = Arc::new(EventBus::new());
        let stage = MetadataStage::new(StageContext::new(Arc::clone(&bus)));
        stage.start().await.unwrap();
        let mut out = bus.stream(Topic::DocumentMetadata);

        bus.publish(Event::data_ingested("r1_chunk_0", "TOP SECRET\nREPORT ID: AX-77\nBody"))
            .await;

        let event = tokio::time::timeout(Duration::from_secs(1), out.recv())
            .await
            .unwrap()
            .unwrap();
        let Event::DocumentMetadata(meta) = event.as_ref() else {
            panic!("unexpected event");
        };
        assert_eq!(meta.doc_id, "r1_chunk_0");
        assert_eq!(meta.metadata.report_id.as_deref(), Some("AX-77"));
    }

    #[tokio::test]
    async fn test_no_event_without_metadata() {
        let bus = Arc::new(EventBus::new());
        let stage = MetadataStage::new(StageContext::new(Arc::clone(&bus)));
        stage.start().await.unwrap();
        let mut out = bus.stream(Topic::DocumentMetadata);

        bus.publish(Event::data_ingested("d", "just some prose")).await;
        bus.publish(Event::data_ingested("e", "   ")).await;
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);
        assert!(out.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_start_twice_and_stop() {
        let bus = Arc::new(EventBus::new());
        let stage = MetadataStage::new(StageContext::new(Arc::clone(&bus)));

        stage.start().await.unwrap();
        stage.start().await.unwrap();
        assert_eq!(bus.subscriber_count(Topic::DataIngested), 1);
        assert_eq!(stage.health_check().await, StageStatus::Healthy);

        stage.stop().await.unwrap();
        assert_eq!(bus.subscriber_count(Topic::DataIngested), 0);
        assert_eq!(stage.health_check().await, StageStatus::Stopped);
    }
}

//! Extraction stage wiring.

use crate::domain::{extraction_prompt, normalize_entities, NormalizeError};
use async_trait::async_trait;
use forge_llm::{CompletionRequest, LlmClient, LlmError};
use shared_bus::events::DataIngested;
use shared_bus::{DynHandler, Event, EventHandler, StageContext, Topic};
use shared_types::{Stage, StageError, StageId, StageInfo, StageStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

/// LLM settings for extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            temperature: 0.3,
        }
    }
}

struct ExtractionHandler {
    ctx: StageContext,
    llm: LlmClient,
    config: ExtractionConfig,
}

/// Why a chunk produced no `entity.extracted` event.
#[derive(Debug, Error)]
enum ExtractError {
    #[error("run cancelled")]
    Cancelled,
    #[error("entity extraction failed: {0}")]
    Llm(LlmError),
    #[error(transparent)]
    Normalize(#[from] NormalizeError),
    #[error("no valid entities in model output")]
    NoEntities,
}

impl From<LlmError> for ExtractError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Cancelled => Self::Cancelled,
            other => Self::Llm(other),
        }
    }
}

impl ExtractionHandler {
    async fn extract(&self, ingested: &DataIngested) -> Result<(), ExtractError> {
        let request = CompletionRequest::new(extraction_prompt(&ingested.content))
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);

        let raw: serde_json::Value = self
            .llm
            .complete_json(&request, self.ctx.cancel_token())
            .await?;

        let entities = normalize_entities(raw)?;
        if entities.is_empty() {
            return Err(ExtractError::NoEntities);
        }

        info!(doc_id = %ingested.doc_id, count = entities.len(), "Extracted entities");
        self.ctx
            .publish(Event::entity_extracted(ingested.doc_id.clone(), entities))
            .await;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for ExtractionHandler {
    fn name(&self) -> &str {
        "fg-02-extraction.data_ingested"
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

        debug!(doc_id = %ingested.doc_id, chars = ingested.content.len(), "Extracting entities");
        match self.extract(ingested).await {
            Ok(()) | Err(ExtractError::Cancelled) => {}
            Err(e) => {
                self.ctx
                    .report_failure(StageId::Extraction, Some(&ingested.doc_id), e.to_string())
                    .await;
            }
        }
        Ok(())
    }
}

/// Stage 2: LLM entity extraction.
pub struct ExtractionStage {
    ctx: StageContext,
    handler: DynHandler,
    running: AtomicBool,
}

impl ExtractionStage {
    pub fn new(ctx: StageContext, llm: LlmClient, config: ExtractionConfig) -> Self {
        let handler: DynHandler = Arc::new(ExtractionHandler {
            ctx: ctx.clone(),
            llm,
            config,
        });
        Self {
            ctx,
            handler,
            running: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Stage for ExtractionStage {
    fn id(&self) -> StageId {
        StageId::Extraction
    }

    fn name(&self) -> &'static str {
        "Entity Extraction"
    }

    fn info(&self) -> StageInfo {
        StageInfo::new(self.id(), self.name())
            .described_as("Extracts typed named entities from each chunk with the LLM")
            .uses_llm()
            .subscribes_to(vec![Topic::DataIngested.as_str()])
            .publishes_events(vec![Topic::EntityExtracted.as_str()])
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

//! Narrative stage wiring.

use crate::domain::narrative_prompt;
use async_trait::async_trait;
use forge_llm::{CompletionRequest, LlmClient, LlmError};
use shared_bus::events::{GraphUpdated, NarrativeGenerated};
use shared_bus::{DynHandler, Event, EventHandler, StageContext, Topic};
use shared_types::{Stage, StageError, StageId, StageInfo, StageStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct NarrativeConfig {
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for NarrativeConfig {
    fn default() -> Self {
        Self {
            max_tokens: 1500,
            temperature: 0.5,
        }
    }
}

#[derive(Debug, Error)]
enum NarrativeError {
    #[error("run cancelled")]
    Cancelled,
    #[error("narrative synthesis failed: {0}")]
    Llm(LlmError),
    #[error("model returned an empty narrative")]
    Empty,
}

impl From<LlmError> for NarrativeError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Cancelled => Self::Cancelled,
            other => Self::Llm(other),
        }
    }
}

struct NarrativeHandler {
    ctx: StageContext,
    llm: LlmClient,
    config: NarrativeConfig,
}

impl NarrativeHandler {
    async fn synthesize(&self, updated: &GraphUpdated) -> Result<(), NarrativeError> {
        let request = CompletionRequest::new(narrative_prompt(&updated.doc_id, &updated.graph_stats))
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);
        let text = self.llm.complete(&request, self.ctx.cancel_token()).await?;
        let narrative = text.trim();
        if narrative.is_empty() {
            return Err(NarrativeError::Empty);
        }

        info!(doc_id = %updated.doc_id, chars = narrative.len(), "Narrative generated");
        self.ctx
            .publish(Event::NarrativeGenerated(NarrativeGenerated {
                doc_id: updated.doc_id.clone(),
                narrative: narrative.to_string(),
            }))
            .await;
        Ok(())
    }
}

#[async_trait]
impl EventHandler for NarrativeHandler {
    fn name(&self) -> &str {
        "fg-11-narrative.graph_updated"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        let Event::GraphUpdated(updated) = event.as_ref() else {
            return Ok(());
        };
        if self.ctx.is_cancelled() {
            return Ok(());
        }
        if !updated.is_complete {
            debug!(doc_id = %updated.doc_id, "Waiting for the document's remaining batches");
            return Ok(());
        }
        if updated.graph_stats.edges.is_empty() {
            debug!(doc_id = %updated.doc_id, "Nothing to narrate");
            return Ok(());
        }

        match self.synthesize(updated).await {
            Ok(()) | Err(NarrativeError::Cancelled) => {}
            Err(e) => {
                self.ctx
                    .report_failure(StageId::Narrative, Some(&updated.doc_id), e.to_string())
                    .await;
            }
        }
        Ok(())
    }
}

/// Stage 11: narrative synthesis.
pub struct NarrativeStage {
    ctx: StageContext,
    handler: DynHandler,
    running: AtomicBool,
}

impl NarrativeStage {
    pub fn new(ctx: StageContext, llm: LlmClient, config: NarrativeConfig) -> Self {
        let handler: DynHandler = Arc::new(NarrativeHandler {
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
impl Stage for NarrativeStage {
    fn id(&self) -> StageId {
        StageId::Narrative
    }

    fn name(&self) -> &'static str {
        "Narrative Synthesis"
    }

    fn info(&self) -> StageInfo {
        StageInfo::new(self.id(), self.name())
            .described_as("Summarises each document's graph as prose")
            .uses_llm()
            .subscribes_to(vec![Topic::GraphUpdated.as_str()])
            .publishes_events(vec![Topic::NarrativeGenerated.as_str()])
    }

    async fn start(&self) -> Result<(), StageError> {
        self.ctx
            .bus()
            .subscribe(Topic::GraphUpdated, Arc::clone(&self.handler));
        self.running.store(true, Ordering::SeqCst);
        info!(stage = %self.id(), "Stage started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), StageError> {
        self.ctx.bus().unsubscribe(Topic::GraphUpdated, &self.handler);
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

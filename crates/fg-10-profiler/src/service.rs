//! Profiler stage wiring.

use crate::domain::{profile_prompt, relation_lines, ProfileDraft, ProfileError};
use async_trait::async_trait;
use forge_llm::{CompletionRequest, LlmClient, LlmError};
use parking_lot::Mutex;
use shared_bus::events::{GraphUpdated, SemanticProfile};
use shared_bus::{DynHandler, Event, EventHandler, StageContext, Topic};
use shared_types::{
    derive_entity_id, GraphNode, Stage, StageError, StageId, StageInfo, StageStatus,
};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

const PROGRESS_STAGE: &str = "profiler";

#[derive(Debug, Clone, PartialEq)]
pub struct ProfilerConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Nodes profiled per `graph.updated` event.
    pub max_per_event: usize,
    /// Pause between two profiles.
    pub delay: Duration,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            temperature: 0.3,
            max_per_event: 10,
            delay: Duration::from_millis(300),
        }
    }
}

#[derive(Debug, Error)]
enum ProfilerError {
    #[error("run cancelled")]
    Cancelled,
    #[error("profile generation failed: {0}")]
    Llm(LlmError),
    #[error(transparent)]
    Invalid(#[from] ProfileError),
}

impl From<LlmError> for ProfilerError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Cancelled => Self::Cancelled,
            other => Self::Llm(other),
        }
    }
}

struct ProfilerHandler {
    ctx: StageContext,
    llm: LlmClient,
    config: ProfilerConfig,
    /// Node ids profiled or being profiled.
    claimed: Arc<Mutex<HashSet<String>>>,
}

impl ProfilerHandler {
    fn claim(&self, nodes: &[GraphNode]) -> Vec<GraphNode> {
        let mut claimed = self.claimed.lock();
        nodes
            .iter()
            .filter(|n| claimed.insert(n.id.clone()))
            .take(self.config.max_per_event)
            .cloned()
            .collect()
    }

    fn release(&self, nodes: &[GraphNode]) {
        let mut claimed = self.claimed.lock();
        for node in nodes {
            claimed.remove(&node.id);
        }
    }

    async fn profile(&self, updated: &GraphUpdated, node: &GraphNode) -> Result<(), ProfilerError> {
        let relations = relation_lines(&node.id, &updated.graph_stats.edges);
        let request = CompletionRequest::new(profile_prompt(&node.id, &node.node_type, &relations))
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);
        let draft: ProfileDraft = self
            .llm
            .complete_json(&request, self.ctx.cancel_token())
            .await?;
        let profile = draft.validate()?;

        self.ctx
            .publish(Event::SemanticProfile(SemanticProfile {
                entity_id: derive_entity_id(&node.node_type, &node.id),
                name: node.id.clone(),
                entity_type: node.node_type.clone(),
                summary: profile.summary,
                key_attributes: profile.key_attributes,
                importance: profile.importance,
            }))
            .await;
        Ok(())
    }

    /// Sleep for the configured delay. Returns `false` if cancelled first.
    async fn pause(&self) -> bool {
        if self.config.delay.is_zero() {
            return true;
        }
        tokio::select! {
            () = self.ctx.cancel_token().cancelled() => false,
            () = tokio::time::sleep(self.config.delay) => true,
        }
    }
}

#[async_trait]
impl EventHandler for ProfilerHandler {
    fn name(&self) -> &str {
        "fg-10-profiler.graph_updated"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        let Event::GraphUpdated(updated) = event.as_ref() else {
            return Ok(());
        };
        if self.ctx.is_cancelled() {
            return Ok(());
        }

        // Claim before the first await so overlapping updates never profile
        // the same node twice.
        let batch = self.claim(&updated.graph_stats.nodes);
        if batch.is_empty() {
            debug!(doc_id = %updated.doc_id, "No new nodes to profile");
            return Ok(());
        }

        let total = batch.len();
        self.ctx
            .publish(Event::processing_started(
                PROGRESS_STAGE,
                format!("Profiling {total} entities"),
                Some(total),
            ))
            .await;

        let mut profiled = 0usize;
        for (i, node) in batch.iter().enumerate() {
            if i > 0 && !self.pause().await {
                self.release(&batch[i..]);
                break;
            }
            match self.profile(updated, node).await {
                Ok(()) => profiled += 1,
                Err(ProfilerError::Cancelled) => {
                    self.release(&batch[i..]);
                    break;
                }
                Err(e) => {
                    self.release(std::slice::from_ref(node));
                    self.ctx
                        .report_failure(
                            StageId::Profiler,
                            Some(&updated.doc_id),
                            format!("{}: {e}", node.id),
                        )
                        .await;
                }
            }
        }

        info!(doc_id = %updated.doc_id, profiled, total, "Profiling finished");
        self.ctx
            .publish(Event::processing_ended(
                PROGRESS_STAGE,
                format!("Profiled {profiled} of {total} entities"),
                Some(total),
                Some(profiled),
            ))
            .await;
        Ok(())
    }
}

/// Stage 10: semantic profiles of graph entities.
pub struct ProfilerStage {
    ctx: StageContext,
    handler: DynHandler,
    claimed: Arc<Mutex<HashSet<String>>>,
    running: AtomicBool,
}

impl ProfilerStage {
    pub fn new(ctx: StageContext, llm: LlmClient, config: ProfilerConfig) -> Self {
        let claimed = Arc::new(Mutex::new(HashSet::new()));
        let handler: DynHandler = Arc::new(ProfilerHandler {
            ctx: ctx.clone(),
            llm,
            config,
            claimed: Arc::clone(&claimed),
        });
        Self {
            ctx,
            handler,
            claimed,
            running: AtomicBool::new(false),
        }
    }

    /// Nodes profiled so far, including those in progress.
    #[must_use]
    pub fn profiled_count(&self) -> usize {
        self.claimed.lock().len()
    }
}

#[async_trait]
impl Stage for ProfilerStage {
    fn id(&self) -> StageId {
        StageId::Profiler
    }

    fn name(&self) -> &'static str {
        "Semantic Profiling"
    }

    fn info(&self) -> StageInfo {
        StageInfo::new(self.id(), self.name())
            .described_as("Writes an LLM profile for each new graph entity")
            .uses_llm()
            .subscribes_to(vec![Topic::GraphUpdated.as_str()])
            .publishes_events(vec![
                Topic::ProcessingStarted.as_str(),
                Topic::ProcessingEnded.as_str(),
                Topic::SemanticProfile.as_str(),
            ])
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

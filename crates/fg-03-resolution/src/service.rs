//! Resolution stage wiring.

use crate::domain::{relationship_prompt, resolve_relationships, ContentCache, RelationError};
use async_trait::async_trait;
use forge_llm::{CompletionRequest, LlmClient, LlmError};
use shared_bus::events::EntityExtracted;
use shared_bus::{DynHandler, Event, EventHandler, StageContext, Topic};
use shared_types::{Stage, StageError, StageId, StageInfo, StageStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Settings for relationship resolution.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolutionConfig {
    pub max_tokens: u32,
    pub temperature: f32,
    /// Relationships per published batch.
    pub batch_size: usize,
    /// How long to wait for a chunk's content to be cached.
    pub content_wait: Duration,
}

impl Default for ResolutionConfig {
    fn default() -> Self {
        Self {
            max_tokens: 2000,
            temperature: 0.3,
            batch_size: 25,
            content_wait: Duration::from_secs(5),
        }
    }
}

#[derive(Debug, Error)]
enum ResolveError {
    #[error("run cancelled")]
    Cancelled,
    #[error("chunk content unavailable")]
    MissingContent,
    #[error("relationship extraction failed: {0}")]
    Llm(LlmError),
    #[error(transparent)]
    Output(#[from] RelationError),
}

impl From<LlmError> for ResolveError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Cancelled => Self::Cancelled,
            other => Self::Llm(other),
        }
    }
}

/// Remembers chunk content from `data.ingested`.
struct ContentHandler {
    cache: Arc<ContentCache>,
}

#[async_trait]
impl EventHandler for ContentHandler {
    fn name(&self) -> &str {
        "fg-03-resolution.data_ingested"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        if let Event::DataIngested(ingested) = event.as_ref() {
            self.cache.insert(&ingested.doc_id, &ingested.content);
        }
        Ok(())
    }
}

/// Forgets chunks whose extraction failed; they never reach resolution.
struct ReleaseHandler {
    cache: Arc<ContentCache>,
}

#[async_trait]
impl EventHandler for ReleaseHandler {
    fn name(&self) -> &str {
        "fg-03-resolution.dead_letter"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        if let Event::StageFailed(failure) = event.as_ref() {
            if failure.stage == StageId::Extraction {
                if let Some(doc_id) = &failure.doc_id {
                    self.cache.release(doc_id);
                }
            }
        }
        Ok(())
    }
}

/// Resolves relationships for `entity.extracted`.
struct ResolveHandler {
    ctx: StageContext,
    llm: LlmClient,
    cache: Arc<ContentCache>,
    config: ResolutionConfig,
}

impl ResolveHandler {
    async fn resolve(&self, extracted: &EntityExtracted) -> Result<usize, ResolveError> {
        let content = self
            .cache
            .wait_take(&extracted.doc_id, self.config.content_wait)
            .await
            .ok_or(ResolveError::MissingContent)?;

        let request = CompletionRequest::new(relationship_prompt(&content, &extracted.entities))
            .with_max_tokens(self.config.max_tokens)
            .with_temperature(self.config.temperature);
        let raw: serde_json::Value = self
            .llm
            .complete_json(&request, self.ctx.cancel_token())
            .await?;

        let relationships = resolve_relationships(raw, &extracted.entities)?;
        if relationships.is_empty() {
            return Ok(0);
        }

        let total = relationships.len();
        let batches: Vec<_> = relationships
            .chunks(self.config.batch_size.max(1))
            .map(<[_]>::to_vec)
            .collect();
        let last = batches.len() - 1;
        for (index, batch) in batches.into_iter().enumerate() {
            self.ctx
                .publish(Event::relationship_batch(
                    extracted.doc_id.clone(),
                    batch,
                    index,
                    index == last,
                ))
                .await;
        }
        Ok(total)
    }
}

#[async_trait]
impl EventHandler for ResolveHandler {
    fn name(&self) -> &str {
        "fg-03-resolution.entity_extracted"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        let Event::EntityExtracted(extracted) = event.as_ref() else {
            return Ok(());
        };
        if self.ctx.is_cancelled() {
            return Ok(());
        }
        if extracted.entities.len() < 2 {
            self.cache.release(&extracted.doc_id);
            debug!(doc_id = %extracted.doc_id, "Fewer than two entities, no relationships possible");
            return Ok(());
        }

        match self.resolve(extracted).await {
            Ok(0) => debug!(doc_id = %extracted.doc_id, "No relationships found"),
            Ok(count) => info!(doc_id = %extracted.doc_id, count, "Resolved relationships"),
            Err(ResolveError::Cancelled) => {}
            Err(e) => {
                self.ctx
                    .report_failure(StageId::Resolution, Some(&extracted.doc_id), e.to_string())
                    .await;
            }
        }
        Ok(())
    }
}

/// Stage 3: relationships between extracted entities.
pub struct ResolutionStage {
    ctx: StageContext,
    cache: Arc<ContentCache>,
    content_handler: DynHandler,
    release_handler: DynHandler,
    resolve_handler: DynHandler,
    running: AtomicBool,
}

impl ResolutionStage {
    pub fn new(ctx: StageContext, llm: LlmClient, config: ResolutionConfig) -> Self {
        let cache = Arc::new(ContentCache::new());
        let content_handler: DynHandler = Arc::new(ContentHandler {
            cache: Arc::clone(&cache),
        });
        let release_handler: DynHandler = Arc::new(ReleaseHandler {
            cache: Arc::clone(&cache),
        });
        let resolve_handler: DynHandler = Arc::new(ResolveHandler {
            ctx: ctx.clone(),
            llm,
            cache: Arc::clone(&cache),
            config,
        });
        Self {
            ctx,
            cache,
            content_handler,
            release_handler,
            resolve_handler,
            running: AtomicBool::new(false),
        }
    }

    /// Chunks ingested but not yet resolved.
    #[must_use]
    pub fn cached_chunks(&self) -> usize {
        self.cache.len()
    }
}

#[async_trait]
impl Stage for ResolutionStage {
    fn id(&self) -> StageId {
        StageId::Resolution
    }

    fn name(&self) -> &'static str {
        "Relationship Resolution"
    }

    fn info(&self) -> StageInfo {
        StageInfo::new(self.id(), self.name())
            .described_as("Finds relationships between the entities of each chunk")
            .uses_llm()
            .subscribes_to(vec![
                Topic::DataIngested.as_str(),
                Topic::EntityExtracted.as_str(),
                Topic::DeadLetter.as_str(),
            ])
            .publishes_events(vec![Topic::RelationshipFound.as_str()])
    }

    async fn start(&self) -> Result<(), StageError> {
        let bus = self.ctx.bus();
        bus.subscribe(Topic::DataIngested, Arc::clone(&self.content_handler));
        bus.subscribe(Topic::EntityExtracted, Arc::clone(&self.resolve_handler));
        bus.subscribe(Topic::DeadLetter, Arc::clone(&self.release_handler));
        self.running.store(true, Ordering::SeqCst);
        info!(stage = %self.id(), "Stage started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), StageError> {
        let bus = self.ctx.bus();
        bus.unsubscribe(Topic::DataIngested, &self.content_handler);
        bus.unsubscribe(Topic::EntityExtracted, &self.resolve_handler);
        bus.unsubscribe(Topic::DeadLetter, &self.release_handler);
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
    use forge_llm::{RateLimiter, RetryPolicy, ScriptedProvider};
    use shared_bus::{EventBus, EventPublisher};
    use shared_types::Entity;

    const REPLY: &str = r#"[
        {"source": "Alice", "target": "ACME", "relation_type": "WORKS_FOR", "confidence": 0.8},
        {"source": "ACME", "target": "Berlin", "relation_type": "LOCATED_IN"},
        {"source": "Alice", "target": "Berlin", "relation_type": "LIVES_IN"},
        {"source": "Alice", "target": "Mallory", "relation_type": "KNOWS"}
    ]"#;

    fn entities() -> Vec<Entity> {
        vec![
            Entity::new("PERSON", "Alice"),
            Entity::new("ORGANIZATION", "ACME"),
            Entity::new("LOCATION", "Berlin"),
        ]
    }

    fn stage(bus: &Arc<EventBus>, provider: Arc<ScriptedProvider>, config: ResolutionConfig) -> ResolutionStage {
        limited_stage(bus, provider, config, RateLimiter::unlimited())
    }

    fn limited_stage(
        bus: &Arc<EventBus>,
        provider: Arc<ScriptedProvider>,
        config: ResolutionConfig,
        limiter: RateLimiter,
    ) -> ResolutionStage {
        let llm = LlmClient::new(provider)
            .with_limiter(Arc::new(limiter))
            .with_retry(RetryPolicy::none());
        ResolutionStage::new(StageContext::new(Arc::clone(bus)), llm, config)
    }

    async fn drain(bus: &EventBus) {
        assert!(bus.wait_until_idle(Duration::from_secs(2)).await);
    }

    #[tokio::test]
    async fn test_publishes_batches() {
        let bus = Arc::new(EventBus::new());
        let provider = Arc::new(ScriptedProvider::new().reply(REPLY));
        let config = ResolutionConfig {
            batch_size: 2,
            ..ResolutionConfig::default()
        };
        let stage = stage(&bus, provider, config);
        stage.start().await.unwrap();
        let mut out = bus.stream(Topic::RelationshipFound);

        bus.publish(Event::data_ingested("d1", "Alice works for ACME in Berlin.")).await;
        drain(&bus).await;
        bus.publish(Event::entity_extracted("d1", entities())).await;
        drain(&bus).await;

        let mut batches = Vec::new();
        while let Some(event) = out.try_recv() {
            if let Event::RelationshipFound(found) = event.as_ref() {
                batches.push(found.clone());
            }
        }
        batches.sort_by_key(|b| b.batch_index);

        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].relationships.len(), 2);
        assert_eq!(batches[0].batch_index, Some(0));
        assert!(!batches[0].is_complete);
        assert_eq!(batches[1].relationships.len(), 1);
        assert!(batches[1].is_complete);
        assert_eq!(
            batches[0].relationships[0].source_type.as_deref(),
            Some("PERSON")
        );
    }

    #[tokio::test]
    async fn test_single_entity_skipped() {
        let bus = Arc::new(EventBus::new());
        let provider = Arc::new(ScriptedProvider::new().reply(REPLY));
        let stage = stage(&bus, Arc::clone(&provider), ResolutionConfig::default());
        stage.start().await.unwrap();

        bus.publish(Event::data_ingested("d1", "Alice")).await;
        bus.publish(Event::entity_extracted("d1", vec![Entity::new("PERSON", "Alice")]))
            .await;
        drain(&bus).await;
        assert_eq!(provider.calls(), 0);
        assert_eq!(stage.cached_chunks(), 0);
    }

    #[tokio::test]
    async fn test_all_chunks_published_before_extraction_are_resolved() {
        let bus = Arc::new(EventBus::new());
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_fallback(REPLY)
                .with_latency(Duration::from_millis(1)),
        );
        let stage = limited_stage(
            &bus,
            Arc::clone(&provider),
            ResolutionConfig::default(),
            RateLimiter::new(1, Duration::ZERO),
        );
        stage.start().await.unwrap();
        let mut out = bus.stream(Topic::RelationshipFound);
        let mut dlq = bus.stream(Topic::DeadLetter);

        // Ingestion publishes every chunk up front; extraction trails behind.
        let chunks = 300;
        for i in 0..chunks {
            bus.publish(Event::data_ingested(format!("big_chunk_{i}"), "Alice works for ACME in Berlin."))
                .await;
        }
        drain(&bus).await;
        assert_eq!(stage.cached_chunks(), chunks);

        for i in 0..chunks {
            bus.publish(Event::entity_extracted(format!("big_chunk_{i}"), entities()))
                .await;
        }
        assert!(bus.wait_until_idle(Duration::from_secs(30)).await);

        assert!(dlq.try_recv().is_none());
        let mut resolved = 0;
        while let Some(event) = out.try_recv() {
            if matches!(event.as_ref(), Event::RelationshipFound(f) if f.is_complete) {
                resolved += 1;
            }
        }
        assert_eq!(resolved, chunks);
        assert_eq!(provider.calls(), chunks);
        assert_eq!(stage.cached_chunks(), 0);
    }

    #[tokio::test]
    async fn test_failed_extraction_releases_content() {
        let bus = Arc::new(EventBus::new());
        let provider = Arc::new(ScriptedProvider::new().reply(REPLY));
        let stage = stage(&bus, provider, ResolutionConfig::default());
        stage.start().await.unwrap();

        bus.publish(Event::data_ingested("d1", "Alice works for ACME.")).await;
        bus.publish(Event::data_ingested("d2", "Bob works for Initech.")).await;
        drain(&bus).await;
        assert_eq!(stage.cached_chunks(), 2);

        bus.publish(Event::stage_failed(StageId::Extraction, Some("d1"), "llm unavailable"))
            .await;
        bus.publish(Event::stage_failed(StageId::Narrative, Some("d2"), "blank narrative"))
            .await;
        drain(&bus).await;
        assert_eq!(stage.cached_chunks(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_content_reported() {
        let bus = Arc::new(EventBus::new());
        let provider = Arc::new(ScriptedProvider::new().reply(REPLY));
        let config = ResolutionConfig {
            content_wait: Duration::from_millis(100),
            ..ResolutionConfig::default()
        };
        let stage = stage(&bus, Arc::clone(&provider), config);
        stage.start().await.unwrap();
        let mut dlq = bus.stream(Topic::DeadLetter);

        bus.publish(Event::entity_extracted("ghost", entities())).await;
        drain(&bus).await;

        assert_eq!(provider.calls(), 0);
        let Some(event) = dlq.try_recv() else {
            panic!("expected a dead-letter event");
        };
        let Event::StageFailed(failure) = event.as_ref() else {
            panic!("unexpected event");
        };
        assert_eq!(failure.stage, StageId::Resolution);
        assert_eq!(failure.reason, "chunk content unavailable");
    }

    #[tokio::test]
    async fn test_invalid_output_withheld() {
        let bus = Arc::new(EventBus::new());
        let provider = Arc::new(ScriptedProvider::new().reply("no relationships, sorry"));
        let stage = stage(&bus, provider, ResolutionConfig::default());
        stage.start().await.unwrap();
        let mut out = bus.stream(Topic::RelationshipFound);
        let mut dlq = bus.stream(Topic::DeadLetter);

        bus.publish(Event::data_ingested("d1", "text")).await;
        drain(&bus).await;
        bus.publish(Event::entity_extracted("d1", entities())).await;
        drain(&bus).await;

        assert!(out.try_recv().is_none());
        assert!(dlq.try_recv().is_some());
    }
}

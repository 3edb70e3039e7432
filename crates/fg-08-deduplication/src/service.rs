//! Deduplication stage wiring.

use crate::domain::{confirmation_prompt, is_confirmed, MergeLedger};
use async_trait::async_trait;
use fg_07_vector_index::{Collection, SearchHit, SearchQuery, VectorError, VectorIndex, VectorPayload};
use forge_llm::{CompletionRequest, LlmClient, LlmError};
use shared_bus::events::{EntityEmbedded, EntityMerged};
use shared_bus::{DynHandler, Event, EventHandler, StageContext, Topic};
use shared_types::{LogLevel, Stage, StageError, StageId, StageInfo, StageStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq)]
pub struct DeduplicationConfig {
    /// Minimum cosine similarity of a duplicate candidate.
    pub threshold: f32,
    /// Candidates examined per embedded entity.
    pub search_limit: usize,
    /// Publish `entity.merged` for confirmed pairs. When off, candidates
    /// are only reported in the activity log.
    pub auto_merge: bool,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for DeduplicationConfig {
    fn default() -> Self {
        Self {
            threshold: 0.85,
            search_limit: 5,
            auto_merge: true,
            max_tokens: 10,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Error)]
enum DedupError {
    #[error("run cancelled")]
    Cancelled,
    #[error("duplicate confirmation failed: {0}")]
    Llm(LlmError),
    #[error(transparent)]
    Index(#[from] VectorError),
}

impl From<LlmError> for DedupError {
    fn from(e: LlmError) -> Self {
        match e {
            LlmError::Cancelled => Self::Cancelled,
            other => Self::Llm(other),
        }
    }
}

struct DedupHandler {
    ctx: StageContext,
    index: Arc<dyn VectorIndex>,
    llm: Option<LlmClient>,
    ledger: Arc<MergeLedger>,
    config: DeduplicationConfig,
}

impl DedupHandler {
    async fn deduplicate(&self, embedded: &EntityEmbedded) -> Result<(), DedupError> {
        // Index here as well so a pair is found no matter which side the
        // vector-index stage stored first.
        self.index
            .upsert(
                Collection::Entities,
                &embedded.entity_id,
                embedded.vector.clone(),
                VectorPayload {
                    doc_id: embedded.doc_id.clone(),
                    text: embedded.text.clone(),
                    entity_type: Some(embedded.entity_type.clone()),
                },
            )
            .await?;

        let query = SearchQuery::new(embedded.vector.clone())
            .with_limit(self.config.search_limit)
            .with_threshold(self.config.threshold)
            .of_type(embedded.entity_type.clone())
            .excluding(embedded.entity_id.clone());
        let hits = self.index.search(Collection::Entities, &query).await?;

        for hit in hits {
            if !self.ledger.claim(&embedded.entity_id, &hit.id) {
                continue;
            }
            let confirmed = match self.confirm(embedded, &hit).await {
                Ok(confirmed) => confirmed,
                Err(e) => {
                    self.ledger.release(&embedded.entity_id, &hit.id);
                    return Err(e);
                }
            };
            if !confirmed {
                debug!(a = %embedded.text, b = %hit.payload.text, "Duplicate rejected");
                continue;
            }
            if self.merge(embedded, &hit).await {
                break;
            }
        }
        Ok(())
    }

    async fn confirm(&self, embedded: &EntityEmbedded, hit: &SearchHit) -> Result<bool, DedupError> {
        let Some(llm) = &self.llm else {
            return Ok(true);
        };
        let request = CompletionRequest::new(confirmation_prompt(
            &embedded.entity_type,
            &embedded.text,
            &hit.payload.text,
        ))
        .with_max_tokens(self.config.max_tokens)
        .with_temperature(self.config.temperature);
        let reply = llm.complete(&request, self.ctx.cancel_token()).await?;
        Ok(is_confirmed(&reply))
    }

    /// Returns `true` when the embedded entity itself was merged away.
    async fn merge(&self, embedded: &EntityEmbedded, hit: &SearchHit) -> bool {
        if !self.config.auto_merge {
            self.ctx
                .log(
                    LogLevel::Info,
                    format!(
                        "Possible duplicate: '{}' ~ '{}' ({:.2})",
                        embedded.text, hit.payload.text, hit.score
                    ),
                )
                .await;
            return false;
        }

        let (kept_id, kept_text, merged_id, merged_text) = if embedded.entity_id <= hit.id {
            (&embedded.entity_id, &embedded.text, &hit.id, &hit.payload.text)
        } else {
            (&hit.id, &hit.payload.text, &embedded.entity_id, &embedded.text)
        };
        self.ledger.record_merge(merged_id);

        info!(kept = %kept_text, merged = %merged_text, similarity = hit.score, "Merging duplicate entities");
        self.ctx
            .publish(Event::EntityMerged(EntityMerged {
                kept_id: kept_id.clone(),
                merged_id: merged_id.clone(),
                kept_text: kept_text.clone(),
                merged_text: merged_text.clone(),
                similarity: hit.score,
            }))
            .await;
        merged_id == &embedded.entity_id
    }
}

#[async_trait]
impl EventHandler for DedupHandler {
    fn name(&self) -> &str {
        "fg-08-deduplication.entity_embedded"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        let Event::EntityEmbedded(embedded) = event.as_ref() else {
            return Ok(());
        };
        if self.ctx.is_cancelled() || self.ledger.is_merged_away(&embedded.entity_id) {
            return Ok(());
        }

        match self.deduplicate(embedded).await {
            Ok(()) | Err(DedupError::Cancelled) => {}
            Err(e) => {
                self.ctx
                    .report_failure(StageId::Deduplication, Some(&embedded.doc_id), e.to_string())
                    .await;
            }
        }
        Ok(())
    }
}

/// Stage 8: vector-similarity entity deduplication.
pub struct DeduplicationStage {
    ctx: StageContext,
    ledger: Arc<MergeLedger>,
    handler: DynHandler,
    uses_llm: bool,
    running: AtomicBool,
}

impl DeduplicationStage {
    /// `llm` enables YES/NO confirmation of each candidate pair.
    pub fn new(
        ctx: StageContext,
        index: Arc<dyn VectorIndex>,
        llm: Option<LlmClient>,
        config: DeduplicationConfig,
    ) -> Self {
        let ledger = Arc::new(MergeLedger::new());
        let uses_llm = llm.is_some();
        let handler: DynHandler = Arc::new(DedupHandler {
            ctx: ctx.clone(),
            index,
            llm,
            ledger: Arc::clone(&ledger),
            config,
        });
        Self {
            ctx,
            ledger,
            handler,
            uses_llm,
            running: AtomicBool::new(false),
        }
    }

    #[must_use]
    pub fn ledger(&self) -> &MergeLedger {
        &self.ledger
    }
}

#[async_trait]
impl Stage for DeduplicationStage {
    fn id(&self) -> StageId {
        StageId::Deduplication
    }

    fn name(&self) -> &'static str {
        "Deduplication"
    }

    fn info(&self) -> StageInfo {
        let info = StageInfo::new(self.id(), self.name())
            .described_as("Merges entities whose embeddings are near-identical")
            .subscribes_to(vec![Topic::EntityEmbedded.as_str()])
            .publishes_events(vec![Topic::EntityMerged.as_str()]);
        if self.uses_llm {
            info.uses_llm()
        } else {
            info
        }
    }

    async fn start(&self) -> Result<(), StageError> {
        self.ctx
            .bus()
            .subscribe(Topic::EntityEmbedded, Arc::clone(&self.handler));
        self.running.store(true, Ordering::SeqCst);
        info!(stage = %self.id(), confirm = self.uses_llm, "Stage started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), StageError> {
        self.ctx.bus().unsubscribe(Topic::EntityEmbedded, &self.handler);
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
    use fg_07_vector_index::InMemoryVectorIndex;
    use forge_llm::{RateLimiter, RetryPolicy, ScriptedProvider};
    use shared_bus::{EventBus, EventPublisher};
    use std::time::Duration;

    fn client(provider: ScriptedProvider) -> LlmClient {
        LlmClient::new(Arc::new(provider))
            .with_limiter(Arc::new(RateLimiter::unlimited()))
            .with_retry(RetryPolicy::none())
    }

    fn embedded(id: &str, entity_type: &str, text: &str, vector: Vec<f32>) -> Event {
        Event::EntityEmbedded(EntityEmbedded {
            entity_id: id.into(),
            doc_id: "d1".into(),
            entity_type: entity_type.into(),
            text: text.into(),
            vector,
        })
    }

    async fn started(
        bus: &Arc<EventBus>,
        llm: Option<LlmClient>,
        config: DeduplicationConfig,
    ) -> DeduplicationStage {
        let stage = DeduplicationStage::new(
            StageContext::new(Arc::clone(bus)),
            Arc::new(InMemoryVectorIndex::new(2)),
            llm,
            config,
        );
        stage.start().await.unwrap();
        stage
    }

    fn merges(stream: &mut shared_bus::EventStream) -> Vec<EntityMerged> {
        let mut out = Vec::new();
        while let Some(event) = stream.try_recv() {
            if let Event::EntityMerged(m) = event.as_ref() {
                out.push(m.clone());
            }
        }
        out
    }

    #[tokio::test]
    async fn test_merges_once_keeping_smaller_id() {
        let bus = Arc::new(EventBus::new());
        let _stage = started(&bus, None, DeduplicationConfig::default()).await;
        let mut out = bus.stream(Topic::EntityMerged);

        bus.publish(embedded("bbb", "PERSON", "Alice Smith", vec![1.0, 0.05])).await;
        bus.publish(embedded("aaa", "PERSON", "Alice", vec![1.0, 0.0])).await;
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);
        bus.publish(embedded("bbb", "PERSON", "Alice Smith", vec![1.0, 0.05])).await;
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);

        let merged = merges(&mut out);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].kept_id, "aaa");
        assert_eq!(merged[0].kept_text, "Alice");
        assert_eq!(merged[0].merged_id, "bbb");
        assert!(merged[0].similarity >= 0.85);
    }

    #[tokio::test]
    async fn test_ignores_other_types_and_far_vectors() {
        let bus = Arc::new(EventBus::new());
        let _stage = started(&bus, None, DeduplicationConfig::default()).await;
        let mut out = bus.stream(Topic::EntityMerged);

        bus.publish(embedded("a", "PERSON", "Jordan", vec![1.0, 0.0])).await;
        bus.publish(embedded("b", "LOCATION", "Jordan", vec![1.0, 0.0])).await;
        bus.publish(embedded("c", "PERSON", "Mira", vec![0.0, 1.0])).await;
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);

        assert!(merges(&mut out).is_empty());
    }

    #[tokio::test]
    async fn test_llm_rejection_blocks_merge() {
        let bus = Arc::new(EventBus::new());
        let provider = ScriptedProvider::new().with_fallback("NO");
        let _stage = started(&bus, Some(client(provider)), DeduplicationConfig::default()).await;
        let mut out = bus.stream(Topic::EntityMerged);

        bus.publish(embedded("a", "PERSON", "Alice", vec![1.0, 0.0])).await;
        bus.publish(embedded("b", "PERSON", "Alicia", vec![1.0, 0.01])).await;
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);

        assert!(merges(&mut out).is_empty());
    }

    #[tokio::test]
    async fn test_llm_confirmation_merges() {
        let bus = Arc::new(EventBus::new());
        let provider = ScriptedProvider::new().with_fallback("YES");
        let _stage = started(&bus, Some(client(provider)), DeduplicationConfig::default()).await;
        let mut out = bus.stream(Topic::EntityMerged);

        bus.publish(embedded("a", "PERSON", "Alice", vec![1.0, 0.0])).await;
        bus.publish(embedded("b", "PERSON", "Alice S.", vec![1.0, 0.01])).await;
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);

        assert_eq!(merges(&mut out).len(), 1);
    }

    #[tokio::test]
    async fn test_llm_failure_reported() {
        let bus = Arc::new(EventBus::new());
        let provider = ScriptedProvider::new()
            .fail(LlmError::Network("down".into()))
            .fail(LlmError::Network("down".into()));
        let _stage = started(&bus, Some(client(provider)), DeduplicationConfig::default()).await;
        let mut out = bus.stream(Topic::EntityMerged);
        let mut dlq = bus.stream(Topic::DeadLetter);

        bus.publish(embedded("a", "PERSON", "Alice", vec![1.0, 0.0])).await;
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);
        bus.publish(embedded("b", "PERSON", "Alice S.", vec![1.0, 0.01])).await;
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);

        assert!(merges(&mut out).is_empty());
        let failure = dlq.try_recv().unwrap();
        assert!(matches!(failure.as_ref(), Event::StageFailed(f) if f.stage == StageId::Deduplication));
    }

    #[tokio::test]
    async fn test_auto_merge_off_only_logs() {
        let bus = Arc::new(EventBus::new());
        let config = DeduplicationConfig {
            auto_merge: false,
            ..DeduplicationConfig::default()
        };
        let _stage = started(&bus, None, config).await;
        let mut out = bus.stream(Topic::EntityMerged);
        let mut logs = bus.stream(Topic::LogsEvent);

        bus.publish(embedded("a", "PERSON", "Alice", vec![1.0, 0.0])).await;
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);
        bus.publish(embedded("b", "PERSON", "Alice S.", vec![1.0, 0.01])).await;
        assert!(bus.wait_until_idle(Duration::from_secs(1)).await);

        assert!(merges(&mut out).is_empty());
        let log = logs.try_recv().unwrap();
        assert!(matches!(log.as_ref(), Event::Log(l) if l.message.contains("Possible duplicate")));
    }
}

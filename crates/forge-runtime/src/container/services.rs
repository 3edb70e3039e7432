//! # Stage Wiring
//!
//! Builds the shared infrastructure and the stages on top of it.
//!
//! ```text
//! Always:        Metadata(1), Graph(4), Persistence(5), GraphInsights(9),
//!                EntityCards(12)
//! With an LLM:   Extraction(2), Resolution(3), Profiler(10), Narrative(11)
//! Embeddings on: Embedding(6), VectorIndex(7), Deduplication(8)
//! ```
//!
//! Deduplication confirms candidates with the LLM when one is configured
//! and merges on similarity alone otherwise.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use fg_01_metadata::MetadataStage;
use fg_02_extraction::{ExtractionConfig, ExtractionStage};
use fg_03_resolution::{ResolutionConfig, ResolutionStage};
use fg_04_graph::GraphStage;
use fg_05_persistence::{InMemoryKnowledgeStore, KnowledgeStore, PersistenceStage};
use fg_06_embedding::{EmbeddingStage, HashingEmbedder};
use fg_07_vector_index::{InMemoryVectorIndex, VectorIndex, VectorIndexStage};
use fg_08_deduplication::{DeduplicationConfig, DeduplicationStage};
use fg_09_graph_insights::{GraphInsightsStage, InsightsConfig};
use fg_10_profiler::{ProfilerConfig, ProfilerStage};
use fg_11_narrative::{NarrativeConfig, NarrativeStage};
use fg_12_entity_cards::EntityCardStage;
use forge_llm::{
    LlmClient, LlmError, OpenAiCompatProvider, ProviderConfig, RateLimiter, RetryPolicy,
};
use shared_bus::{BusError, EventBus, StageContext};
use shared_types::{StageId, StageRegistry};

use crate::container::config::{ForgeConfig, LlmSettings};

/// First backoff step of LLM retries.
const RETRY_INITIAL_DELAY: Duration = Duration::from_secs(3);

/// Central container holding all stage instances.
pub struct ServiceContainer {
    /// Configuration the container was built from.
    pub config: ForgeConfig,
    /// The bus every stage publishes and subscribes on.
    pub bus: Arc<EventBus>,
    /// Knowledge store written by the persistence stage.
    pub store: Arc<dyn KnowledgeStore>,
    /// Vector index shared by indexing and deduplication.
    pub index: Option<Arc<dyn VectorIndex>>,
    llm: Option<LlmClient>,
    cancel: CancellationToken,
    registry: StageRegistry,
}

impl ServiceContainer {
    /// Build the container on the current Tokio runtime.
    ///
    /// `llm` is `None` when no provider is configured; the LLM stages are
    /// then left out.
    pub fn new(config: ForgeConfig, llm: Option<LlmClient>) -> Result<Self, BusError> {
        let bus = Arc::new(EventBus::try_new()?);
        let cancel = CancellationToken::new();
        let store: Arc<dyn KnowledgeStore> = Arc::new(InMemoryKnowledgeStore::new());
        let index = config.embedding.enabled.then(|| {
            Arc::new(InMemoryVectorIndex::new(config.embedding.dimension)) as Arc<dyn VectorIndex>
        });

        let mut container = Self {
            config,
            bus,
            store,
            index,
            llm,
            cancel,
            registry: StageRegistry::new(),
        };
        container.register_stages();
        Ok(container)
    }

    fn context(&self) -> StageContext {
        StageContext::with_cancellation(Arc::clone(&self.bus), self.cancel.clone())
    }

    fn register_stages(&mut self) {
        let config = self.config.clone();
        let mut stages: Vec<shared_types::DynStage> = Vec::new();

        stages.push(Box::new(MetadataStage::new(self.context())));
        stages.push(Box::new(GraphStage::new(self.context())));
        stages.push(Box::new(PersistenceStage::new(
            self.context(),
            Arc::clone(&self.store),
        )));
        stages.push(Box::new(GraphInsightsStage::new(
            self.context(),
            InsightsConfig {
                top_n: config.processing.insights_top_n,
                ..InsightsConfig::default()
            },
        )));
        stages.push(Box::new(EntityCardStage::new(
            self.context(),
            Arc::clone(&self.store),
        )));

        if let Some(llm) = self.llm.clone() {
            stages.push(Box::new(ExtractionStage::new(
                self.context(),
                llm.clone(),
                ExtractionConfig {
                    max_tokens: config.llm.extraction_max_tokens,
                    temperature: config.llm.extraction_temperature,
                },
            )));
            stages.push(Box::new(ResolutionStage::new(
                self.context(),
                llm.clone(),
                ResolutionConfig {
                    max_tokens: config.llm.extraction_max_tokens,
                    temperature: config.llm.extraction_temperature,
                    batch_size: config.processing.relationship_batch_size,
                    ..ResolutionConfig::default()
                },
            )));
            stages.push(Box::new(ProfilerStage::new(
                self.context(),
                llm.clone(),
                ProfilerConfig {
                    max_tokens: config.llm.profiling_max_tokens,
                    temperature: config.llm.profiling_temperature,
                    max_per_event: config.processing.profiles_per_update,
                    delay: config.processing.profiler_delay(),
                },
            )));
            stages.push(Box::new(NarrativeStage::new(
                self.context(),
                llm,
                NarrativeConfig {
                    max_tokens: config.llm.narrative_max_tokens,
                    temperature: config.llm.narrative_temperature,
                },
            )));
        } else {
            warn!("No LLM provider configured; LLM-backed stages disabled");
        }

        if let Some(index) = self.index.clone() {
            let embedder = Arc::new(HashingEmbedder::new(config.embedding.dimension));
            stages.push(Box::new(EmbeddingStage::new(self.context(), embedder)));
            stages.push(Box::new(VectorIndexStage::new(
                self.context(),
                Arc::clone(&index),
            )));
            stages.push(Box::new(DeduplicationStage::new(
                self.context(),
                index,
                self.llm.clone(),
                DeduplicationConfig {
                    threshold: config.vector.deduplication_threshold,
                    search_limit: config.vector.deduplication_search_limit,
                    auto_merge: config.processing.auto_deduplication,
                    max_tokens: config.llm.deduplication_max_tokens,
                    temperature: config.llm.deduplication_temperature,
                },
            )));
        } else {
            info!("Embeddings disabled; vector indexing and deduplication skipped");
        }

        for stage in stages {
            self.registry.register(stage);
        }
    }

    pub fn registry(&self) -> &StageRegistry {
        &self.registry
    }

    /// Token cancelled when the run is aborted.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn has_llm(&self) -> bool {
        self.llm.is_some()
    }

    /// Stages registered, in start order.
    pub fn stage_ids(&self) -> Vec<StageId> {
        self.registry.registered_ids()
    }
}

/// Build an [`LlmClient`] from the process environment and `settings`.
///
/// Returns `None`, with a warning, when no provider is configured.
pub fn llm_client_from_env(settings: &LlmSettings) -> Option<LlmClient> {
    let provider = ProviderConfig::from_env()
        .map(|config| config.with_timeout(settings.request_timeout()))
        .and_then(OpenAiCompatProvider::new);

    match provider {
        Ok(provider) => {
            info!(
                provider = provider.config().kind.as_str(),
                model = %provider.config().model,
                "LLM provider configured"
            );
            Some(llm_client(Arc::new(provider), settings))
        }
        Err(LlmError::NotConfigured(var)) => {
            warn!(missing = %var, "LLM provider not configured");
            None
        }
        Err(e) => {
            warn!(error = %e, "LLM provider unavailable");
            None
        }
    }
}

/// Wrap `provider` with the configured rate limit, retries and timeout.
pub fn llm_client(provider: Arc<dyn forge_llm::LlmProvider>, settings: &LlmSettings) -> LlmClient {
    LlmClient::new(provider)
        .with_limiter(Arc::new(RateLimiter::new(
            settings.rate_limit_max_concurrent,
            settings.min_delay(),
        )))
        .with_retry(RetryPolicy::new(
            settings.rate_limit_max_retries,
            RETRY_INITIAL_DELAY,
        ))
        .with_request_timeout(settings.request_timeout())
}

//! # Full Pipeline Choreography
//!
//! Drives the real stages through a [`forge_runtime::PipelineRuntime`]:
//!
//! ```text
//! data.ingested ─→ Metadata ─→ document.metadata ──────────────┐
//!       │                                                       │
//!       └─→ Extraction ─→ entity.extracted ─→ Resolution        │
//!                               │                 │             ↓
//!                          Embedding        relationship.found ─→ Persistence
//!                               │                 │             ↑
//!                     VectorIndex/Dedup        Graph ─→ graph.updated
//!                                                       │
//!                               Insights, Profiler, Narrative ──┘
//! ```
//!
//! Every LLM call is answered by [`RoutedProvider`](super::fixtures::RoutedProvider).

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use fg_05_persistence::StoreCounts;
    use shared_bus::{Event, EventPublisher, Topic};
    use shared_types::{derive_entity_id, StageId};

    use crate::integration::fixtures::{
        fast_client, serial_client, started_runtime, test_config, PromptKind, RoutedProvider,
        REPORT,
    };

    const DRAIN: Duration = Duration::from_secs(10);

    #[tokio::test]
    async fn test_report_flows_through_every_stage() {
        let provider = Arc::new(RoutedProvider::new());
        let runtime = started_runtime(test_config(), Some(fast_client(provider.clone()))).await;
        let mut graph_updates = runtime.bus().stream(Topic::GraphUpdated);
        let mut narratives = runtime.bus().stream(Topic::NarrativeGenerated);
        let mut dead = runtime.bus().stream(Topic::DeadLetter);

        runtime.ingest_text("sr_chunk_0", REPORT).await;
        assert!(runtime.wait_until_idle(DRAIN).await);

        let update = graph_updates.try_recv().expect("graph.updated published");
        let Event::GraphUpdated(update) = update.as_ref() else {
            panic!("unexpected event");
        };
        assert_eq!(update.graph_stats.node_count, 3);
        assert_eq!(update.graph_stats.edge_count, 2);
        assert!(narratives.try_recv().is_some());
        assert!(dead.try_recv().is_none());

        let counts = runtime.container().store.counts().unwrap();
        assert_eq!(
            counts,
            StoreCounts {
                entities: 3,
                relationships: 2,
                documents: 1,
                profiles: 3,
                narratives: 1,
                merges: 0,
            }
        );

        let store = &runtime.container().store;
        let alice = store
            .entity(&derive_entity_id("PERSON", "Alice Smith"))
            .unwrap()
            .expect("Alice persisted");
        assert_eq!(alice.doc_ids.iter().collect::<Vec<_>>(), vec!["sr_chunk_0"]);
        let doc = store.document("sr_chunk_0").unwrap().expect("metadata persisted");
        assert_eq!(doc.metadata.report_id.as_deref(), Some("SR-2026-0113"));

        assert_eq!(provider.calls_of(PromptKind::Extraction), 1);
        assert_eq!(provider.calls_of(PromptKind::Resolution), 1);
        assert_eq!(provider.calls_of(PromptKind::Profile), 3);
        assert_eq!(provider.calls_of(PromptKind::Narrative), 1);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_directory_ingestion_reports_store_totals() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("sitrep.txt"), REPORT).unwrap();
        std::fs::write(dir.path().join("ignored.csv"), "a,b,c").unwrap();

        let provider = Arc::new(RoutedProvider::new());
        let runtime = started_runtime(test_config(), Some(fast_client(provider))).await;
        let mut ingested = runtime.bus().stream(Topic::DataIngested);

        let report = runtime.ingest_directory(dir.path()).await.unwrap();
        assert!(report.settled);
        assert_eq!(report.files_found, 1);
        assert_eq!(report.chunks_published, 1);
        assert_eq!(report.counts.entities, 3);
        assert_eq!(report.counts.relationships, 2);
        assert_eq!(ingested.try_recv().unwrap().doc_id(), Some("sitrep_chunk_0"));
    }

    #[tokio::test]
    async fn test_large_directory_resolves_every_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let words: Vec<String> = (0..1200).map(|i| format!("word{i}")).collect();
        std::fs::write(dir.path().join("long.txt"), words.join(" ")).unwrap();

        let mut config = test_config();
        config.processing.chunk_size = 4;
        config.processing.chunk_overlap = 0;
        config.runtime.idle_timeout_secs = 120;
        let provider = Arc::new(RoutedProvider::new().with_latency(Duration::from_millis(1)));
        let runtime = started_runtime(config, Some(serial_client(provider.clone()))).await;
        let mut dead = runtime.bus().stream(Topic::DeadLetter);

        let report = runtime.ingest_directory(dir.path()).await.unwrap();
        assert!(report.settled);
        assert_eq!(report.chunks_published, 300);

        assert!(dead.try_recv().is_none());
        assert_eq!(provider.calls_of(PromptKind::Extraction), 300);
        assert_eq!(provider.calls_of(PromptKind::Resolution), 300);
        assert_eq!(report.counts.relationships, 2);
        assert_eq!(report.counts.narratives, 300);
    }

    #[tokio::test]
    async fn test_multi_batch_document_gets_one_narrative() {
        let mut config = test_config();
        config.processing.relationship_batch_size = 1;
        let provider = Arc::new(RoutedProvider::new());
        let runtime = started_runtime(config, Some(fast_client(provider.clone()))).await;
        let mut batches = runtime.bus().stream(Topic::RelationshipFound);
        let mut narratives = runtime.bus().stream(Topic::NarrativeGenerated);

        runtime.ingest_text("sr_chunk_0", REPORT).await;
        assert!(runtime.wait_until_idle(DRAIN).await);

        let mut batch_count = 0;
        while batches.try_recv().is_some() {
            batch_count += 1;
        }
        assert_eq!(batch_count, 2);

        assert!(narratives.try_recv().is_some());
        assert!(narratives.try_recv().is_none());
        let prompts = provider.prompts_of(PromptKind::Narrative);
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Alice Smith WORKS_FOR ACME Corp"));
        assert!(prompts[0].contains("ACME Corp LOCATED_IN Berlin"));
        assert_eq!(runtime.container().store.counts().unwrap().narratives, 1);
    }

    #[tokio::test]
    async fn test_entity_cards_published_for_extracted_entities() {
        let provider = Arc::new(RoutedProvider::new());
        let runtime = started_runtime(test_config(), Some(fast_client(provider))).await;
        let mut cards = runtime.bus().stream(Topic::EntityCardReady);

        runtime.ingest_text("sr_chunk_0", REPORT).await;
        assert!(runtime.wait_until_idle(DRAIN).await);

        let mut labels = Vec::new();
        while let Some(event) = cards.try_recv() {
            if let Event::EntityCardReady(card) = event.as_ref() {
                labels.push(card.label.clone());
            }
        }
        labels.sort();
        assert_eq!(labels, vec!["ACME Corp", "Alice Smith", "Berlin"]);
    }

    #[tokio::test]
    async fn test_extraction_failure_withholds_downstream_and_reports() {
        let provider = Arc::new(RoutedProvider::failing(vec![PromptKind::Extraction]));
        let runtime = started_runtime(test_config(), Some(fast_client(provider.clone()))).await;
        let mut extracted = runtime.bus().stream(Topic::EntityExtracted);
        let mut dead = runtime.bus().stream(Topic::DeadLetter);

        runtime.ingest_text("sr_chunk_0", REPORT).await;
        assert!(runtime.wait_until_idle(DRAIN).await);

        assert!(extracted.try_recv().is_none());
        let failure = dead.try_recv().expect("failure reported");
        let Event::StageFailed(failure) = failure.as_ref() else {
            panic!("unexpected event");
        };
        assert_eq!(failure.stage, StageId::Extraction);
        assert_eq!(failure.doc_id.as_deref(), Some("sr_chunk_0"));

        let counts = runtime.container().store.counts().unwrap();
        assert_eq!(counts.entities, 0);
        assert_eq!(counts.documents, 1);
        assert_eq!(provider.calls_of(PromptKind::Resolution), 0);
    }

    #[tokio::test]
    async fn test_pipeline_without_llm_settles() {
        let runtime = started_runtime(test_config(), None).await;
        let mut extracted = runtime.bus().stream(Topic::EntityExtracted);

        runtime.ingest_text("sr_chunk_0", REPORT).await;
        assert!(runtime.wait_until_idle(DRAIN).await);
        assert_eq!(runtime.bus().pending_count(), 0);
        assert!(extracted.try_recv().is_none());

        let counts = runtime.container().store.counts().unwrap();
        assert_eq!(counts.documents, 1);
        assert_eq!(counts.entities, 0);
    }

    #[tokio::test]
    async fn test_replaying_a_document_is_idempotent() {
        let provider = Arc::new(RoutedProvider::new());
        let runtime = started_runtime(test_config(), Some(fast_client(provider))).await;

        runtime.ingest_text("sr_chunk_0", REPORT).await;
        assert!(runtime.wait_until_idle(DRAIN).await);
        let first = runtime.container().store.counts().unwrap();

        runtime.ingest_text("sr_chunk_0", REPORT).await;
        assert!(runtime.wait_until_idle(DRAIN).await);
        let second = runtime.container().store.counts().unwrap();

        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_duplicate_mention_merged_across_documents() {
        let mut config = test_config();
        config.vector.deduplication_threshold = 0.5;
        let runtime = started_runtime(config, None).await;

        // With no LLM, entities arrive straight from the bus.
        let bus = runtime.bus();
        bus.publish(Event::entity_extracted(
            "a",
            vec![shared_types::Entity::new("ORGANIZATION", "ACME Corporation Berlin")],
        ))
        .await;
        assert!(runtime.wait_until_idle(DRAIN).await);
        bus.publish(Event::entity_extracted(
            "b",
            vec![shared_types::Entity::new("ORGANIZATION", "ACME Corporation Berlin office")],
        ))
        .await;
        assert!(runtime.wait_until_idle(DRAIN).await);

        let counts = runtime.container().store.counts().unwrap();
        assert_eq!(counts.merges, 1);
        assert_eq!(counts.entities, 1);
    }

    #[tokio::test]
    async fn test_shutdown_detaches_stages() {
        let runtime = started_runtime(test_config(), None).await;
        runtime.shutdown().await;

        runtime.ingest_text("sr_chunk_0", REPORT).await;
        assert!(runtime.wait_until_idle(DRAIN).await);
        assert_eq!(runtime.container().store.counts().unwrap().documents, 0);
    }
}

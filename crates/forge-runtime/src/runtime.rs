//! # Pipeline Runtime
//!
//! Drives one ingestion run on top of a [`ServiceContainer`].
//!
//! ## Run Sequence
//!
//! 1. Start every registered stage (ascending `StageId`)
//! 2. Publish one `data.ingested` per chunk, with progress log lines
//! 3. Wait for the bus to drain (bounded by the idle timeout)
//! 4. Report totals from the knowledge store
//! 5. Stop stages in reverse order

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use shared_bus::events::LogEvent;
use shared_bus::{Event, EventBus, EventPublisher, Topic};
use shared_types::{StageError, StageId, StageStatus};
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::container::ServiceContainer;
use crate::ingest::{
    chunk_doc_id, chunk_words, find_documents, read_document, IngestError, IngestReport,
};

/// Stage label used on progress events published by ingestion.
const INGEST_STAGE: &str = "ingest";

pub struct PipelineRuntime {
    container: ServiceContainer,
}

impl PipelineRuntime {
    pub fn new(container: ServiceContainer) -> Self {
        Self { container }
    }

    pub fn container(&self) -> &ServiceContainer {
        &self.container
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.container.bus
    }

    /// Start every registered stage.
    pub async fn start(&self) -> Result<(), StageError> {
        info!(
            stages = self.container.stage_ids().len(),
            llm = self.container.has_llm(),
            "Starting Forge pipeline"
        );
        self.container.registry().start_all().await
    }

    /// Publish one chunk of text into the pipeline.
    pub async fn ingest_text(&self, doc_id: impl Into<String>, text: impl Into<String>) {
        self.bus().publish(Event::data_ingested(doc_id, text)).await;
    }

    /// Chunk and publish every supported document in `dir`, then wait for
    /// the pipeline to drain.
    pub async fn ingest_directory(&self, dir: &Path) -> Result<IngestReport, IngestError> {
        let files = find_documents(dir)?;
        let processing = &self.container.config.processing;
        let mut report = IngestReport {
            files_found: files.len(),
            ..IngestReport::default()
        };

        info!(dir = %dir.display(), files = files.len(), "Starting ingestion");
        self.bus()
            .publish(Event::processing_started(
                INGEST_STAGE,
                format!("Starting extraction of {} documents", files.len()),
                Some(files.len()),
            ))
            .await;

        for path in &files {
            if self.container.cancel_token().is_cancelled() {
                warn!("Ingestion cancelled");
                break;
            }
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            self.log(LogEvent::info(format!("Processing {name}")).about(Topic::DataIngested))
                .await;

            let content = match read_document(path) {
                Ok(content) => content,
                Err(e) => {
                    warn!(file = %name, error = %e, "Skipping unreadable document");
                    self.log(LogEvent::error(format!("Could not read {name}: {e}"))).await;
                    continue;
                }
            };
            let chunks = chunk_words(&content, processing.chunk_size, processing.chunk_overlap);
            if chunks.is_empty() {
                warn!(file = %name, "Document has no text");
                continue;
            }

            info!(file = %name, chunks = chunks.len(), "Publishing chunks");
            for (i, chunk) in chunks.into_iter().enumerate() {
                self.ingest_text(chunk_doc_id(path, i), chunk).await;
                report.chunks_published += 1;
            }
            report.files_processed += 1;
        }

        report.settled = self.wait_until_idle(self.container.config.runtime.idle_timeout()).await;
        if !report.settled {
            warn!(
                pending = self.bus().pending_count(),
                "Pipeline did not drain before the idle timeout"
            );
        }
        report.counts = self.container.store.counts()?;

        self.bus()
            .publish(Event::processing_ended(
                INGEST_STAGE,
                format!(
                    "Processed {} documents: {} entities, {} relationships",
                    report.files_processed, report.counts.entities, report.counts.relationships
                ),
                Some(report.files_found),
                Some(report.files_processed),
            ))
            .await;
        self.log(LogEvent::success(format!(
            "Extraction complete: {} chunks from {} documents",
            report.chunks_published, report.files_processed
        )))
        .await;

        info!(
            files = report.files_processed,
            chunks = report.chunks_published,
            entities = report.counts.entities,
            relationships = report.counts.relationships,
            settled = report.settled,
            "Ingestion finished"
        );
        Ok(report)
    }

    /// Wait until no handler is running or queued.
    pub async fn wait_until_idle(&self, timeout: Duration) -> bool {
        self.bus().wait_until_idle(timeout).await
    }

    /// Abort the run. Stages stop issuing LLM calls and ingestion stops
    /// publishing new chunks.
    pub fn cancel(&self) {
        info!("Cancelling pipeline run");
        self.container.cancel_token().cancel();
    }

    pub async fn health(&self) -> BTreeMap<StageId, StageStatus> {
        self.container.registry().health_check_all().await
    }

    /// Stop every stage. Handlers already running finish on their own.
    pub async fn shutdown(&self) {
        info!("Shutting down Forge pipeline");
        self.container.registry().stop_all().await;
        info!("Shutdown complete");
    }

    async fn log(&self, line: LogEvent) {
        self.bus().publish(Event::Log(line)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::container::ForgeConfig;

    async fn runtime_without_llm() -> PipelineRuntime {
        let mut config = ForgeConfig::default();
        config.runtime.idle_timeout_secs = 5;
        let runtime = PipelineRuntime::new(ServiceContainer::new(config, None).unwrap());
        runtime.start().await.unwrap();
        runtime
    }

    #[tokio::test]
    async fn test_ingest_directory_publishes_chunks() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("report.txt"),
            "CLASSIFICATION: SECRET\nREPORT ID: R-1\nAlpha team observed movement.",
        )
        .unwrap();
        std::fs::write(dir.path().join("notes.md"), "").unwrap();

        let runtime = runtime_without_llm().await;
        let mut ingested = runtime.bus().stream(Topic::DataIngested);

        let report = runtime.ingest_directory(dir.path()).await.unwrap();
        assert_eq!(report.files_found, 2);
        assert_eq!(report.files_processed, 1);
        assert_eq!(report.chunks_published, 1);
        assert!(report.settled);
        assert_eq!(report.counts.documents, 1);

        let event = ingested.try_recv().unwrap();
        assert_eq!(event.doc_id(), Some("report_chunk_0"));
        assert!(ingested.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_cancel_stops_publishing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "one two three").unwrap();

        let runtime = runtime_without_llm().await;
        let mut ingested = runtime.bus().stream(Topic::DataIngested);
        runtime.cancel();

        let report = runtime.ingest_directory(dir.path()).await.unwrap();
        assert_eq!(report.chunks_published, 0);
        assert!(ingested.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_shutdown_stops_stages() {
        let runtime = runtime_without_llm().await;
        runtime.shutdown().await;
        let health = runtime.health().await;
        assert!(health.values().all(|s| *s == StageStatus::Stopped));
    }

    #[tokio::test]
    async fn test_missing_directory() {
        let runtime = runtime_without_llm().await;
        let err = runtime
            .ingest_directory(Path::new("/definitely/not/here"))
            .await
            .unwrap_err();
        assert!(matches!(err, IngestError::MissingDirectory(_)));
    }
}

//! Graph stage wiring.

use crate::domain::{BatchTracker, KnowledgeGraph};
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_bus::{DynHandler, Event, EventHandler, StageContext, Topic};
use shared_types::{Stage, StageError, StageId, StageInfo, StageStatus};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

struct GraphHandler {
    ctx: StageContext,
    graph: Arc<Mutex<KnowledgeGraph>>,
    batches: Mutex<BatchTracker>,
}

#[async_trait]
impl EventHandler for GraphHandler {
    fn name(&self) -> &str {
        "fg-04-graph.relationship_found"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        let Event::RelationshipFound(found) = event.as_ref() else {
            return Ok(());
        };
        let (stats, is_complete) = {
            let mut graph = self.graph.lock();
            let touched = graph.apply(&found.doc_id, &found.relationships);
            let progress = self.batches.lock().record(
                &found.doc_id,
                &touched,
                found.batch_index,
                found.is_complete,
            );
            (graph.stats_for(&progress.nodes, &progress.edges), progress.is_complete())
        };
        if stats.nodes.is_empty() {
            debug!(doc_id = %found.doc_id, "Empty relationship batch");
            return Ok(());
        }

        info!(
            doc_id = %found.doc_id,
            batch = ?found.batch_index,
            nodes = stats.node_count,
            edges = stats.edge_count,
            is_complete,
            "Graph updated"
        );
        self.ctx
            .publish(Event::graph_progress(found.doc_id.clone(), stats, is_complete))
            .await;
        Ok(())
    }
}

/// Stage 4: knowledge graph maintenance.
pub struct GraphStage {
    ctx: StageContext,
    graph: Arc<Mutex<KnowledgeGraph>>,
    handler: DynHandler,
    running: AtomicBool,
}

impl GraphStage {
    pub fn new(ctx: StageContext) -> Self {
        let graph = Arc::new(Mutex::new(KnowledgeGraph::new()));
        let handler: DynHandler = Arc::new(GraphHandler {
            ctx: ctx.clone(),
            graph: Arc::clone(&graph),
            batches: Mutex::new(BatchTracker::new()),
        });
        Self {
            ctx,
            graph,
            handler,
            running: AtomicBool::new(false),
        }
    }

    /// Current `(nodes, edges)` totals.
    #[must_use]
    pub fn counts(&self) -> (usize, usize) {
        let graph = self.graph.lock();
        (graph.node_count(), graph.edge_count())
    }
}

#[async_trait]
impl Stage for GraphStage {
    fn id(&self) -> StageId {
        StageId::Graph
    }

    fn name(&self) -> &'static str {
        "Graph Analysis"
    }

    fn info(&self) -> StageInfo {
        StageInfo::new(self.id(), self.name())
            .described_as("Maintains the knowledge graph from resolved relationships")
            .required()
            .subscribes_to(vec![Topic::RelationshipFound.as_str()])
            .publishes_events(vec![Topic::GraphUpdated.as_str()])
    }

    async fn start(&self) -> Result<(), StageError> {
        self.ctx
            .bus()
            .subscribe(Topic::RelationshipFound, Arc::clone(&self.handler));
        self.running.store(true, Ordering::SeqCst);
        info!(stage = %self.id(), "Stage started");
        Ok(())
    }

    async fn stop(&self) -> Result<(), StageError> {
        self.ctx.bus().unsubscribe(Topic::RelationshipFound, &self.handler);
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

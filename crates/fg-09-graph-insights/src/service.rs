//! Graph insights stage wiring.

use crate::domain::AnalysisGraph;
use async_trait::async_trait;
use parking_lot::Mutex;
use shared_bus::events::{GraphAnalysisReport, InferredRelationship};
use shared_bus::{DynHandler, Event, EventHandler, StageContext, Topic};
use shared_types::{GraphStats, Stage, StageError, StageId, StageInfo, StageStatus};
use std::collections::{BTreeSet, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightsConfig {
    /// Nodes listed in each report.
    pub top_n: usize,
    /// Common neighbours needed to infer a link.
    pub min_shared_neighbors: usize,
    /// Inferred links published per update.
    pub max_inferred: usize,
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            top_n: 10,
            min_shared_neighbors: 2,
            max_inferred: 20,
        }
    }
}

#[derive(Default)]
struct InsightState {
    graph: AnalysisGraph,
    /// Inferred pairs already announced.
    announced: HashSet<(String, String)>,
}

struct InsightsHandler {
    ctx: StageContext,
    state: Mutex<InsightState>,
    config: InsightsConfig,
}

impl InsightsHandler {
    /// Update the graph and compute this event's output under the lock.
    fn analyse(&self, doc_id: &str, stats: &GraphStats) -> (GraphAnalysisReport, Vec<InferredRelationship>) {
        let mut state = self.state.lock();
        state.graph.add_edges(&stats.edges);

        let components = state.graph.component_sizes();
        let report = GraphAnalysisReport {
            doc_id: doc_id.to_string(),
            node_count: state.graph.node_count(),
            edge_count: state.graph.edge_count(),
            component_count: components.len(),
            largest_component: components.first().copied().unwrap_or(0),
            top_central: state.graph.degree_centrality(self.config.top_n),
        };

        let focus: BTreeSet<String> = stats.nodes.iter().map(|n| n.id.clone()).collect();
        let candidates = state
            .graph
            .infer_links(&focus, self.config.min_shared_neighbors);
        let mut fresh = Vec::new();
        for link in candidates {
            if fresh.len() >= self.config.max_inferred {
                break;
            }
            if state
                .announced
                .insert((link.source.clone(), link.target.clone()))
            {
                fresh.push(link);
            }
        }
        (report, fresh)
    }
}

#[async_trait]
impl EventHandler for InsightsHandler {
    fn name(&self) -> &str {
        "fg-09-graph-insights.graph_updated"
    }

    async fn handle(&self, event: Arc<Event>) -> anyhow::Result<()> {
        let Event::GraphUpdated(updated) = event.as_ref() else {
            return Ok(());
        };
        if self.ctx.is_cancelled() {
            return Ok(());
        }

        let (report, inferred) = self.analyse(&updated.doc_id, &updated.graph_stats);
        debug!(
            doc_id = %updated.doc_id,
            components = report.component_count,
            inferred = inferred.len(),
            "Graph analysed"
        );

        self.ctx.publish(Event::GraphAnalysis(report)).await;
        for link in inferred {
            self.ctx.publish(Event::InferredRelationship(link)).await;
        }
        Ok(())
    }
}

/// Stage 9: structural analysis of the accumulated graph.
pub struct GraphInsightsStage {
    ctx: StageContext,
    handler: DynHandler,
    running: AtomicBool,
}

impl GraphInsightsStage {
    pub fn new(ctx: StageContext, config: InsightsConfig) -> Self {
        let handler: DynHandler = Arc::new(InsightsHandler {
            ctx: ctx.clone(),
            state: Mutex::new(InsightState::default()),
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
impl Stage for GraphInsightsStage {
    fn id(&self) -> StageId {
        StageId::GraphInsights
    }

    fn name(&self) -> &'static str {
        "Advanced Graph Analysis"
    }

    fn info(&self) -> StageInfo {
        StageInfo::new(self.id(), self.name())
            .described_as("Centrality, components and inferred relationships")
            .subscribes_to(vec![Topic::GraphUpdated.as_str()])
            .publishes_events(vec![
                Topic::GraphAnalysis.as_str(),
                Topic::InferredRelationship.as_str(),
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

//! # Knowledge Graph
//!
//! Nodes are keyed by entity name, edges by `(source, target, relation_type)`.
//!
//! ## Invariants
//!
//! - Every edge endpoint is a node
//! - Applying the same relationships twice leaves the graph unchanged
//! - An edge keeps the highest confidence it was ever reported with
//! - A node typed `Unknown` takes the first concrete type reported for it

use shared_types::{GraphEdge, GraphNode, GraphStats, Relationship, UNKNOWN_TYPE};
use std::collections::{BTreeMap, BTreeSet, HashMap};

/// `(source, target, relation_type)`.
pub type EdgeKey = (String, String, String);

#[derive(Debug, Default)]
pub struct KnowledgeGraph {
    nodes: BTreeMap<String, GraphNode>,
    edges: Vec<GraphEdge>,
    edge_index: HashMap<EdgeKey, usize>,
}

impl KnowledgeGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    #[must_use]
    pub fn node(&self, id: &str) -> Option<&GraphNode> {
        self.nodes.get(id)
    }

    #[must_use]
    pub fn edges(&self) -> &[GraphEdge] {
        &self.edges
    }

    /// Upsert `relationships` from `doc_id`.
    ///
    /// Returns graph totals plus the nodes and edges touched by this call.
    pub fn apply(&mut self, doc_id: &str, relationships: &[Relationship]) -> GraphStats {
        let mut touched_nodes = BTreeSet::new();
        let mut touched_edges = BTreeSet::new();

        for rel in relationships {
            if rel.source.is_empty() || rel.target.is_empty() {
                continue;
            }
            self.upsert_node(&rel.source, rel.source_type.as_deref());
            self.upsert_node(&rel.target, rel.target_type.as_deref());
            touched_nodes.insert(rel.source.clone());
            touched_nodes.insert(rel.target.clone());
            touched_edges.insert(self.upsert_edge(doc_id, rel));
        }

        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            nodes: touched_nodes
                .iter()
                .filter_map(|id| self.nodes.get(id).cloned())
                .collect(),
            edges: touched_edges
                .into_iter()
                .map(|idx| self.edges[idx].clone())
                .collect(),
        }
    }

    /// Graph totals with the node and edge lists narrowed to the given keys.
    ///
    /// Unknown keys are skipped.
    #[must_use]
    pub fn stats_for<'a, N, E>(&self, node_ids: N, edge_keys: E) -> GraphStats
    where
        N: IntoIterator<Item = &'a String>,
        E: IntoIterator<Item = &'a EdgeKey>,
    {
        GraphStats {
            node_count: self.nodes.len(),
            edge_count: self.edges.len(),
            nodes: node_ids
                .into_iter()
                .filter_map(|id| self.nodes.get(id).cloned())
                .collect(),
            edges: edge_keys
                .into_iter()
                .filter_map(|key| self.edge_index.get(key))
                .map(|&idx| self.edges[idx].clone())
                .collect(),
        }
    }

    fn upsert_node(&mut self, id: &str, node_type: Option<&str>) {
        let node_type = node_type.filter(|t| !t.is_empty()).unwrap_or(UNKNOWN_TYPE);
        match self.nodes.get_mut(id) {
            Some(node) => {
                if node.node_type == UNKNOWN_TYPE && node_type != UNKNOWN_TYPE {
                    node.node_type = node_type.to_string();
                }
            }
            None => {
                self.nodes.insert(
                    id.to_string(),
                    GraphNode {
                        id: id.to_string(),
                        node_type: node_type.to_string(),
                    },
                );
            }
        }
    }

    fn upsert_edge(&mut self, doc_id: &str, rel: &Relationship) -> usize {
        let key = (rel.source.clone(), rel.target.clone(), rel.relation_type.clone());
        if let Some(&idx) = self.edge_index.get(&key) {
            let edge = &mut self.edges[idx];
            edge.confidence = edge.confidence.max(rel.confidence);
            return idx;
        }

        let idx = self.edges.len();
        self.edges.push(GraphEdge {
            source: rel.source.clone(),
            target: rel.target.clone(),
            relation_type: rel.relation_type.clone(),
            confidence: rel.confidence,
            doc_id: doc_id.to_string(),
        });
        self.edge_index.insert(key, idx);
        idx
    }
}

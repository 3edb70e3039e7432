//! # Graph Analysis
//!
//! Structural measures over the undirected view of the knowledge graph.
//!
//! - **Degree centrality**: `degree / (n - 1)`
//! - **Connected components**: breadth-first search
//! - **Inferred links**: two nodes with at least `min_shared` common
//!   neighbours and no edge between them are probably related. Confidence
//!   is the Jaccard index of their neighbourhoods.

use shared_bus::events::{CentralNode, InferredRelationship};
use shared_types::GraphEdge;
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};

/// Relation type of inferred links.
pub const RELATED_TO: &str = "RELATED_TO";

#[derive(Debug, Default)]
pub struct AnalysisGraph {
    adjacency: BTreeMap<String, BTreeSet<String>>,
    edges: HashSet<(String, String, String)>,
}

impl AnalysisGraph {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn node_count(&self) -> usize {
        self.adjacency.len()
    }

    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Add edges; existing edges are ignored.
    pub fn add_edges(&mut self, edges: &[GraphEdge]) {
        for edge in edges {
            self.edges.insert((
                edge.source.clone(),
                edge.target.clone(),
                edge.relation_type.clone(),
            ));
            self.adjacency.entry(edge.source.clone()).or_default();
            self.adjacency.entry(edge.target.clone()).or_default();
            if edge.source != edge.target {
                if let Some(n) = self.adjacency.get_mut(&edge.source) {
                    n.insert(edge.target.clone());
                }
                if let Some(n) = self.adjacency.get_mut(&edge.target) {
                    n.insert(edge.source.clone());
                }
            }
        }
    }

    /// The `top_n` nodes by degree, ties broken by id.
    #[must_use]
    pub fn degree_centrality(&self, top_n: usize) -> Vec<CentralNode> {
        let denominator = self.adjacency.len().saturating_sub(1).max(1) as f64;
        let mut ranked: Vec<CentralNode> = self
            .adjacency
            .iter()
            .map(|(id, neighbours)| CentralNode {
                id: id.clone(),
                degree: neighbours.len(),
                centrality: neighbours.len() as f64 / denominator,
            })
            .collect();
        ranked.sort_by(|a, b| b.degree.cmp(&a.degree).then_with(|| a.id.cmp(&b.id)));
        ranked.truncate(top_n);
        ranked
    }

    /// Sizes of the connected components, largest first.
    #[must_use]
    pub fn component_sizes(&self) -> Vec<usize> {
        let mut seen: HashSet<&str> = HashSet::new();
        let mut sizes = Vec::new();

        for start in self.adjacency.keys() {
            if !seen.insert(start.as_str()) {
                continue;
            }
            let mut size = 0;
            let mut queue = VecDeque::from([start.as_str()]);
            while let Some(node) = queue.pop_front() {
                size += 1;
                for next in self.adjacency.get(node).into_iter().flatten() {
                    if seen.insert(next.as_str()) {
                        queue.push_back(next.as_str());
                    }
                }
            }
            sizes.push(size);
        }

        sizes.sort_unstable_by(|a, b| b.cmp(a));
        sizes
    }

    fn connected(&self, a: &str, b: &str) -> bool {
        self.adjacency.get(a).is_some_and(|n| n.contains(b))
    }

    /// Inferred links with at least one endpoint in `focus`.
    ///
    /// Pairs are returned with `source < target`, ordered by shared
    /// neighbour count (descending) and then by name.
    #[must_use]
    pub fn infer_links(&self, focus: &BTreeSet<String>, min_shared: usize) -> Vec<InferredRelationship> {
        let mut pairs: BTreeSet<(String, String)> = BTreeSet::new();
        for node in focus {
            let Some(neighbours) = self.adjacency.get(node) else {
                continue;
            };
            // Candidates are two hops away.
            for mid in neighbours {
                for candidate in self.adjacency.get(mid).into_iter().flatten() {
                    if candidate == node || self.connected(node, candidate) {
                        continue;
                    }
                    let pair = if node < candidate {
                        (node.clone(), candidate.clone())
                    } else {
                        (candidate.clone(), node.clone())
                    };
                    pairs.insert(pair);
                }
            }
        }

        let mut inferred: Vec<InferredRelationship> = pairs
            .into_iter()
            .filter_map(|(a, b)| {
                let na = self.adjacency.get(&a)?;
                let nb = self.adjacency.get(&b)?;
                let shared = na.intersection(nb).count();
                if shared < min_shared.max(1) {
                    return None;
                }
                let union = na.union(nb).count();
                Some(InferredRelationship {
                    source: a,
                    target: b,
                    relation_type: RELATED_TO.to_string(),
                    confidence: shared as f64 / union as f64,
                    shared_neighbors: shared,
                })
            })
            .collect();

        inferred.sort_by(|x, y| {
            y.shared_neighbors
                .cmp(&x.shared_neighbors)
                .then_with(|| x.source.cmp(&y.source))
                .then_with(|| x.target.cmp(&y.target))
        });
        inferred
    }
}

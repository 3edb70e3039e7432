//! # Document Progress
//!
//! Relationship batches of one document are handled concurrently, so they
//! may be applied in any order. A document is complete once the batch
//! flagged `is_complete` and every batch before it have been applied.

use super::graph::EdgeKey;
use shared_types::GraphStats;
use std::collections::{BTreeSet, HashMap};

/// Nodes and edges a document touched so far.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentProgress {
    pub nodes: BTreeSet<String>,
    pub edges: BTreeSet<EdgeKey>,
    received: usize,
    expected: Option<usize>,
}

impl DocumentProgress {
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.expected.is_some_and(|n| self.received >= n)
    }
}

#[derive(Debug, Default)]
pub struct BatchTracker {
    documents: HashMap<String, DocumentProgress>,
}

impl BatchTracker {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one applied batch into its document.
    ///
    /// A missing `batch_index` counts as batch 0. Completed documents are
    /// forgotten, so a replay starts from scratch.
    pub fn record(
        &mut self,
        doc_id: &str,
        touched: &GraphStats,
        batch_index: Option<usize>,
        is_complete: bool,
    ) -> DocumentProgress {
        let progress = self.documents.entry(doc_id.to_string()).or_default();
        progress.nodes.extend(touched.nodes.iter().map(|n| n.id.clone()));
        progress.edges.extend(
            touched
                .edges
                .iter()
                .map(|e| (e.source.clone(), e.target.clone(), e.relation_type.clone())),
        );
        progress.received += 1;
        if is_complete {
            progress.expected = Some(batch_index.unwrap_or(0) + 1);
        }

        if progress.is_complete() {
            self.documents.remove(doc_id).unwrap_or_default()
        } else {
            progress.clone()
        }
    }

    /// Documents still waiting for batches.
    #[must_use]
    pub fn open_documents(&self) -> usize {
        self.documents.len()
    }
}

//! # FG-04 Graph
//!
//! Maintains the in-memory knowledge graph and announces every change.
//!
//! ```text
//! relationship.found ──→ upsert nodes/edges ──→ graph.updated
//! ```
//!
//! One `graph.updated` is published per relationship batch. It carries the
//! graph totals and the nodes and edges the document has touched so far;
//! `is_complete` is set once every batch of the document has been applied.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod service;

pub use domain::{BatchTracker, DocumentProgress, KnowledgeGraph};
pub use service::GraphStage;

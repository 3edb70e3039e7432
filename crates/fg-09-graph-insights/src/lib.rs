//! # FG-09 Graph Insights
//!
//! Keeps its own copy of the graph and reports on its shape.
//!
//! ```text
//! graph.updated ──→ centrality + components ──→ graph.analysis
//!               └─→ shared-neighbour links ──→ relationship.inferred
//! ```
//!
//! `relationship.inferred` is informational; nothing in the pipeline has
//! to listen to it. Each inferred pair is announced once.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod domain;
pub mod service;

pub use domain::{AnalysisGraph, RELATED_TO};
pub use service::{GraphInsightsStage, InsightsConfig};

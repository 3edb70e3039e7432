//! # FG-07 Vector Index
//!
//! Stores embeddings so later stages can ask "what looks like this?".
//!
//! ```text
//! entity.embedded ───────┐
//!                        ├──→ VectorIndex::upsert
//! relationship.embedded ─┘
//! ```
//!
//! Entities and relationships live in separate collections. Search is
//! cosine similarity with a result limit and a score threshold
//! (defaults 5 and 0.7).

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod ports;
pub mod service;

pub use adapters::InMemoryVectorIndex;
pub use ports::{
    Collection, SearchHit, SearchQuery, VectorError, VectorIndex, VectorPayload,
    DEFAULT_SCORE_THRESHOLD, DEFAULT_SEARCH_LIMIT,
};
pub use service::VectorIndexStage;

//! # FG-06 Embedding
//!
//! Attaches a vector to every extracted entity and resolved relationship.
//!
//! ```text
//! entity.extracted ────→ [Embedder] ──→ entity.embedded (one per entity)
//! relationship.found ──→ [Embedder] ──→ relationship.embedded (one per relation)
//! ```
//!
//! Model inference is behind the `Embedder` port. `HashingEmbedder` is a
//! deterministic stand-in that needs no model files.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod adapters;
pub mod ports;
pub mod service;

pub use adapters::{HashingEmbedder, DEFAULT_DIMENSION};
pub use ports::{EmbedError, Embedder};
pub use service::{relationship_text, EmbeddingStage};

//! # FG-03 Relationship Resolution
//!
//! Turns the entity list of a chunk into typed relationships.
//!
//! ## Event Flow
//!
//! ```text
//! data.ingested ────→ content cache
//!                          │
//! entity.extracted ──→ [LlmClient] ──→ relationship.found (batch 0..n)
//! ```
//!
//! Only relationships between entities of the same chunk survive; each is
//! stamped with its endpoint types so downstream ids are stable. The last
//! batch of a chunk has `is_complete` set.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod domain;
pub mod service;

pub use domain::{relationship_prompt, resolve_relationships, ContentCache, RelationError};
pub use service::{ResolutionConfig, ResolutionStage};

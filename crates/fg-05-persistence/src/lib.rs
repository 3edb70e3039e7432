//! # FG-05 Persistence
//!
//! Writes everything the pipeline produces into a [`KnowledgeStore`].
//!
//! ## Event Flow
//!
//! ```text
//! document.metadata ───┐
//! entity.extracted ────┤
//! relationship.found ──┤
//! entity.merged ───────┼──→ KnowledgeStore (upsert)
//! semantic.profile ────┤
//! narrative.generated ─┘
//! ```
//!
//! ## Hexagonal Layout
//!
//! - `domain`: stored records and `StoreError`
//! - `ports`: the `KnowledgeStore` trait
//! - `adapters`: `InMemoryKnowledgeStore`
//!
//! All writes are upserts keyed by content-derived ids, so replaying an
//! event leaves the store unchanged.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod adapters;
pub mod domain;
pub mod ports;
pub mod service;

pub use adapters::InMemoryKnowledgeStore;
pub use domain::{
    DocumentRecord, EntityRecord, ProfileRecord, RelationshipRecord, StoreCounts, StoreError,
};
pub use ports::KnowledgeStore;
pub use service::{PersistenceStage, PERSISTED_TOPICS};

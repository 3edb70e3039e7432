//! # FG-12 Entity Cards
//!
//! ```text
//! entity.extracted ──→ [KnowledgeStore] ──→ entity_card.ready (one per entity)
//! ```
//!
//! A card names the entity, its type and how many stored relationships it
//! takes part in at the time it was extracted.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod domain;
pub mod service;

pub use domain::entity_card;
pub use service::EntityCardStage;

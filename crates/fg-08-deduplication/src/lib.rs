//! # FG-08 Deduplication
//!
//! Finds entities that are the same thing under different names.
//!
//! ```text
//! entity.embedded ──→ VectorIndex::search (same type, score ≥ threshold)
//!                          │
//!                          ├──→ [LlmClient] YES/NO (when configured)
//!                          ▼
//!                     entity.merged (kept = smaller id)
//! ```
//!
//! Each pair is decided once; an entity that was merged away is never
//! considered again.

#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod domain;
pub mod service;

pub use domain::{confirmation_prompt, is_confirmed, ordered_pair, MergeLedger};
pub use service::{DeduplicationConfig, DeduplicationStage};

//! # FG-10 Semantic Profiler
//!
//! Writes a short profile for every graph entity the first time it shows up.
//!
//! ```text
//! graph.updated ──→ intelligence.processing.start
//!               ──→ [LlmClient] per new node ──→ semantic.profile
//!               ──→ intelligence.processing.end
//! ```
//!
//! At most `max_per_event` nodes are profiled per update, with a pause
//! between calls. A node whose profile failed is retried on a later update.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod domain;
pub mod service;

pub use domain::{profile_prompt, relation_lines, Profile, ProfileDraft, ProfileError};
pub use service::{ProfilerConfig, ProfilerStage};

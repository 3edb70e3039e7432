//! # FG-11 Narrative Synthesis
//!
//! ```text
//! graph.updated ──→ [LlmClient] ──→ narrative.generated
//! ```
//!
//! Only complete updates are narrated, so the prompt quotes every node and
//! edge of the document. Blank model output is treated as a failure.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod domain;
pub mod service;

pub use domain::{narrative_prompt, MAX_PROMPT_EDGES};
pub use service::{NarrativeConfig, NarrativeStage};

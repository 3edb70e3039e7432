//! # FG-02 Entity Extraction
//!
//! Asks the LLM for the named entities of every ingested chunk and
//! publishes them, normalized, on `entity.extracted`.
//!
//! ## Event Flow
//!
//! ```text
//! data.ingested ──→ [LlmClient] ──→ normalize ──→ entity.extracted
//!                        │
//!                        └─ failure ──→ dlq.stage
//! ```
//!
//! Empty content is skipped; LLM failures, non-array output and outputs with
//! no valid entity withhold the event.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod domain;
pub mod service;

pub use domain::{extraction_prompt, normalize_entities, NormalizeError};
pub use service::{ExtractionConfig, ExtractionStage};

//! # Forge Runtime Library
//!
//! Builds and drives the Forge pipeline. The `forge` binary in `main.rs`
//! is a thin CLI over this library.
//!
//! ## Modular Structure
//!
//! - `container/` - configuration and stage wiring
//! - `ingest` - document discovery and word chunking
//! - `runtime` - run lifecycle: start, ingest, drain, shutdown
//!
//! ## Choreography
//!
//! ```text
//! ingest ──data.ingested──→ Metadata(1), Extraction(2), Resolution(3)
//!                                       │
//!                               entity.extracted ──→ Resolution(3), Embedding(6), EntityCards(12)
//!                                                          │
//!                                                  relationship.found
//!                                                          │
//!                         Graph(4) ──graph.updated──→ Insights(9), Profiler(10), Narrative(11)
//!
//! Persistence(5) listens to every knowledge-bearing topic.
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]
#![allow(clippy::module_name_repetitions)]

pub mod container;
pub mod ingest;
pub mod runtime;

pub use container::{llm_client, llm_client_from_env, ConfigError, ForgeConfig, ServiceContainer};
pub use ingest::{chunk_words, IngestError, IngestReport};
pub use runtime::PipelineRuntime;

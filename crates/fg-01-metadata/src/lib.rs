//! # FG-01 Document Metadata
//!
//! Reads report headers (classification, report id, date, precedence, zone,
//! authoring unit) from every ingested chunk.
//!
//! ## Event Flow
//!
//! ```text
//! data.ingested ──→ [header patterns] ──→ document.metadata
//! ```
//!
//! Chunks without recognisable header fields produce no event.

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod domain;
pub mod service;

pub use domain::extract_metadata;
pub use service::MetadataStage;

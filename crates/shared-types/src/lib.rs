//! # Shared Types Crate
//!
//! This crate contains the domain entities shared by every pipeline stage
//! and the `Stage` lifecycle contract.
//!
//! ## Design Principles
//!
//! - **Single Source of Truth**: all cross-stage types are defined here.
//! - **Content-derived identity**: entities and relationships carry stable
//!   ids so that persistence can upsert instead of insert.
//! - **No bus dependency**: stages receive their bus handle at construction;
//!   this crate only describes what a stage is.

// Nursery lints that are too strict
#![allow(clippy::missing_const_for_fn)]
// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod entities;
pub mod stage_registry;
pub mod stage_trait;

pub use entities::*;
pub use stage_registry::StageRegistry;
pub use stage_trait::{DynStage, Stage, StageError, StageErrorKind, StageInfo, StageStatus};

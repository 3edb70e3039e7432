//! # Service Container
//!
//! Central container holding the bus, the shared adapters and every stage
//! the configuration allows, with dependency injection at construction.
//!
//! - Stages are built in `StageId` order and started through the registry
//! - All inter-stage communication goes through the bus (no direct calls)
//! - Adapters implement the outbound ports of persistence, embedding and
//!   vector search

pub mod config;
pub mod services;

pub use config::{
    ConfigError, EmbeddingSettings, ForgeConfig, LlmSettings, ProcessingSettings,
    RuntimeSettings, VectorSettings,
};
pub use services::{llm_client, llm_client_from_env, ServiceContainer};

//! Concrete LLM providers.

pub mod openai_compat;

pub use openai_compat::{OpenAiCompatProvider, ProviderConfig, ProviderKind};

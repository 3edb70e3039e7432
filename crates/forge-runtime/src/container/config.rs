//! # Forge Configuration
//!
//! Unified configuration for every stage and the runtime itself.
//!
//! ## Sources (later wins)
//!
//! 1. Built-in defaults
//! 2. Optional TOML file (`--config path`)
//! 3. `FORGE_*` environment variables
//!
//! All sections use `#[serde(default)]`, so a file only needs the keys it
//! overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    /// LLM request shaping and rate limiting.
    pub llm: LlmSettings,
    /// Similarity search and deduplication.
    pub vector: VectorSettings,
    /// Embedding generation.
    pub embedding: EmbeddingSettings,
    /// Chunking and per-stage processing knobs.
    pub processing: ProcessingSettings,
    /// Runtime behaviour.
    pub runtime: RuntimeSettings,
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {field}: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub extraction_max_tokens: u32,
    pub extraction_temperature: f32,
    pub profiling_max_tokens: u32,
    pub profiling_temperature: f32,
    pub narrative_max_tokens: u32,
    pub narrative_temperature: f32,
    pub deduplication_max_tokens: u32,
    pub deduplication_temperature: f32,
    /// Concurrent LLM requests allowed.
    pub rate_limit_max_concurrent: usize,
    /// Minimum spacing between request starts, in seconds.
    pub rate_limit_min_delay: f64,
    pub rate_limit_max_retries: u32,
    /// Per-request timeout, in seconds.
    pub request_timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            extraction_max_tokens: 2000,
            extraction_temperature: 0.3,
            profiling_max_tokens: 500,
            profiling_temperature: 0.3,
            narrative_max_tokens: 1500,
            narrative_temperature: 0.5,
            deduplication_max_tokens: 10,
            deduplication_temperature: 0.0,
            rate_limit_max_concurrent: 1,
            rate_limit_min_delay: 2.0,
            rate_limit_max_retries: 3,
            request_timeout_secs: 60,
        }
    }
}

impl LlmSettings {
    pub fn min_delay(&self) -> Duration {
        Duration::from_secs_f64(self.rate_limit_min_delay)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorSettings {
    /// Cosine similarity at which two entities count as duplicates.
    pub deduplication_threshold: f32,
    /// Neighbours inspected per embedded entity.
    pub deduplication_search_limit: usize,
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self {
            deduplication_threshold: 0.85,
            deduplication_search_limit: 5,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Registers the embedding, vector index and deduplication stages.
    pub enabled: bool,
    pub dimension: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            dimension: 768,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingSettings {
    /// Words per chunk.
    pub chunk_size: usize,
    /// Words shared by consecutive chunks.
    pub chunk_overlap: usize,
    /// Pause between two profiles, in seconds.
    pub profiler_delay: f64,
    /// Profiles started per graph update.
    pub profiles_per_update: usize,
    pub auto_deduplication: bool,
    pub relationship_batch_size: usize,
    pub insights_top_n: usize,
}

impl Default for ProcessingSettings {
    fn default() -> Self {
        Self {
            chunk_size: 512,
            chunk_overlap: 50,
            profiler_delay: 0.3,
            profiles_per_update: 10,
            auto_deduplication: true,
            relationship_batch_size: 25,
            insights_top_n: 10,
        }
    }
}

impl ProcessingSettings {
    pub fn profiler_delay(&self) -> Duration {
        Duration::from_secs_f64(self.profiler_delay)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeSettings {
    /// How long ingestion waits for the pipeline to drain, in seconds.
    pub idle_timeout_secs: u64,
}

impl Default for RuntimeSettings {
    fn default() -> Self {
        Self {
            idle_timeout_secs: shared_bus::DEFAULT_IDLE_TIMEOUT_SECS,
        }
    }
}

impl RuntimeSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl ForgeConfig {
    /// Defaults, then `path` (if any), then the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&text)
    }

    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Apply `FORGE_*` overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        override_with(&get, "FORGE_CHUNK_SIZE", &mut self.processing.chunk_size)?;
        override_with(&get, "FORGE_CHUNK_OVERLAP", &mut self.processing.chunk_overlap)?;
        override_with(&get, "FORGE_PROFILER_DELAY", &mut self.processing.profiler_delay)?;
        override_with(
            &get,
            "FORGE_AUTO_DEDUPLICATION",
            &mut self.processing.auto_deduplication,
        )?;
        override_with(&get, "FORGE_EMBEDDINGS_ENABLED", &mut self.embedding.enabled)?;
        override_with(&get, "FORGE_EMBEDDING_DIMENSION", &mut self.embedding.dimension)?;
        override_with(
            &get,
            "FORGE_DEDUPLICATION_THRESHOLD",
            &mut self.vector.deduplication_threshold,
        )?;
        override_with(
            &get,
            "FORGE_RATE_LIMIT_MAX_CONCURRENT",
            &mut self.llm.rate_limit_max_concurrent,
        )?;
        override_with(
            &get,
            "FORGE_RATE_LIMIT_MIN_DELAY",
            &mut self.llm.rate_limit_min_delay,
        )?;
        override_with(
            &get,
            "FORGE_RATE_LIMIT_MAX_RETRIES",
            &mut self.llm.rate_limit_max_retries,
        )?;
        override_with(&get, "FORGE_IDLE_TIMEOUT", &mut self.runtime.idle_timeout_secs)?;
        Ok(())
    }

    /// Check every value against its allowed range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let llm = &self.llm;
        if !(1..=20).contains(&llm.rate_limit_max_concurrent) {
            return Err(ConfigError::invalid(
                "llm.rate_limit_max_concurrent",
                format!("{} is outside 1..=20", llm.rate_limit_max_concurrent),
            ));
        }
        if !(0.1..=60.0).contains(&llm.rate_limit_min_delay) {
            return Err(ConfigError::invalid(
                "llm.rate_limit_min_delay",
                format!("{} is outside 0.1..=60 seconds", llm.rate_limit_min_delay),
            ));
        }
        if llm.rate_limit_max_retries > 10 {
            return Err(ConfigError::invalid(
                "llm.rate_limit_max_retries",
                format!("{} is above 10", llm.rate_limit_max_retries),
            ));
        }
        if llm.request_timeout_secs == 0 {
            return Err(ConfigError::invalid("llm.request_timeout_secs", "must be positive"));
        }
        for (field, value) in [
            ("llm.extraction_temperature", llm.extraction_temperature),
            ("llm.profiling_temperature", llm.profiling_temperature),
            ("llm.narrative_temperature", llm.narrative_temperature),
            ("llm.deduplication_temperature", llm.deduplication_temperature),
        ] {
            if !(0.0..=2.0).contains(&value) {
                return Err(ConfigError::invalid(field, format!("{value} is outside 0..=2")));
            }
        }

        if !(0.0..=1.0).contains(&self.vector.deduplication_threshold) {
            return Err(ConfigError::invalid(
                "vector.deduplication_threshold",
                format!("{} is outside 0..=1", self.vector.deduplication_threshold),
            ));
        }
        if !(128..=4096).contains(&self.embedding.dimension) {
            return Err(ConfigError::invalid(
                "embedding.dimension",
                format!("{} is outside 128..=4096", self.embedding.dimension),
            ));
        }

        let processing = &self.processing;
        if processing.chunk_size == 0 {
            return Err(ConfigError::invalid("processing.chunk_size", "must be positive"));
        }
        if processing.chunk_overlap >= processing.chunk_size {
            return Err(ConfigError::invalid(
                "processing.chunk_overlap",
                format!(
                    "{} must be smaller than chunk_size {}",
                    processing.chunk_overlap, processing.chunk_size
                ),
            ));
        }
        if !processing.profiler_delay.is_finite() || processing.profiler_delay < 0.0 {
            return Err(ConfigError::invalid(
                "processing.profiler_delay",
                "must be a non-negative number of seconds",
            ));
        }
        if processing.relationship_batch_size == 0 {
            return Err(ConfigError::invalid(
                "processing.relationship_batch_size",
                "must be positive",
            ));
        }
        Ok(())
    }
}

fn override_with<G, T>(get: &G, key: &'static str, slot: &mut T) -> Result<(), ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    if let Some(raw) = get(key) {
        *slot = raw
            .trim()
            .parse()
            .map_err(|e: T::Err| ConfigError::invalid(key, format!("{raw:?}: {e}")))?;
    }
    Ok(())
}

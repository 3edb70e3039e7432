//! # Outbound Ports
//!
//! The vector database the pipeline indexes into and searches.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Default number of hits returned by a search.
pub const DEFAULT_SEARCH_LIMIT: usize = 5;

/// Default minimum cosine similarity of a hit.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.7;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum VectorError {
    #[error("vector has dimension {actual}, index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector contains non-finite values")]
    NonFinite,

    #[error("vector backend error: {0}")]
    Backend(String),
}

/// Independent id spaces inside one index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Collection {
    Entities,
    Relationships,
}

impl Collection {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Entities => "entities",
            Self::Relationships => "relationships",
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Data stored next to a vector.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VectorPayload {
    pub doc_id: String,
    pub text: String,
    /// Entity type; `None` for relationships.
    pub entity_type: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchHit {
    pub id: String,
    pub score: f32,
    pub payload: VectorPayload,
}

/// A nearest-neighbour query.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub vector: Vec<f32>,
    pub limit: usize,
    pub threshold: f32,
    /// Only hits whose payload has this entity type.
    pub entity_type: Option<String>,
    /// Never return this id.
    pub exclude_id: Option<String>,
}

impl SearchQuery {
    #[must_use]
    pub fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            limit: DEFAULT_SEARCH_LIMIT,
            threshold: DEFAULT_SCORE_THRESHOLD,
            entity_type: None,
            exclude_id: None,
        }
    }

    #[must_use]
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    #[must_use]
    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    #[must_use]
    pub fn of_type(mut self, entity_type: impl Into<String>) -> Self {
        self.entity_type = Some(entity_type.into());
        self
    }

    #[must_use]
    pub fn excluding(mut self, id: impl Into<String>) -> Self {
        self.exclude_id = Some(id.into());
        self
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    fn dimension(&self) -> usize;

    /// Insert or replace the vector stored under `id`.
    async fn upsert(
        &self,
        collection: Collection,
        id: &str,
        vector: Vec<f32>,
        payload: VectorPayload,
    ) -> Result<(), VectorError>;

    /// Hits at or above `query.threshold`, best first, at most `query.limit`.
    async fn search(&self, collection: Collection, query: &SearchQuery) -> Result<Vec<SearchHit>, VectorError>;

    async fn len(&self, collection: Collection) -> Result<usize, VectorError>;

    async fn clear(&self) -> Result<(), VectorError>;
}

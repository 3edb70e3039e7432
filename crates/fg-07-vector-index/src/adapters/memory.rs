//! Brute-force cosine index held in memory.

use crate::ports::{Collection, SearchHit, SearchQuery, VectorError, VectorIndex, VectorPayload};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
struct StoredVector {
    vector: Vec<f32>,
    norm: f32,
    payload: VectorPayload,
}

#[derive(Debug)]
pub struct InMemoryVectorIndex {
    dimension: usize,
    collections: RwLock<HashMap<Collection, BTreeMap<String, StoredVector>>>,
}

impl InMemoryVectorIndex {
    #[must_use]
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            collections: RwLock::new(HashMap::new()),
        }
    }

    fn check(&self, vector: &[f32]) -> Result<f32, VectorError> {
        if vector.len() != self.dimension {
            return Err(VectorError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(VectorError::NonFinite);
        }
        Ok(norm(vector))
    }
}

fn norm(vector: &[f32]) -> f32 {
    vector.iter().map(|v| v * v).sum::<f32>().sqrt()
}

/// Cosine similarity; zero vectors score 0.
fn cosine(a: &[f32], a_norm: f32, b: &[f32], b_norm: f32) -> f32 {
    if a_norm == 0.0 || b_norm == 0.0 {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    dot / (a_norm * b_norm)
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn upsert(
        &self,
        collection: Collection,
        id: &str,
        vector: Vec<f32>,
        payload: VectorPayload,
    ) -> Result<(), VectorError> {
        let norm = self.check(&vector)?;
        self.collections.write().entry(collection).or_default().insert(
            id.to_string(),
            StoredVector {
                vector,
                norm,
                payload,
            },
        );
        Ok(())
    }

    async fn search(&self, collection: Collection, query: &SearchQuery) -> Result<Vec<SearchHit>, VectorError> {
        let query_norm = self.check(&query.vector)?;
        if query.limit == 0 {
            return Ok(Vec::new());
        }

        let collections = self.collections.read();
        let Some(stored) = collections.get(&collection) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<SearchHit> = stored
            .iter()
            .filter(|(id, _)| query.exclude_id.as_deref() != Some(id.as_str()))
            .filter(|(_, v)| match &query.entity_type {
                Some(wanted) => v.payload.entity_type.as_deref() == Some(wanted.as_str()),
                None => true,
            })
            .filter_map(|(id, v)| {
                let score = cosine(&query.vector, query_norm, &v.vector, v.norm);
                (score >= query.threshold).then(|| SearchHit {
                    id: id.clone(),
                    score,
                    payload: v.payload.clone(),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(query.limit);
        Ok(hits)
    }

    async fn len(&self, collection: Collection) -> Result<usize, VectorError> {
        Ok(self
            .collections
            .read()
            .get(&collection)
            .map_or(0, BTreeMap::len))
    }

    async fn clear(&self) -> Result<(), VectorError> {
        self.collections.write().clear();
        Ok(())
    }
}

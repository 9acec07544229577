pub mod qdrant;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;

use ferrobot_core::domain::product::Sku;

/// Fixed embedding dimension; set at collection creation and never
/// changed afterwards.
pub const EMBEDDING_DIMENSION: usize = 1536;

/// Default number of candidates pulled for a search.
pub const DEFAULT_TOP_K: usize = 5;

/// Hits scoring below this cosine similarity are dropped.
pub const DEFAULT_SCORE_THRESHOLD: f32 = 0.6;

/// Relaxed threshold used by the related-products fallback pass.
pub const FALLBACK_SCORE_THRESHOLD: f32 = 0.45;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("vector index transport failed: {0}")]
    Transport(String),
    #[error("vector index rejected the request: {0}")]
    Rejected(String),
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Descriptive payload stored with each point; returned verbatim by
/// searches so callers can render without a catalog round trip.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PointPayload {
    pub name: String,
    pub brand: Option<String>,
    pub category: Option<String>,
    pub marketing_text: Option<String>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SearchHit {
    pub sku: Sku,
    pub score: f32,
}

/// Embedding search over product records, one point per SKU. The
/// conversational core only calls `search`; `upsert` serves the indexing
/// batch job.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn upsert(
        &self,
        sku: &Sku,
        vector: Vec<f32>,
        payload: PointPayload,
    ) -> Result<(), IndexError>;

    /// Returns hits sorted by descending cosine similarity, already
    /// filtered by `score_threshold` and truncated to `top_k`.
    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>, IndexError>;
}

/// Exact cosine search over an in-process point set. Backs the tests and
/// small deployments; the Qdrant client is the production path.
pub struct InMemoryVectorIndex {
    dimension: usize,
    points: RwLock<Vec<(Sku, Vec<f32>, PointPayload)>>,
}

impl InMemoryVectorIndex {
    pub fn new(dimension: usize) -> Self {
        Self { dimension, points: RwLock::new(Vec::new()) }
    }
}

impl Default for InMemoryVectorIndex {
    fn default() -> Self {
        Self::new(EMBEDDING_DIMENSION)
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn upsert(
        &self,
        sku: &Sku,
        vector: Vec<f32>,
        payload: PointPayload,
    ) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let mut points = self.points.write().await;
        if let Some(existing) = points.iter_mut().find(|(existing, _, _)| existing == sku) {
            existing.1 = vector;
            existing.2 = payload;
        } else {
            points.push((sku.clone(), vector, payload));
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>, IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }

        let points = self.points.read().await;
        let mut hits: Vec<SearchHit> = points
            .iter()
            .map(|(sku, candidate, _)| SearchHit {
                sku: sku.clone(),
                score: cosine_similarity(vector, candidate),
            })
            .filter(|hit| hit.score >= score_threshold)
            .collect();

        hits.sort_by(|left, right| {
            right.score.partial_cmp(&left.score).unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(top_k);
        Ok(hits)
    }
}

fn cosine_similarity(left: &[f32], right: &[f32]) -> f32 {
    let dot: f32 = left.iter().zip(right).map(|(a, b)| a * b).sum();
    let left_norm: f32 = left.iter().map(|a| a * a).sum::<f32>().sqrt();
    let right_norm: f32 = right.iter().map(|b| b * b).sum::<f32>().sqrt();
    if left_norm == 0.0 || right_norm == 0.0 {
        return 0.0;
    }
    dot / (left_norm * right_norm)
}

#[cfg(test)]
mod tests {
    use super::{InMemoryVectorIndex, PointPayload, VectorIndex};
    use ferrobot_core::domain::product::Sku;

    fn unit(index: usize, dimension: usize) -> Vec<f32> {
        let mut vector = vec![0.0; dimension];
        vector[index] = 1.0;
        vector
    }

    #[tokio::test]
    async fn search_sorts_by_similarity_and_applies_threshold() {
        let index = InMemoryVectorIndex::new(4);
        index
            .upsert(&Sku::new("SKU0A"), vec![1.0, 0.0, 0.0, 0.0], PointPayload::default())
            .await
            .expect("upsert");
        index
            .upsert(&Sku::new("SKU0B"), vec![0.8, 0.6, 0.0, 0.0], PointPayload::default())
            .await
            .expect("upsert");
        index
            .upsert(&Sku::new("SKU0C"), unit(3, 4), PointPayload::default())
            .await
            .expect("upsert");

        let hits = index.search(&[1.0, 0.0, 0.0, 0.0], 5, 0.6).await.expect("search");
        let skus: Vec<&str> = hits.iter().map(|hit| hit.sku.as_str()).collect();

        // SKU0C is orthogonal and must fall below the threshold.
        assert_eq!(skus, vec!["SKU0A", "SKU0B"]);
        assert!(hits[0].score > hits[1].score);
    }

    #[tokio::test]
    async fn top_k_truncates_the_hit_list() {
        let index = InMemoryVectorIndex::new(4);
        for (i, sku) in ["SKU0A", "SKU0B", "SKU0C"].iter().enumerate() {
            let mut vector = vec![1.0, 0.0, 0.0, 0.0];
            vector[1] = i as f32 * 0.1;
            index.upsert(&Sku::new(sku), vector, PointPayload::default()).await.expect("upsert");
        }

        let hits = index.search(&[1.0, 0.0, 0.0, 0.0], 2, 0.0).await.expect("search");
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn upsert_replaces_the_existing_point() {
        let index = InMemoryVectorIndex::new(4);
        index
            .upsert(&Sku::new("SKU0A"), unit(0, 4), PointPayload::default())
            .await
            .expect("upsert");
        index
            .upsert(&Sku::new("SKU0A"), unit(1, 4), PointPayload::default())
            .await
            .expect("replace");

        let hits = index.search(&unit(0, 4), 5, 0.5).await.expect("search");
        assert!(hits.is_empty(), "old vector must be gone");

        let hits = index.search(&unit(1, 4), 5, 0.5).await.expect("search");
        assert_eq!(hits.len(), 1);
    }

    #[tokio::test]
    async fn dimension_mismatch_is_rejected() {
        let index = InMemoryVectorIndex::new(4);
        let result = index.search(&[1.0, 0.0], 5, 0.5).await;
        assert!(result.is_err());
    }
}

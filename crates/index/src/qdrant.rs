//! Qdrant REST client. Talks plain HTTP with `reqwest` + `serde_json`.
//! Point ids must be numeric, so each point takes the SKU's digit tail as
//! its id and carries the full SKU in the payload, where searches read it
//! back.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::info;

use ferrobot_core::domain::product::Sku;

use crate::{IndexError, PointPayload, SearchHit, VectorIndex};

pub struct QdrantVectorIndex {
    client: reqwest::Client,
    base_url: String,
    collection: String,
    dimension: usize,
    api_key: Option<SecretString>,
}

impl QdrantVectorIndex {
    pub fn new(
        client: reqwest::Client,
        base_url: impl Into<String>,
        collection: impl Into<String>,
        dimension: usize,
        api_key: Option<SecretString>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            collection: collection.into(),
            dimension,
            api_key,
        }
    }

    /// Creates the collection when missing. Safe to call repeatedly.
    pub async fn ensure_collection(&self) -> Result<(), IndexError> {
        let url = format!("{}/collections/{}", self.base_url, self.collection);

        let existing = self.request(reqwest::Method::GET, &url).send().await;
        if let Ok(response) = existing {
            if response.status().is_success() {
                return Ok(());
            }
        }

        let body = json!({
            "vectors": {
                "size": self.dimension,
                "distance": "Cosine"
            }
        });
        let response = self
            .request(reqwest::Method::PUT, &url)
            .json(&body)
            .send()
            .await
            .map_err(|error| IndexError::Transport(error.to_string()))?;

        let status = response.status();
        let detail = response.text().await.unwrap_or_default();
        if status.is_success() || status.as_u16() == 409 || detail.contains("already exists") {
            info!(
                event_name = "index.collection_ready",
                collection = %self.collection,
                dimension = self.dimension,
                "qdrant collection available"
            );
            Ok(())
        } else {
            Err(IndexError::Rejected(format!("collection create failed ({status}): {detail}")))
        }
    }

    fn request(&self, method: reqwest::Method, url: &str) -> reqwest::RequestBuilder {
        let mut builder = self.client.request(method, url);
        if let Some(api_key) = &self.api_key {
            builder = builder.header("api-key", api_key.expose_secret());
        }
        builder
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl VectorIndex for QdrantVectorIndex {
    async fn upsert(
        &self,
        sku: &Sku,
        vector: Vec<f32>,
        payload: PointPayload,
    ) -> Result<(), IndexError> {
        self.check_dimension(&vector)?;

        let url = format!(
            "{}/collections/{}/points?wait=true",
            self.base_url, self.collection
        );
        let body = json!({
            "points": [{
                "id": point_id(sku),
                "vector": vector,
                "payload": {
                    "sku": sku.as_str(),
                    "name": payload.name,
                    "brand": payload.brand,
                    "category": payload.category,
                    "marketing_text": payload.marketing_text,
                }
            }]
        });

        let response = self
            .request(reqwest::Method::PUT, &url)
            .json(&body)
            .send()
            .await
            .map_err(|error| IndexError::Transport(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(IndexError::Rejected(format!("upsert failed ({status}): {detail}")));
        }
        Ok(())
    }

    async fn search(
        &self,
        vector: &[f32],
        top_k: usize,
        score_threshold: f32,
    ) -> Result<Vec<SearchHit>, IndexError> {
        self.check_dimension(vector)?;

        let url = format!(
            "{}/collections/{}/points/search",
            self.base_url, self.collection
        );
        let body = json!({
            "vector": vector,
            "limit": top_k,
            "score_threshold": score_threshold,
            "with_payload": true,
        });

        let response = self
            .request(reqwest::Method::POST, &url)
            .json(&body)
            .send()
            .await
            .map_err(|error| IndexError::Transport(error.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(IndexError::Rejected(format!("search failed ({status}): {detail}")));
        }

        let parsed: Value = response
            .json()
            .await
            .map_err(|error| IndexError::Transport(error.to_string()))?;

        let hits = parsed["result"]
            .as_array()
            .ok_or_else(|| IndexError::Rejected("search response missing `result`".to_string()))?
            .iter()
            .filter_map(|entry| {
                let sku = entry["payload"]["sku"].as_str()?;
                let score = entry["score"].as_f64()? as f32;
                Some(SearchHit { sku: Sku::new(sku), score })
            })
            .collect();

        Ok(hits)
    }
}

/// Point ids must be unsigned integers (or UUIDs); SKUs carry a stable
/// numeric tail (`SKU00010` -> 10), so that tail is the point id and the
/// full SKU travels in the payload.
fn point_id(sku: &Sku) -> u64 {
    let digits: String =
        sku.as_str().chars().filter(|ch| ch.is_ascii_digit()).collect();
    digits.parse().unwrap_or_else(|_| {
        use std::collections::hash_map::DefaultHasher;
        use std::hash::{Hash, Hasher};
        let mut hasher = DefaultHasher::new();
        sku.as_str().hash(&mut hasher);
        hasher.finish()
    })
}

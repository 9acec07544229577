use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use tokio::sync::RwLock;
use tracing::debug;

use crate::llm::{LlmClient, LlmError};

/// Repeated queries ("taladros", again two turns later) are frequent in
/// chat; cache vectors per normalized-query hash to skip the provider.
const MAX_CACHED_QUERIES: usize = 512;

pub struct EmbeddingService<C> {
    llm: C,
    cache: RwLock<HashMap<u64, Vec<f32>>>,
}

impl<C> EmbeddingService<C>
where
    C: LlmClient,
{
    pub fn new(llm: C) -> Self {
        Self { llm, cache: RwLock::new(HashMap::new()) }
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let key = query_hash(text);

        if let Some(cached) = self.cache.read().await.get(&key) {
            debug!(event_name = "embeddings.cache_hit", "embedding served from cache");
            return Ok(cached.clone());
        }

        let vector = self.llm.embed(text.trim()).await?;

        let mut cache = self.cache.write().await;
        if cache.len() >= MAX_CACHED_QUERIES {
            cache.clear();
        }
        cache.insert(key, vector.clone());
        Ok(vector)
    }

    #[cfg(test)]
    async fn cached_entries(&self) -> usize {
        self.cache.read().await.len()
    }
}

fn query_hash(text: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    text.trim().to_lowercase().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::EmbeddingService;
    use crate::llm::{ChatMessage, LlmClient, LlmError};

    struct CountingLlm {
        embed_calls: Mutex<u32>,
    }

    #[async_trait]
    impl LlmClient for CountingLlm {
        async fn classify(
            &self,
            _system_prompt: &str,
            _messages: &[ChatMessage],
        ) -> Result<String, LlmError> {
            Err(LlmError::Transport("not scripted".to_string()))
        }

        async fn answer(
            &self,
            _system_prompt: &str,
            _question: &str,
        ) -> Result<String, LlmError> {
            Err(LlmError::Transport("not scripted".to_string()))
        }

        async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
            *self.embed_calls.lock().await += 1;
            Ok(vec![text.len() as f32, 1.0, 0.0])
        }
    }

    #[tokio::test]
    async fn repeated_queries_hit_the_cache() {
        let llm = Arc::new(CountingLlm { embed_calls: Mutex::new(0) });
        let service = EmbeddingService::new(llm.clone());

        let first = service.embed("taladros").await.expect("embed");
        let second = service.embed("  Taladros ").await.expect("embed");

        assert_eq!(first, second, "normalization maps both to the same entry");
        assert_eq!(*llm.embed_calls.lock().await, 1);
        assert_eq!(service.cached_entries().await, 1);
    }

    #[tokio::test]
    async fn distinct_queries_each_reach_the_provider() {
        let llm = Arc::new(CountingLlm { embed_calls: Mutex::new(0) });
        let service = EmbeddingService::new(llm.clone());

        service.embed("taladros").await.expect("embed");
        service.embed("martillos").await.expect("embed");

        assert_eq!(*llm.embed_calls.lock().await, 2);
    }
}

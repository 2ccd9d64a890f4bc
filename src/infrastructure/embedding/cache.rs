use crate::application::use_cases::template_library::EmbeddingOracle;
use crate::domain::error::{AppError, Result};
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::debug;

struct EmbeddingCacheEntry {
    vector: Vec<f32>,
    created_at: Instant,
}

/// LRU cache of embedding vectors with TTL
pub struct EmbeddingCache {
    cache: HashMap<String, EmbeddingCacheEntry>,
    max_size: usize,
    ttl: Duration,
    access_order: Vec<String>,
    hits: usize,
    misses: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct EmbeddingCacheStats {
    pub total_entries: usize,
    pub valid_entries: usize,
    pub max_size: usize,
    pub hits: usize,
    pub misses: usize,
    pub hit_rate: f32,
}

impl EmbeddingCache {
    pub fn new(max_size: usize, ttl_secs: u64) -> Self {
        Self {
            cache: HashMap::new(),
            max_size,
            ttl: Duration::from_secs(ttl_secs),
            access_order: Vec::new(),
            hits: 0,
            misses: 0,
        }
    }

    /// SHA-256 over provider, model and text.
    pub fn make_key(provider: &str, model: &str, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(provider.as_bytes());
        hasher.update([0u8]);
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    pub fn get(&mut self, key: &str) -> Option<Vec<f32>> {
        let result = self
            .cache
            .get(key)
            .filter(|entry| entry.created_at.elapsed() < self.ttl)
            .map(|entry| entry.vector.clone());

        if result.is_some() {
            self.hits += 1;
            self.touch(key);
        } else {
            self.misses += 1;
            if self.cache.remove(key).is_some() {
                self.access_order.retain(|k| k != key);
            }
        }
        result
    }

    pub fn put(&mut self, key: String, vector: Vec<f32>) {
        if self.max_size == 0 {
            return;
        }
        if self.cache.contains_key(&key) {
            self.access_order.retain(|k| k != &key);
        }
        while self.cache.len() >= self.max_size && !self.access_order.is_empty() {
            let oldest = self.access_order.remove(0);
            self.cache.remove(&oldest);
        }

        self.cache.insert(
            key.clone(),
            EmbeddingCacheEntry {
                vector,
                created_at: Instant::now(),
            },
        );
        self.access_order.push(key);
    }

    fn touch(&mut self, key: &str) {
        self.access_order.retain(|k| k != key);
        self.access_order.push(key.to_string());
    }

    pub fn clear(&mut self) {
        self.cache.clear();
        self.access_order.clear();
    }

    pub fn stats(&self) -> EmbeddingCacheStats {
        let total_requests = self.hits + self.misses;
        let hit_rate = if total_requests > 0 {
            self.hits as f32 / total_requests as f32
        } else {
            0.0
        };

        let valid_entries = self
            .cache
            .values()
            .filter(|e| e.created_at.elapsed() < self.ttl)
            .count();

        EmbeddingCacheStats {
            total_entries: self.cache.len(),
            valid_entries,
            max_size: self.max_size,
            hits: self.hits,
            misses: self.misses,
            hit_rate,
        }
    }
}

/// Read-through cache in front of another embedding oracle.
pub struct CachedEmbeddings {
    inner: Arc<dyn EmbeddingOracle>,
    provider: String,
    model: String,
    cache: Mutex<EmbeddingCache>,
}

impl CachedEmbeddings {
    pub fn new(
        inner: Arc<dyn EmbeddingOracle>,
        provider: impl Into<String>,
        model: impl Into<String>,
        cache: EmbeddingCache,
    ) -> Self {
        Self {
            inner,
            provider: provider.into(),
            model: model.into(),
            cache: Mutex::new(cache),
        }
    }

    pub fn stats(&self) -> Result<EmbeddingCacheStats> {
        self.cache
            .lock()
            .map(|cache| cache.stats())
            .map_err(|_| AppError::Internal("Embedding cache lock poisoned".to_string()))
    }
}

#[async_trait]
impl EmbeddingOracle for CachedEmbeddings {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let key = EmbeddingCache::make_key(&self.provider, &self.model, text);
        let cached = self
            .cache
            .lock()
            .map_err(|_| AppError::Internal("Embedding cache lock poisoned".to_string()))?
            .get(&key);
        if let Some(vector) = cached {
            debug!("Embedding cache hit");
            return Ok(vector);
        }

        // The lock is not held across the remote call.
        let vector = self.inner.embed(text).await?;
        self.cache
            .lock()
            .map_err(|_| AppError::Internal("Embedding cache lock poisoned".to_string()))?
            .put(key, vector.clone());
        Ok(vector)
    }
}

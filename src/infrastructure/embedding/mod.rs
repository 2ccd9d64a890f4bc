//! Embedding oracle adapters: the HTTP client and its read-through cache.

pub mod cache;
pub mod http;

pub use cache::{CachedEmbeddings, EmbeddingCache, EmbeddingCacheStats};
pub use http::HttpEmbeddingClient;

use crate::application::use_cases::template_library::EmbeddingOracle;
use crate::domain::error::Result;
use crate::infrastructure::config::EmbeddingSettings;
use std::sync::Arc;

/// HTTP client wrapped in the cache when `cache_size > 0`.
pub fn build_embedder(settings: &EmbeddingSettings) -> Result<Arc<dyn EmbeddingOracle>> {
    let client = HttpEmbeddingClient::new(settings.clone())?;
    if settings.cache_size == 0 {
        return Ok(Arc::new(client));
    }
    Ok(Arc::new(CachedEmbeddings::new(
        Arc::new(client),
        settings.provider.as_str(),
        settings.model.clone(),
        EmbeddingCache::new(settings.cache_size, settings.cache_ttl_secs),
    )))
}

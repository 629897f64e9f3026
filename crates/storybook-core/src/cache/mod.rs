mod key;
mod memory;

pub use key::ImageCacheKey;
pub use memory::MemoryCache;

use bytes::Bytes;
use tracing::debug;

use crate::backend::Backend;
use crate::config::CacheConfig;
use crate::error::Result;

/// Cache of downloaded image bytes, shared by preview loading and upload
/// normalization so each remote image is fetched once.
pub struct ImageCache {
    memory: MemoryCache,
}

impl ImageCache {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            memory: MemoryCache::new(config.memory_max_mb, config.memory_ttl_seconds),
        }
    }

    pub async fn get(&self, url: &str) -> Option<Bytes> {
        self.memory.get(ImageCacheKey::from_url(url).as_str()).await
    }

    pub async fn insert(&self, url: &str, bytes: Bytes) {
        self.memory
            .insert(ImageCacheKey::from_url(url).to_string(), bytes)
            .await;
    }

    /// Cached bytes for `url`, downloading through the backend on a miss
    pub async fn get_or_fetch(&self, url: &str, backend: &dyn Backend) -> Result<Bytes> {
        if let Some(bytes) = self.get(url).await {
            debug!("Image cache hit for {}", url);
            return Ok(bytes);
        }

        let bytes = Bytes::from(backend.fetch_image(url).await?);
        self.insert(url, bytes.clone()).await;
        Ok(bytes)
    }

    pub fn clear(&self) {
        self.memory.clear();
    }
}

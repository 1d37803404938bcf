//! In-process cache backend.

use std::time::Duration;

use async_trait::async_trait;
use moka::future::Cache as MokaCache;

use super::{CacheError, CacheKind, CachedFeed, FeedCache};

/// Bounded in-process cache with a uniform TTL.
pub struct MemoryCache {
    entries: MokaCache<String, CachedFeed>,
    ttl: Duration,
}

impl MemoryCache {
    /// Create a cache holding at most `max_capacity` entries for `ttl` each.
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let entries = MokaCache::builder()
            .time_to_live(ttl)
            .max_capacity(max_capacity)
            .build();

        Self { entries, ttl }
    }
}

#[async_trait]
impl FeedCache for MemoryCache {
    async fn get(&self, key: &str) -> Result<Option<CachedFeed>, CacheError> {
        Ok(self.entries.get(key).await)
    }

    async fn set(&self, key: &str, value: CachedFeed) -> Result<(), CacheError> {
        self.entries.insert(key.to_string(), value).await;
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, CacheError> {
        Ok(self.entries.contains_key(key))
    }

    fn kind(&self) -> CacheKind {
        CacheKind::Memory
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

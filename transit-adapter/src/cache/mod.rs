//! Cache for decoded feed messages.
//!
//! Exactly one backend is chosen at startup and held behind [`FeedCache`]:
//! either the shared Redis backend or an in-process bounded cache. There is
//! no fallback between them at runtime; a configured but unreachable Redis
//! makes cache operations fail.
//!
//! Every entry lives for the TTL the backend was constructed with.

mod error;
mod memory;
mod shared;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::AdapterConfig;
use crate::gtfs_rt::FeedMessage;

pub use error::CacheError;
pub use memory::MemoryCache;
pub use shared::RedisCache;

/// Cached value type.
pub type CachedFeed = Arc<FeedMessage>;

/// Which backend a cache is, used as the metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Memory,
    Redis,
}

impl CacheKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheKind::Memory => "memory",
            CacheKind::Redis => "redis",
        }
    }
}

/// Key → decoded feed store with a per-instance TTL.
#[async_trait]
pub trait FeedCache: Send + Sync {
    /// Returns the live entry for `key`, or `None` on a miss or expiry.
    async fn get(&self, key: &str) -> Result<Option<CachedFeed>, CacheError>;

    /// Stores `value` under `key` for the instance TTL, replacing any entry.
    async fn set(&self, key: &str, value: CachedFeed) -> Result<(), CacheError>;

    /// Whether a live entry exists for `key`.
    async fn has(&self, key: &str) -> Result<bool, CacheError>;

    /// The backend type.
    fn kind(&self) -> CacheKind;

    /// The TTL applied to every entry.
    fn ttl(&self) -> Duration;
}

/// Select the cache backend for this process.
pub fn from_config(config: &AdapterConfig) -> Result<Arc<dyn FeedCache>, CacheError> {
    match &config.redis_url {
        Some(url) => Ok(Arc::new(RedisCache::new(url, config.cache_ttl)?)),
        None => Ok(Arc::new(MemoryCache::new(config.cache_max_entries, config.cache_ttl))),
    }
}

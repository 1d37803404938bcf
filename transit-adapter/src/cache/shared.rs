//! Shared Redis cache backend.
//!
//! Values are stored as protobuf-encoded feed messages with a millisecond
//! TTL (`PSETEX`). The connection is established on first use, so an
//! unreachable server surfaces as a failed cache operation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use prost::Message;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;
use tokio::sync::OnceCell;

use crate::gtfs_rt::FeedMessage;

use super::{CacheError, CacheKind, CachedFeed, FeedCache};

/// Redis-backed cache shared between adapter instances.
pub struct RedisCache {
    client: redis::Client,
    connection: OnceCell<ConnectionManager>,
    ttl: Duration,
}

impl RedisCache {
    /// Create a cache for the server at `url`. Does not connect.
    pub fn new(url: &str, ttl: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        Ok(Self {
            client,
            connection: OnceCell::new(),
            ttl,
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, CacheError> {
        let manager = self
            .connection
            .get_or_try_init(|| ConnectionManager::new(self.client.clone()))
            .await?;
        Ok(manager.clone())
    }

    /// TTL in whole milliseconds, never zero (Redis rejects a zero expiry).
    fn ttl_millis(&self) -> u64 {
        (self.ttl.as_millis() as u64).max(1)
    }
}

#[async_trait]
impl FeedCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<CachedFeed>, CacheError> {
        let mut conn = self.connection().await?;
        let bytes: Option<Vec<u8>> = conn.get(key).await?;

        match bytes {
            Some(bytes) => Ok(Some(Arc::new(FeedMessage::decode(bytes.as_slice())?))),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: CachedFeed) -> Result<(), CacheError> {
        let mut conn = self.connection().await?;
        let _: () = conn
            .pset_ex(key, value.encode_to_vec(), self.ttl_millis())
            .await?;
        Ok(())
    }

    async fn has(&self, key: &str) -> Result<bool, CacheError> {
        let mut conn = self.connection().await?;
        Ok(conn.exists(key).await?)
    }

    fn kind(&self) -> CacheKind {
        CacheKind::Redis
    }

    fn ttl(&self) -> Duration {
        self.ttl
    }
}

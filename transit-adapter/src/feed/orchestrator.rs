//! Cache-aware feed fetching.
//!
//! The orchestrator is the request path into upstream feeds: it serves a
//! decoded message from the cache when one is live and otherwise fetches,
//! decodes and stores it. The background refresher uses [`FeedOrchestrator::refresh`]
//! to write fresh messages under the same keys without reading the cache.

use std::sync::Arc;

use crate::cache::{CachedFeed, FeedCache};
use crate::metrics::AdapterMetrics;
use crate::registry::{CredentialStore, FeedEndpoint, resolve_credential};

use super::client::FeedSource;
use super::error::FeedError;

/// Cache key for a feed: URL, credential header and credential value.
///
/// The same URL polled with different credentials gets separate entries.
/// Keys contain the raw credential and must not be logged.
pub fn cache_key(url: &str, header_name: &str, credential: Option<&str>) -> String {
    format!("{url}|{header_name}|{}", credential.unwrap_or(""))
}

/// Fetches feeds through the shared cache.
#[derive(Clone)]
pub struct FeedOrchestrator {
    source: Arc<dyn FeedSource>,
    cache: Arc<dyn FeedCache>,
    credentials: Arc<dyn CredentialStore>,
    metrics: AdapterMetrics,
}

impl FeedOrchestrator {
    pub fn new(
        source: Arc<dyn FeedSource>,
        cache: Arc<dyn FeedCache>,
        credentials: Arc<dyn CredentialStore>,
        metrics: AdapterMetrics,
    ) -> Self {
        Self {
            source,
            cache,
            credentials,
            metrics,
        }
    }

    /// The credential store endpoints are resolved against.
    pub fn credentials(&self) -> &dyn CredentialStore {
        self.credentials.as_ref()
    }

    /// Return the decoded feed for `endpoint`, from cache when live.
    ///
    /// A miss performs exactly one upstream fetch and populates the cache.
    /// Any failure counts toward the fetch-failure metric and is returned.
    pub async fn fetch_and_cache(&self, endpoint: &FeedEndpoint) -> Result<CachedFeed, FeedError> {
        let result = self.cached_or_fetch(endpoint).await;
        if result.is_err() {
            self.metrics.fetch_failures.inc();
        }
        result
    }

    async fn cached_or_fetch(&self, endpoint: &FeedEndpoint) -> Result<CachedFeed, FeedError> {
        let credential = resolve_credential(self.credentials.as_ref(), endpoint).await;
        let key = cache_key(
            &endpoint.url,
            &endpoint.credential_header_name,
            credential.as_deref(),
        );

        let cached = self.cache.get(&key).await?;
        self.metrics.record_cache_lookup(self.cache.kind(), cached.is_some());
        if let Some(feed) = cached {
            return Ok(feed);
        }

        let feed = {
            let _timer = self.metrics.fetch_duration.start_timer();
            self.source
                .fetch(
                    &endpoint.url,
                    &endpoint.credential_header_name,
                    credential.as_deref(),
                )
                .await?
        };

        let feed = Arc::new(feed);
        self.cache.set(&key, feed.clone()).await?;
        Ok(feed)
    }

    /// Fetch `endpoint` upstream regardless of the cache and store the result.
    ///
    /// Records no request-path metrics; callers measure it themselves.
    pub async fn refresh(
        &self,
        endpoint: &FeedEndpoint,
        credential: Option<&str>,
    ) -> Result<CachedFeed, FeedError> {
        let feed = self
            .source
            .fetch(&endpoint.url, &endpoint.credential_header_name, credential)
            .await?;

        let feed = Arc::new(feed);
        let key = cache_key(&endpoint.url, &endpoint.credential_header_name, credential);
        self.cache.set(&key, feed.clone()).await?;
        Ok(feed)
    }
}

//! Application state for the web layer.

use std::sync::Arc;
use std::time::Instant;

use crate::feed::{FeedOrchestrator, MockFeeds};
use crate::metrics::AdapterMetrics;
use crate::registry::FeedRegistry;
use crate::schedule::EnrichmentSource;

/// Shared application state.
///
/// Contains all the services needed to handle requests.
#[derive(Clone)]
pub struct AppState {
    /// Feed endpoints by region and system
    pub registry: Arc<FeedRegistry>,

    /// Cache-aware feed fetching
    pub orchestrator: FeedOrchestrator,

    /// Static-schedule lookups, when configured
    pub enrichment: Option<Arc<dyn EnrichmentSource>>,

    /// Local fixtures for `?mock=1`
    pub mocks: Arc<MockFeeds>,

    /// Process-wide metrics
    pub metrics: AdapterMetrics,

    /// Shared secret for feed endpoints; `None` disables the gate
    pub api_auth_key: Option<Arc<str>>,

    /// Process start, for `/health`
    pub started_at: Instant,
}

impl AppState {
    /// Create a new app state with enrichment and the auth gate disabled.
    pub fn new(
        registry: Arc<FeedRegistry>,
        orchestrator: FeedOrchestrator,
        metrics: AdapterMetrics,
        mocks: MockFeeds,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            enrichment: None,
            mocks: Arc::new(mocks),
            metrics,
            api_auth_key: None,
            started_at: Instant::now(),
        }
    }

    /// Enrich routes from the given schedule source.
    pub fn with_enrichment(mut self, source: Arc<dyn EnrichmentSource>) -> Self {
        self.enrichment = Some(source);
        self
    }

    /// Require `key` on feed endpoints. Empty keys leave the gate disabled.
    pub fn with_api_key(mut self, key: Option<String>) -> Self {
        self.api_auth_key = key.filter(|k| !k.is_empty()).map(Arc::from);
        self
    }
}

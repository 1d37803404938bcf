//! Background feed refresh.
//!
//! On every tick the refresher walks the registry in order, fetching each
//! feed upstream and writing it into the shared cache. A tick that fires
//! while the previous walk is still running does nothing at all.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::feed::FeedOrchestrator;
use crate::metrics::AdapterMetrics;
use crate::registry::{FeedRegistry, resolve_credential};

/// Result of one refresh tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another walk was in flight; nothing was done.
    Skipped,
    /// The registry was walked.
    Completed(RefreshSummary),
}

/// Counts from one completed walk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RefreshSummary {
    pub attempted: usize,
    pub failed: usize,
}

/// Keeps the feed cache warm and reports upstream availability.
pub struct BackgroundRefresher {
    registry: Arc<FeedRegistry>,
    orchestrator: FeedOrchestrator,
    metrics: AdapterMetrics,
    running: AtomicBool,
}

/// Clears the running flag when a walk ends, however it ends.
struct RunningGuard<'a>(&'a AtomicBool);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl BackgroundRefresher {
    pub fn new(
        registry: Arc<FeedRegistry>,
        orchestrator: FeedOrchestrator,
        metrics: AdapterMetrics,
    ) -> Self {
        Self {
            registry,
            orchestrator,
            metrics,
            running: AtomicBool::new(false),
        }
    }

    /// Whether a walk is currently in flight.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run one refresh tick.
    pub async fn tick(&self) -> TickOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return TickOutcome::Skipped;
        }
        let _guard = RunningGuard(&self.running);

        let mut summary = RefreshSummary::default();
        for endpoint in self.registry.list_all() {
            summary.attempted += 1;

            let credential = resolve_credential(self.orchestrator.credentials(), endpoint).await;
            let timer = self
                .metrics
                .refresh_duration
                .with_label_values(&[endpoint.system.as_str()])
                .start_timer();
            let started = Instant::now();

            let result = self
                .orchestrator
                .refresh(endpoint, credential.as_deref())
                .await;
            timer.observe_duration();

            match result {
                Ok(feed) => info!(
                    system = %endpoint.system,
                    region = %endpoint.region,
                    url = %endpoint.url,
                    duration_ms = started.elapsed().as_millis() as u64,
                    entity_count = feed.entity.len(),
                    "transit_adapter.refresh"
                ),
                Err(e) => {
                    summary.failed += 1;
                    self.metrics
                        .refresh_failures
                        .with_label_values(&[endpoint.system.as_str()])
                        .inc();
                    warn!(
                        system = %endpoint.system,
                        region = %endpoint.region,
                        error = %e,
                        "transit_adapter.refresh_error"
                    );
                }
            }
        }

        TickOutcome::Completed(summary)
    }

    /// Start ticking every `interval` on a background task.
    ///
    /// The first tick fires one interval after spawning. Each tick runs on
    /// its own task, so a slow walk never delays the timer; overlapping
    /// ticks are skipped by [`tick`](Self::tick).
    pub fn spawn(self: Arc<Self>, interval: Duration) -> RefreshHandle {
        info!(
            interval_secs = interval.as_secs(),
            feeds = self.registry.len(),
            "starting background feed refresh loop"
        );

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // First tick is immediate, skip it
            loop {
                ticker.tick().await;
                let refresher = self.clone();
                tokio::spawn(async move {
                    refresher.tick().await;
                });
            }
        });

        RefreshHandle { handle }
    }
}

/// Handle to a running refresh loop.
pub struct RefreshHandle {
    handle: JoinHandle<()>,
}

impl RefreshHandle {
    /// Stop the timer. A walk already in flight runs to completion.
    pub fn stop(self) {
        self.handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::MemoryCache;
    use crate::feed::{FeedError, FeedSource};
    use crate::gtfs_rt::{FeedHeader, FeedMessage};
    use crate::registry::{CredentialStore, DEFAULT_CREDENTIAL_HEADER, FeedEndpoint};
    use async_trait::async_trait;
    use std::sync::Mutex;
    use tokio::sync::Notify;

    fn endpoint(system: &str) -> FeedEndpoint {
        FeedEndpoint {
            region: "nyc".to_string(),
            system: system.to_string(),
            url: format!("https://example.test/{system}"),
            credential_env_name: None,
            credential_header_name: DEFAULT_CREDENTIAL_HEADER.to_string(),
            agency_id: None,
        }
    }

    fn empty_feed() -> FeedMessage {
        FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                timestamp: None,
            },
            entity: vec![],
        }
    }

    struct NoCredentials;

    #[async_trait]
    impl CredentialStore for NoCredentials {
        async fn resolve(&self, _name: &str) -> Option<String> {
            None
        }
    }

    /// Records fetched URLs; fails for URLs ending in `fail_suffix`.
    #[derive(Default)]
    struct ScriptedSource {
        fetched: Mutex<Vec<String>>,
        fail_suffix: Option<&'static str>,
        /// When set, every fetch waits for a notification first.
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl FeedSource for ScriptedSource {
        async fn fetch(
            &self,
            url: &str,
            _header_name: &str,
            _credential: Option<&str>,
        ) -> Result<FeedMessage, FeedError> {
            self.fetched.lock().unwrap().push(url.to_string());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            match self.fail_suffix {
                Some(suffix) if url.ends_with(suffix) => Err(FeedError::Status {
                    status: 500,
                    reason: "Internal Server Error".to_string(),
                }),
                _ => Ok(empty_feed()),
            }
        }
    }

    fn refresher(
        systems: &[&str],
        source: Arc<ScriptedSource>,
    ) -> (Arc<BackgroundRefresher>, AdapterMetrics) {
        let metrics = AdapterMetrics::new().unwrap();
        let endpoints = systems.iter().map(|s| endpoint(s)).collect();
        let registry = FeedRegistry::from_endpoints(endpoints);
        let orchestrator = FeedOrchestrator::new(
            source,
            Arc::new(MemoryCache::new(100, Duration::from_secs(60))),
            Arc::new(NoCredentials),
            metrics.clone(),
        );
        let refresher = BackgroundRefresher::new(Arc::new(registry), orchestrator, metrics.clone());
        (Arc::new(refresher), metrics)
    }

    fn refresh_observations(metrics: &AdapterMetrics, system: &str) -> u64 {
        metrics
            .refresh_duration
            .with_label_values(&[system])
            .get_sample_count()
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_the_walk() {
        let source = Arc::new(ScriptedSource {
            fail_suffix: Some("second"),
            ..Default::default()
        });
        let (refresher, metrics) = refresher(&["first", "second", "third"], source.clone());

        let outcome = refresher.tick().await;
        assert_eq!(
            outcome,
            TickOutcome::Completed(RefreshSummary {
                attempted: 3,
                failed: 1
            })
        );

        // Walked sequentially, in registry order.
        assert_eq!(
            *source.fetched.lock().unwrap(),
            vec![
                "https://example.test/first",
                "https://example.test/second",
                "https://example.test/third"
            ]
        );

        let failures = &metrics.refresh_failures;
        assert_eq!(failures.with_label_values(&["second"]).get(), 1);
        assert_eq!(failures.with_label_values(&["first"]).get(), 0);
        assert_eq!(failures.with_label_values(&["third"]).get(), 0);
        assert_eq!(refresh_observations(&metrics, "first"), 1);
        assert_eq!(refresh_observations(&metrics, "third"), 1);

        // Refresh failures are not request-path fetch failures.
        assert_eq!(metrics.fetch_failures.get(), 0);
        assert!(!refresher.is_running());
    }

    #[tokio::test]
    async fn overlapping_tick_is_skipped() {
        let gate = Arc::new(Notify::new());
        let source = Arc::new(ScriptedSource {
            gate: Some(gate.clone()),
            ..Default::default()
        });
        let (refresher, metrics) = refresher(&["only"], source.clone());

        let first = tokio::spawn({
            let refresher = refresher.clone();
            async move { refresher.tick().await }
        });

        // Wait until the first walk is blocked inside its fetch.
        while source.fetched.lock().unwrap().is_empty() {
            tokio::task::yield_now().await;
        }
        assert!(refresher.is_running());

        assert_eq!(refresher.tick().await, TickOutcome::Skipped);
        assert_eq!(source.fetched.lock().unwrap().len(), 1);
        assert_eq!(refresh_observations(&metrics, "only"), 0);

        gate.notify_one();
        let outcome = first.await.unwrap();
        assert_eq!(
            outcome,
            TickOutcome::Completed(RefreshSummary {
                attempted: 1,
                failed: 0
            })
        );
        assert_eq!(refresh_observations(&metrics, "only"), 1);
        assert!(!refresher.is_running());
    }

    #[tokio::test]
    async fn refresh_warms_the_request_cache() {
        let source = Arc::new(ScriptedSource::default());
        let (refresher, _) = refresher(&["only"], source.clone());

        refresher.tick().await;
        refresher
            .orchestrator
            .fetch_and_cache(&endpoint("only"))
            .await
            .unwrap();

        assert_eq!(source.fetched.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn spawned_loop_ticks_on_interval() {
        let source = Arc::new(ScriptedSource::default());
        let (refresher, _) = refresher(&["only"], source.clone());

        let handle = refresher.clone().spawn(Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(source.fetched.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_secs(30)).await;
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert_eq!(source.fetched.lock().unwrap().len(), 1);

        handle.stop();
    }
}

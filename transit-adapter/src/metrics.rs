//! Prometheus metrics for the adapter.
//!
//! One [`AdapterMetrics`] is created at startup and shared by the
//! orchestrator, refresher and HTTP layer. It owns its own registry rather
//! than using the process-global default, so tests can observe a fresh set.

use prometheus::{
    Encoder, Histogram, HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts,
    Registry, TextEncoder,
};

use crate::cache::CacheKind;

/// Histogram buckets (seconds) for upstream fetches.
const FETCH_BUCKETS: &[f64] = &[0.1, 0.5, 1.0, 2.0, 5.0];

/// Process-wide adapter metrics.
#[derive(Clone)]
pub struct AdapterMetrics {
    registry: Registry,

    /// Upstream fetch+decode duration on the request path.
    pub fetch_duration: Histogram,

    /// Failed request-path fetches (network, status, decode or cache).
    pub fetch_failures: IntCounter,

    /// Routes enriched in the most recent feed response.
    pub enriched_routes: IntGauge,

    /// Cache hits, labeled by backend type.
    pub cache_hits: IntCounterVec,

    /// Cache misses, labeled by backend type.
    pub cache_misses: IntCounterVec,

    /// Background refresh duration, labeled by system.
    pub refresh_duration: HistogramVec,

    /// Failed background refreshes, labeled by system.
    pub refresh_failures: IntCounterVec,
}

impl AdapterMetrics {
    /// Create and register every adapter metric in a fresh registry.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let fetch_duration = Histogram::with_opts(
            HistogramOpts::new(
                "transit_adapter_fetch_duration_seconds",
                "Duration of upstream feed fetches",
            )
            .buckets(FETCH_BUCKETS.to_vec()),
        )?;
        let fetch_failures = IntCounter::new(
            "transit_adapter_fetch_failures_total",
            "Number of failed fetch attempts",
        )?;
        let enriched_routes = IntGauge::new(
            "transit_adapter_enriched_routes",
            "Number of enriched routes returned per request",
        )?;
        let cache_hits = IntCounterVec::new(
            Opts::new("transit_adapter_cache_hits_total", "Number of cache hits"),
            &["type"],
        )?;
        let cache_misses = IntCounterVec::new(
            Opts::new("transit_adapter_cache_misses_total", "Number of cache misses"),
            &["type"],
        )?;
        let refresh_duration = HistogramVec::new(
            HistogramOpts::new(
                "transit_adapter_refresh_duration_seconds",
                "Duration of background feed refresh fetches",
            )
            .buckets(FETCH_BUCKETS.to_vec()),
            &["system"],
        )?;
        let refresh_failures = IntCounterVec::new(
            Opts::new(
                "transit_adapter_refresh_failures_total",
                "Number of failed background refresh attempts",
            ),
            &["system"],
        )?;

        registry.register(Box::new(fetch_duration.clone()))?;
        registry.register(Box::new(fetch_failures.clone()))?;
        registry.register(Box::new(enriched_routes.clone()))?;
        registry.register(Box::new(cache_hits.clone()))?;
        registry.register(Box::new(cache_misses.clone()))?;
        registry.register(Box::new(refresh_duration.clone()))?;
        registry.register(Box::new(refresh_failures.clone()))?;

        Ok(Self {
            registry,
            fetch_duration,
            fetch_failures,
            enriched_routes,
            cache_hits,
            cache_misses,
            refresh_duration,
            refresh_failures,
        })
    }

    /// Count a cache lookup.
    pub fn record_cache_lookup(&self, kind: CacheKind, hit: bool) {
        let counter = if hit {
            &self.cache_hits
        } else {
            &self.cache_misses
        };
        counter.with_label_values(&[kind.as_str()]).inc();
    }

    /// Render the registry in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, prometheus::Error> {
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&self.registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }

    /// Content type of [`render`](Self::render) output.
    pub fn content_type(&self) -> String {
        TextEncoder::new().format_type().to_string()
    }
}

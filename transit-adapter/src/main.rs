use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use transit_adapter::cache;
use transit_adapter::config::AdapterConfig;
use transit_adapter::feed::{FeedOrchestrator, HttpFeedClient, MockFeeds};
use transit_adapter::metrics::AdapterMetrics;
use transit_adapter::refresh::BackgroundRefresher;
use transit_adapter::registry::{EnvCredentials, FeedRegistry};
use transit_adapter::schedule::{EnrichmentSource, StaticSchedule};
use transit_adapter::web::{AppState, create_router};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AdapterConfig::from_env();

    let registry = Arc::new(FeedRegistry::load(&config.feeds_path)?);
    info!(feeds = registry.len(), path = ?config.feeds_path, "loaded feed registry");

    let metrics = AdapterMetrics::new()?;

    // Backend is fixed for the life of the process
    let cache = cache::from_config(&config)?;
    info!(
        backend = cache.kind().as_str(),
        ttl_ms = cache.ttl().as_millis() as u64,
        "feed cache enabled"
    );

    let source = Arc::new(HttpFeedClient::new(config.upstream_timeout)?);
    let orchestrator =
        FeedOrchestrator::new(source, cache, Arc::new(EnvCredentials), metrics.clone());

    let mut state = AppState::new(
        registry.clone(),
        orchestrator.clone(),
        metrics.clone(),
        MockFeeds::new(&config.mock_feeds_dir),
    )
    .with_api_key(config.api_auth_key.clone());

    if let Some(dir) = &config.static_gtfs_dir {
        match StaticSchedule::load(dir) {
            Ok(schedule) => {
                info!(trips = schedule.trip_count(), "static schedule loaded");
                let source: Arc<dyn EnrichmentSource> = Arc::new(schedule);
                state = state.with_enrichment(source);
            }
            Err(e) => warn!(error = %e, "static schedule unavailable, routes will not be enriched"),
        }
    }

    let refresh = if config.refresh_active() {
        let refresher = Arc::new(BackgroundRefresher::new(registry, orchestrator, metrics));
        Some(refresher.spawn(config.refresh_interval))
    } else {
        info!(
            enabled = config.refresh_enabled,
            under_test = config.under_test,
            "background feed refresh disabled"
        );
        None
    };

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    info!(addr = %config.bind_addr, "transit adapter listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    if let Some(handle) = refresh {
        handle.stop();
    }

    Ok(())
}

/// Log to stderr, as JSON when `LOG_FORMAT=json`.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v == "json");

    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

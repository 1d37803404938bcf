//! Runtime configuration.
//!
//! Everything the adapter needs is read from the environment once, in
//! `main`, and handed to components as constructor arguments.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

/// Default listen port.
const DEFAULT_PORT: u16 = 3001;

/// Default cache TTL (10 seconds).
const DEFAULT_CACHE_TTL_MS: u64 = 10_000;

/// Default bound on the in-process cache.
const DEFAULT_CACHE_MAX_ENTRIES: u64 = 100;

/// Default refresh tick interval.
const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 30;

/// Default upstream request timeout.
const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 30;

/// Configuration for the transit adapter.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    /// Address the HTTP server binds to.
    pub bind_addr: SocketAddr,

    /// Path to the feed-registry document.
    pub feeds_path: PathBuf,

    /// Directory of mock fixtures, one `{system}.json` per system.
    pub mock_feeds_dir: PathBuf,

    /// Importer output used for enrichment. `None` disables enrichment.
    pub static_gtfs_dir: Option<PathBuf>,

    /// Shared cache backend. `None` selects the in-process cache.
    pub redis_url: Option<String>,

    /// TTL applied to every cache entry.
    pub cache_ttl: Duration,

    /// Maximum entries held by the in-process cache.
    pub cache_max_entries: u64,

    /// Shared secret for the feed endpoints. `None` disables the gate.
    pub api_auth_key: Option<String>,

    /// Background refresh feature flag.
    pub refresh_enabled: bool,

    /// Interval between refresh ticks.
    pub refresh_interval: Duration,

    /// Whether the process is running under test.
    pub under_test: bool,

    /// Re-enables the refresher while under test.
    pub test_enable_refresh: bool,

    /// Timeout for a single upstream feed request.
    pub upstream_timeout: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), DEFAULT_PORT),
            feeds_path: PathBuf::from("config/feeds.json"),
            mock_feeds_dir: PathBuf::from("config/mock-feeds"),
            static_gtfs_dir: None,
            redis_url: None,
            cache_ttl: Duration::from_millis(DEFAULT_CACHE_TTL_MS),
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            api_auth_key: None,
            refresh_enabled: true,
            refresh_interval: Duration::from_secs(DEFAULT_REFRESH_INTERVAL_SECS),
            under_test: false,
            test_enable_refresh: false,
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECS),
        }
    }
}

impl AdapterConfig {
    /// Build a config from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build a config from an arbitrary variable lookup.
    ///
    /// Unset or empty variables keep their defaults; malformed numbers do too.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let defaults = Self::default();

        let ip = var("BIND_ADDR")
            .and_then(|v| v.parse::<IpAddr>().ok())
            .unwrap_or(defaults.bind_addr.ip());
        let port = var("PORT")
            .and_then(|v| v.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);

        let number = |name: &str, default: u64| {
            var(name)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };

        Self {
            bind_addr: SocketAddr::new(ip, port),
            feeds_path: var("FEEDS_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.feeds_path),
            mock_feeds_dir: var("MOCK_FEEDS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.mock_feeds_dir),
            static_gtfs_dir: var("STATIC_GTFS_DIR").map(PathBuf::from),
            redis_url: var("REDIS_URL"),
            cache_ttl: Duration::from_millis(number("CACHE_TTL_MS", DEFAULT_CACHE_TTL_MS)),
            cache_max_entries: number("CACHE_MAX_ENTRIES", DEFAULT_CACHE_MAX_ENTRIES),
            api_auth_key: var("API_AUTH_KEY"),
            // Only the literal "false" turns the loop off.
            refresh_enabled: var("FEED_REFRESH_ENABLED").as_deref() != Some("false"),
            refresh_interval: Duration::from_secs(
                number("FEED_REFRESH_INTERVAL_SEC", DEFAULT_REFRESH_INTERVAL_SECS).max(1),
            ),
            under_test: var("TRANSIT_ADAPTER_ENV").as_deref() == Some("test"),
            test_enable_refresh: var("TEST_ENABLE_REFRESH").as_deref() == Some("1"),
            upstream_timeout: Duration::from_secs(number(
                "UPSTREAM_TIMEOUT_SECS",
                DEFAULT_UPSTREAM_TIMEOUT_SECS,
            )),
        }
    }

    /// Whether the background refresher should run in this process.
    pub fn refresh_active(&self) -> bool {
        self.refresh_enabled && (!self.under_test || self.test_enable_refresh)
    }
}

//! Mock feeds built from local JSON fixtures.
//!
//! A fixture is `{system}.json` in the mock directory and lists routes with
//! the minutes until their next arrival. It is turned into a feed message
//! whose arrivals are relative to the request time, so demos and tests get
//! deterministic statuses without touching the network.

use std::path::PathBuf;

use serde::Deserialize;

use crate::gtfs_rt::{
    FeedEntity, FeedHeader, FeedMessage, StopTimeEvent, StopTimeUpdate, TripDescriptor,
    TripUpdate,
};

/// Minutes used when a fixture route omits `nextArrival` or sets it to 0.
const DEFAULT_MOCK_ARRIVAL_MINS: i64 = 3;

/// Errors loading a mock fixture.
#[derive(Debug, thiserror::Error)]
pub enum MockError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// A mock fixture document.
#[derive(Debug, Clone, Deserialize)]
pub struct MockFixture {
    #[serde(default)]
    pub routes: Vec<MockRoute>,
}

/// One route in a mock fixture.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MockRoute {
    pub id: Option<String>,
    pub name: Option<String>,
    pub next_arrival: Option<i64>,
}

/// Loads fixtures from a directory.
#[derive(Debug, Clone)]
pub struct MockFeeds {
    dir: PathBuf,
}

impl MockFeeds {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Path of the fixture for `system`.
    pub fn fixture_path(&self, system: &str) -> PathBuf {
        self.dir.join(format!("{system}.json"))
    }

    /// Load the fixture for `system`.
    ///
    /// Returns `Ok(None)` when no fixture exists. Systems that would escape
    /// the fixture directory never have one.
    pub async fn load(&self, system: &str) -> Result<Option<MockFixture>, MockError> {
        if !is_plain_name(system) {
            return Ok(None);
        }

        let path = self.fixture_path(system);
        let json = match tokio::fs::read_to_string(&path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(MockError::Io { path, source }),
        };

        serde_json::from_str(&json)
            .map(Some)
            .map_err(|source| MockError::Json { path, source })
    }
}

/// Rejects path separators and parent references in a system name.
fn is_plain_name(system: &str) -> bool {
    !system.is_empty() && !system.contains(['/', '\\']) && system != "." && system != ".."
}

impl MockFixture {
    /// Build a feed message with one trip update per fixture route.
    ///
    /// Each route's single predicted arrival is `now + nextArrival` minutes,
    /// saturating at the ends of the timestamp range.
    pub fn to_feed(&self, now: i64) -> FeedMessage {
        let entity = self
            .routes
            .iter()
            .enumerate()
            .map(|(i, route)| {
                let minutes = route
                    .next_arrival
                    .filter(|&m| m != 0)
                    .unwrap_or(DEFAULT_MOCK_ARRIVAL_MINS);
                FeedEntity {
                    id: route.id.clone().unwrap_or_else(|| format!("m{i}")),
                    trip_update: Some(TripUpdate {
                        trip: TripDescriptor {
                            trip_id: route.id.clone(),
                            route_id: route.name.clone(),
                            ..Default::default()
                        },
                        stop_time_update: vec![StopTimeUpdate {
                            arrival: Some(StopTimeEvent {
                                time: Some(now.saturating_add(minutes.saturating_mul(60))),
                                ..Default::default()
                            }),
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    ..Default::default()
                }
            })
            .collect();

        FeedMessage {
            header: FeedHeader {
                gtfs_realtime_version: "2.0".to_string(),
                timestamp: u64::try_from(now).ok(),
            },
            entity,
        }
    }
}

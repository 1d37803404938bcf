//! Static-schedule lookups used to enrich realtime routes.
//!
//! The schedule importer writes JSON tables into a directory; this module
//! loads them once and answers trip headsign and next-stop queries. The
//! normalizer treats every failure here as "no enrichment".

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use serde::Deserialize;

/// Errors from an enrichment lookup.
#[derive(Debug, thiserror::Error)]
pub enum EnrichmentError {
    #[error("unknown trip: {0}")]
    UnknownTrip(String),

    #[error("failed to read schedule table {table}: {message}")]
    Load { table: &'static str, message: String },
}

/// Source of destination and next-stop names for a trip.
#[async_trait]
pub trait EnrichmentSource: Send + Sync {
    /// The trip's headsign, if it has one.
    async fn trip_headsign(&self, trip_id: &str) -> Result<Option<String>, EnrichmentError>;

    /// Names of up to `count` stops of the trip, in stop-sequence order.
    async fn next_stop_names(
        &self,
        trip_id: &str,
        count: usize,
    ) -> Result<Vec<String>, EnrichmentError>;
}

#[derive(Debug, Clone, Deserialize)]
struct TripRow {
    #[serde(default)]
    trip_headsign: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct StopRow {
    #[serde(default)]
    stop_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct StopTimeRow {
    stop_id: String,
    /// GTFS text files carry numbers as strings; the importer keeps them that way.
    #[serde(default)]
    stop_sequence: Option<serde_json::Value>,
}

impl StopTimeRow {
    fn sequence(&self) -> i64 {
        match &self.stop_sequence {
            Some(serde_json::Value::Number(n)) => n.as_i64().unwrap_or(0),
            Some(serde_json::Value::String(s)) => s.trim().parse().unwrap_or(0),
            _ => 0,
        }
    }
}

/// Schedule tables loaded from the importer's output directory.
#[derive(Debug, Clone, Default)]
pub struct StaticSchedule {
    trips: HashMap<String, TripRow>,
    stops: HashMap<String, StopRow>,
    /// Stop times per trip, sorted by stop sequence.
    stop_times: HashMap<String, Vec<StopTimeRow>>,
}

impl StaticSchedule {
    /// Load `trips.json`, `stops.json` and `stop_times_by_trip.json` from `dir`.
    pub fn load(dir: impl AsRef<Path>) -> Result<Self, EnrichmentError> {
        let dir = dir.as_ref();
        let trips = read_table(dir, "trips.json")?;
        let stops = read_table(dir, "stops.json")?;
        let mut stop_times: HashMap<String, Vec<StopTimeRow>> =
            read_table(dir, "stop_times_by_trip.json")?;

        for rows in stop_times.values_mut() {
            rows.sort_by_key(StopTimeRow::sequence);
        }

        Ok(Self {
            trips,
            stops,
            stop_times,
        })
    }

    pub fn trip_count(&self) -> usize {
        self.trips.len()
    }
}

fn read_table<T: serde::de::DeserializeOwned>(
    dir: &Path,
    table: &'static str,
) -> Result<T, EnrichmentError> {
    let json = std::fs::read_to_string(dir.join(table)).map_err(|e| EnrichmentError::Load {
        table,
        message: e.to_string(),
    })?;
    serde_json::from_str(&json).map_err(|e| EnrichmentError::Load {
        table,
        message: e.to_string(),
    })
}

#[async_trait]
impl EnrichmentSource for StaticSchedule {
    async fn trip_headsign(&self, trip_id: &str) -> Result<Option<String>, EnrichmentError> {
        let trip = self
            .trips
            .get(trip_id)
            .ok_or_else(|| EnrichmentError::UnknownTrip(trip_id.to_string()))?;
        Ok(trip.trip_headsign.clone())
    }

    async fn next_stop_names(
        &self,
        trip_id: &str,
        count: usize,
    ) -> Result<Vec<String>, EnrichmentError> {
        let rows = self
            .stop_times
            .get(trip_id)
            .ok_or_else(|| EnrichmentError::UnknownTrip(trip_id.to_string()))?;

        Ok(rows
            .iter()
            .filter_map(|st| self.stops.get(&st.stop_id)?.stop_name.clone())
            .take(count)
            .collect())
    }
}

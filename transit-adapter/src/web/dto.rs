//! Data transfer objects for web requests and responses.

use serde::{Deserialize, Serialize};

use crate::normalize::{NormalizedAlert, NormalizedRoute};

/// API version reported in feed responses.
pub const API_VERSION: &str = "v1";

/// Query string of a feed request, in order.
///
/// Kept as raw pairs so a repeated parameter is not a rejection; the first
/// occurrence wins.
#[derive(Debug, Default, Deserialize)]
#[serde(transparent)]
pub struct FeedQuery(pub Vec<(String, String)>);

impl FeedQuery {
    /// First value of `name`, if present.
    pub fn first(&self, name: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// `mock=1` or `mock=true` serves the local fixture instead of the upstream feed.
    pub fn is_mock(&self) -> bool {
        matches!(self.first("mock"), Some("1") | Some("true"))
    }

    /// Shared secret passed as `_key`.
    pub fn key(&self) -> Option<&str> {
        self.first("_key")
    }
}

/// Normalized feed response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedResponse {
    pub routes: Vec<NormalizedRoute>,
    pub alerts: Vec<NormalizedAlert>,
    /// RFC 3339 time the response was built
    pub last_modified: String,
    pub version: &'static str,
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub ok: bool,
    /// Seconds since the process started
    pub uptime: f64,
}

/// Error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error message
    pub error: String,
}

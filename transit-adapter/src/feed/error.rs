//! Feed fetch error types.

use crate::cache::CacheError;

/// Errors from fetching, decoding or caching a feed.
#[derive(Debug, thiserror::Error)]
pub enum FeedError {
    /// Network failure (connect, timeout, body read)
    #[error("feed fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with a non-success status
    #[error("feed fetch failed: {status} {reason}")]
    Status { status: u16, reason: String },

    /// The configured credential cannot be sent as a header
    #[error("invalid credential header: {0}")]
    Credential(String),

    /// Payload is not a valid feed message
    #[error("feed decode failed: {0}")]
    Decode(#[from] prost::DecodeError),

    /// The cache backend failed
    #[error(transparent)]
    Cache(#[from] CacheError),
}

//! Upstream feed client and protobuf decoding.

use std::time::Duration;

use async_trait::async_trait;
use prost::Message;
use reqwest::header::{HeaderName, HeaderValue};

use crate::gtfs_rt::FeedMessage;

use super::error::FeedError;

/// Decode a protobuf-encoded feed message.
///
/// Empty input is a valid (empty) message.
pub fn decode(bytes: &[u8]) -> Result<FeedMessage, FeedError> {
    Ok(FeedMessage::decode(bytes)?)
}

/// Fetches and decodes a feed from its upstream, bypassing any cache.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch `url`, sending `credential` in `header_name` when present.
    async fn fetch(
        &self,
        url: &str,
        header_name: &str,
        credential: Option<&str>,
    ) -> Result<FeedMessage, FeedError>;
}

/// HTTP implementation of [`FeedSource`].
#[derive(Debug, Clone)]
pub struct HttpFeedClient {
    http: reqwest::Client,
}

impl HttpFeedClient {
    /// Create a client whose requests time out after `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }
}

#[async_trait]
impl FeedSource for HttpFeedClient {
    async fn fetch(
        &self,
        url: &str,
        header_name: &str,
        credential: Option<&str>,
    ) -> Result<FeedMessage, FeedError> {
        let mut request = self.http.get(url);

        if let Some(credential) = credential {
            let name = HeaderName::from_bytes(header_name.as_bytes())
                .map_err(|_| FeedError::Credential(format!("bad header name {header_name}")))?;
            let value = HeaderValue::from_str(credential)
                .map_err(|_| FeedError::Credential("value is not a valid header".to_string()))?;
            request = request.header(name, value);
        }

        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            return Err(FeedError::Status {
                status: status.as_u16(),
                reason: status.canonical_reason().unwrap_or_default().to_string(),
            });
        }

        let body = response.bytes().await?;
        decode(&body)
    }
}

//! Upstream transit feeds.
//!
//! Fetching and decoding of protobuf feeds, the cache-aware orchestrator on
//! the request path, and local fixtures for mock mode.

mod client;
mod error;
mod mock;
mod orchestrator;

pub use client::{FeedSource, HttpFeedClient, decode};
pub use error::FeedError;
pub use mock::{MockError, MockFeeds, MockFixture, MockRoute};
pub use orchestrator::{FeedOrchestrator, cache_key};

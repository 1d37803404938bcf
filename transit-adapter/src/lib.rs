//! Realtime transit feed adapter.
//!
//! Pulls protobuf transit feeds for many `(region, system)` pairs, decodes
//! and normalizes them into routes and alerts, and serves them over HTTP
//! with a shared cache kept warm by a background refresh loop.

pub mod cache;
pub mod config;
pub mod feed;
pub mod gtfs_rt;
pub mod metrics;
pub mod normalize;
pub mod refresh;
pub mod registry;
pub mod schedule;
pub mod web;

//! Web layer for the transit adapter.
//!
//! Serves normalized feeds, health and Prometheus metrics over HTTP.

mod auth;
mod dto;
mod routes;
mod state;

pub use auth::API_KEY_HEADER;
pub use dto::*;
pub use routes::{AppError, create_router};
pub use state::AppState;

//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::{StatusCode, Uri, header},
    middleware,
    response::{IntoResponse, Response},
    routing::get,
};
use chrono::{SecondsFormat, Utc};
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::feed::FeedError;
use crate::normalize::normalize;
use crate::registry::RegistryError;

use super::auth::require_api_key;
use super::dto::*;
use super::state::AppState;

/// Create the application router.
///
/// Feed endpoints sit behind the shared-secret gate; `/health` and
/// `/metrics` are always open.
pub fn create_router(state: AppState) -> Router {
    let feeds = Router::new()
        .route("/feeds/:region/:file", get(feed))
        .route("/v1/feeds/:region/:file", get(feed))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_api_key));

    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
        .merge(feeds)
        .fallback(not_found)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Health check endpoint.
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}

/// Prometheus scrape endpoint.
async fn metrics(State(state): State<AppState>) -> Result<Response, AppError> {
    let body = state.metrics.render().map_err(|e| AppError::Internal {
        message: e.to_string(),
    })?;

    let content_type = state.metrics.content_type();
    Ok(([(header::CONTENT_TYPE, content_type)], body).into_response())
}

/// Normalized routes and alerts for one feed.
///
/// `file` is `{system}.json`. With `?mock=1` and a fixture for the system,
/// the fixture is served without touching the cache or the network.
async fn feed(
    State(state): State<AppState>,
    Path((region, file)): Path<(String, String)>,
    Query(query): Query<FeedQuery>,
    uri: Uri,
) -> Result<Json<FeedResponse>, AppError> {
    let system = file
        .strip_suffix(".json")
        .ok_or_else(|| AppError::not_found(&uri))?;

    let endpoint = state.registry.lookup(&region, system)?;

    let now = Utc::now();
    let now_secs = now.timestamp();

    let mut mocked = None;
    if query.is_mock() {
        match state.mocks.load(system).await {
            Ok(Some(fixture)) => mocked = Some(Arc::new(fixture.to_feed(now_secs))),
            Ok(None) => {}
            Err(e) => warn!(system, error = %e, "failed to load mock feed"),
        }
    }

    let feed = match mocked {
        Some(feed) => feed,
        None => state.orchestrator.fetch_and_cache(endpoint).await?,
    };

    let normalized = normalize(&feed, system, state.enrichment.as_deref(), now_secs).await;

    let enriched = normalized.enriched_count();
    info!(
        region = %region,
        system,
        enriched_routes = enriched,
        "transit_adapter.enriched"
    );
    state.metrics.enriched_routes.set(enriched as i64);

    Ok(Json(FeedResponse {
        routes: normalized.routes,
        alerts: normalized.alerts,
        last_modified: now.to_rfc3339_opts(SecondsFormat::Millis, true),
        version: API_VERSION,
    }))
}

/// Fallback for unknown endpoints.
async fn not_found(uri: Uri) -> AppError {
    AppError::not_found(&uri)
}

/// Application error type.
#[derive(Debug)]
pub enum AppError {
    Unauthorized,
    NotFound { message: String },
    Internal { message: String },
}

impl AppError {
    /// Unknown endpoint at `uri`.
    fn not_found(uri: &Uri) -> Self {
        AppError::NotFound {
            message: format!("not found: {}", uri.path()),
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::UnknownRegion(_) | RegistryError::UnknownSystem { .. } => {
                AppError::NotFound {
                    message: e.to_string(),
                }
            }
            _ => AppError::Internal {
                message: e.to_string(),
            },
        }
    }
}

impl From<FeedError> for AppError {
    fn from(e: FeedError) -> Self {
        AppError::Internal {
            message: e.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized".to_string()),
            AppError::NotFound { message } => (StatusCode::NOT_FOUND, message),
            AppError::Internal { message } => (StatusCode::INTERNAL_SERVER_ERROR, message),
        };

        if status.is_server_error() {
            error!(%status, error = %message, "adapter error");
        } else {
            debug!(%status, error = %message, "request rejected");
        }

        let body = Json(ErrorResponse { error: message });
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registry_errors_map_to_not_found() {
        let err = AppError::from(RegistryError::UnknownRegion("chicago".into()));
        let AppError::NotFound { message } = err else {
            panic!("expected not found");
        };
        assert_eq!(message, "region not found");

        let err = AppError::from(RegistryError::UnknownSystem {
            region: "nyc".into(),
            system: "path".into(),
        });
        let AppError::NotFound { message } = err else {
            panic!("expected not found");
        };
        assert_eq!(message, "system or feed not found");
    }

    #[test]
    fn feed_errors_map_to_internal_with_message() {
        let err = AppError::from(FeedError::Status {
            status: 503,
            reason: "Service Unavailable".into(),
        });
        let AppError::Internal { message } = err else {
            panic!("expected internal error");
        };
        assert_eq!(message, "feed fetch failed: 503 Service Unavailable");
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            AppError::Unauthorized.into_response().status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            AppError::NotFound {
                message: "x".into()
            }
            .into_response()
            .status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::Internal {
                message: "x".into()
            }
            .into_response()
            .status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}

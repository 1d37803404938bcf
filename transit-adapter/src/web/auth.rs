//! Optional shared-secret gate for feed endpoints.

use axum::{
    extract::{Query, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::dto::FeedQuery;
use super::routes::AppError;
use super::state::AppState;

/// Header carrying the shared secret.
pub const API_KEY_HEADER: &str = "x-adapter-key";

/// Reject requests without the configured secret.
///
/// The secret may be sent in the `x-adapter-key` header or the `_key` query
/// parameter; the header wins when both are present. Without a configured
/// secret every request passes.
pub async fn require_api_key(
    State(state): State<AppState>,
    Query(query): Query<FeedQuery>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_auth_key.as_deref() else {
        return next.run(request).await;
    };

    let provided = request
        .headers()
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|v| !v.is_empty())
        .or(query.key());
    let authorized = provided == Some(expected);

    if authorized {
        next.run(request).await
    } else {
        AppError::Unauthorized.into_response()
    }
}

use crate::AppState;
use axum::{
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

/// GET /:short_key
///
/// 1. Atomically count the visit and look up the target in one round-trip.
/// 2. Return a 301 to the original URL, marked uncacheable so browsers come
///    back through here (and get counted) on every visit.
pub async fn redirect(State(state): State<Arc<AppState>>, Path(short_key): Path<String>) -> Response {
    let resolved = match state.shortener.resolve(&short_key).await {
        Ok(resolved) => resolved,
        Err(e) => return e.into_response(),
    };

    tracing::info!(
        "Redirecting {} to {} (visit {})",
        short_key,
        resolved.long_url,
        resolved.visit_count
    );

    (
        StatusCode::MOVED_PERMANENTLY,
        [
            (header::LOCATION, resolved.long_url),
            (
                header::CACHE_CONTROL,
                "no-store, no-cache, must-revalidate, max-age=0".to_owned(),
            ),
            (header::PRAGMA, "no-cache".to_owned()),
        ],
    )
        .into_response()
}

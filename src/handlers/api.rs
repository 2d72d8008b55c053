use crate::{error::ShortenError, handlers::error_response, models::UrlStats, AppState};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[derive(Deserialize)]
pub struct ShortenRequest {
    url: Option<String>,
}

#[derive(Serialize)]
pub struct ShortenResponse {
    short_url: String,
    short_key: String,
}

/// POST /shorten
///
/// Body: `{"url": "https://..."}`. Responds 201 with the short URL, whether
/// the mapping is new or already existed.
pub async fn shorten(
    State(state): State<Arc<AppState>>,
    payload: Option<Json<ShortenRequest>>,
) -> Response {
    tracing::info!("Received shorten request");

    let url = match payload.and_then(|Json(req)| req.url) {
        Some(url) => url,
        None => {
            tracing::warn!("No URL provided in request");
            return error_response(StatusCode::BAD_REQUEST, "URL is required");
        }
    };

    match state.shortener.shorten(&url).await {
        Ok(short_key) => {
            let body = ShortenResponse {
                short_url: state.config.short_url(&short_key),
                short_key,
            };
            (StatusCode::CREATED, Json(body)).into_response()
        }
        Err(e) => {
            if let ShortenError::InvalidInput(ref msg) = e {
                tracing::warn!("URL shortening rejected: {}", msg);
            }
            e.into_response()
        }
    }
}

/// GET /stats/:short_key
///
/// Read-only; does not count as a visit.
pub async fn stats(
    State(state): State<Arc<AppState>>,
    Path(short_key): Path<String>,
) -> Result<Json<UrlStats>, ShortenError> {
    tracing::info!("Stats request for short key: {}", short_key);
    Ok(Json(state.shortener.stats(&short_key).await?))
}

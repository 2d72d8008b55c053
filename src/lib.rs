//! Hash-based URL shortener.
//!
//! Long URLs are mapped to short hex keys taken from their SHA-256 digest
//! (`keygen`), stored in SQLite with uniqueness on both the key and the URL
//! (`db`, `shortener`), and served over a small JSON/redirect API (`handlers`).

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod keygen;
pub mod models;
pub mod shortener;

pub use error::ShortenError;
pub use shortener::Shortener;

// ── Shared application state ───────────────────────────────────────────────

pub struct AppState {
    pub shortener: Shortener,
    pub config: config::AppConfig,
}

// ── Router ─────────────────────────────────────────────────────────────────

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { axum::http::StatusCode::OK }))
        .route("/shorten", post(handlers::api::shorten))
        .route("/stats/:short_key", get(handlers::api::stats))
        // Short-key redirect; the fixed paths above take priority
        .route("/:short_key", get(handlers::redirect::redirect))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

//! Router assembly.
//!
//! [`build_router`] wires the handlers to their routes with CORS and
//! tracing middleware layers.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

/// Builds the API router.
///
/// CORS is permissive for the browser UI. TraceLayer provides request-level
/// logging via tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/compile", post(handlers::compile::compile_source))
        .route("/generate", post(handlers::generate::generate))
        .route("/refine", post(handlers::generate::refine))
        .route(
            "/generate/documentation",
            post(handlers::analysis::documentation),
        )
        .route("/generate/diagram", post(handlers::analysis::diagram))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

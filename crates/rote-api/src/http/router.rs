//! Axum router configuration with middleware.
//!
//! All routes are under `/api/v1/`. Middleware: CORS and request tracing.

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::http::handlers;
use crate::state::AppState;

pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let api_routes = Router::new()
        .route("/compile", post(handlers::compile::compile_trace))
        .route(
            "/runs",
            get(handlers::runs::list_runs).post(handlers::runs::start_run),
        )
        .route("/runs/{id}/resume", post(handlers::runs::resume_run))
        .route("/runs/{id}/cancel", post(handlers::runs::cancel_run))
        .route("/validate", post(handlers::validate::validate_package));

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

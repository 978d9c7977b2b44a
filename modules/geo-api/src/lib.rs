pub mod rest;
pub mod worker;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};

use geo_audit::RunStore;
use worker::AuditPool;

pub struct AppState {
    pub pool: AuditPool,
    /// Absent when no database is configured; triggered runs are then refused.
    pub store: Option<Arc<dyn RunStore>>,
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(rest::health))
        .route("/audit", post(rest::audit::run_audit))
        .route("/audit/trigger", post(rest::audit::trigger_audit))
        .route("/audit/runs/{id}", get(rest::audit::get_run))
        .route("/crawl", post(rest::page::crawl_page))
        .route("/suggestion", post(rest::page::suggest_page))
        .with_state(state)
        // Dashboard is served from another origin
        .layer(
            tower_http::cors::CorsLayer::new()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(
            tower_http::trace::TraceLayer::new_for_http().make_span_with(
                |request: &axum::http::Request<_>| {
                    tracing::info_span!(
                        "http_request",
                        method = %request.method(),
                        path = %request.uri().path(),
                    )
                },
            ),
        )
}

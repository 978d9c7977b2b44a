use std::sync::Arc;

use axum::{
    extract::State,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};

use geo_common::SiteSnapshot;

use super::audit::{audit_failure, pool_rejection, worker_vanished};
use crate::AppState;

#[derive(Deserialize)]
pub struct CrawlRequest {
    url: String,
}

#[derive(Deserialize)]
pub struct SuggestionRequest {
    /// A snapshot as returned by `/crawl`.
    extracted_from_url: SiteSnapshot,
}

/// Crawl a page and return the raw snapshot, without scoring it.
pub async fn crawl_page(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CrawlRequest>,
) -> Response {
    let ticket = match state.pool.try_admit(None) {
        Ok(t) => t,
        Err(e) => return pool_rejection(e),
    };
    info!(url = %request.url, "Crawl requested");

    let rx = match state.pool.run_crawl(ticket, request.url) {
        Ok(rx) => rx,
        Err(e) => return pool_rejection(e),
    };

    match rx.await {
        Ok(Ok(snapshot)) => Json(json!({
            "message": "Web Crawler",
            "info_website": snapshot,
        }))
        .into_response(),
        Ok(Err(err)) => {
            error!(kind = err.kind(), error = %err, "Crawl failed");
            audit_failure(&err)
        }
        Err(_) => worker_vanished(),
    }
}

/// Rewrite a crawled page for search engines and AI assistants.
pub async fn suggest_page(
    State(state): State<Arc<AppState>>,
    Json(request): Json<SuggestionRequest>,
) -> Response {
    let ticket = match state.pool.try_admit(None) {
        Ok(t) => t,
        Err(e) => return pool_rejection(e),
    };
    let page = request.extracted_from_url;
    info!(url = %page.url, chars = page.markdown_chars(), "Suggestion requested");

    let rx = match state.pool.run_suggestion(ticket, page) {
        Ok(rx) => rx,
        Err(e) => return pool_rejection(e),
    };

    match rx.await {
        Ok(Ok(suggestion)) => Json(json!({
            "message": "Suggestion",
            "company": suggestion,
        }))
        .into_response(),
        Ok(Err(err)) => {
            error!(kind = err.kind(), error = %err, "Suggestion failed");
            audit_failure(&err)
        }
        Err(_) => worker_vanished(),
    }
}

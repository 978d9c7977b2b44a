use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};
use uuid::Uuid;

use geo_audit::TriggerRecord;
use geo_common::{AuditError, AuditOutcome};

use crate::worker::PoolError;
use crate::AppState;

#[derive(Deserialize)]
pub struct AuditRequest {
    url: String,
}

// --- Helpers ---

pub(crate) fn pool_rejection(err: PoolError) -> Response {
    let status = match err {
        PoolError::Full(_) => StatusCode::SERVICE_UNAVAILABLE,
        PoolError::Duplicate(_) => StatusCode::CONFLICT,
        PoolError::Spawn(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };
    warn!(error = %err, "Audit not admitted");
    (status, Json(json!({"error": err.to_string()}))).into_response()
}

pub(crate) fn audit_failure(err: &AuditError) -> Response {
    if err.is_client_error() {
        (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({"error": err.kind(), "detail": err.to_string()})),
        )
            .into_response()
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": err.kind(), "detail": err.diagnostic_trace()})),
        )
            .into_response()
    }
}

pub(crate) fn worker_vanished() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({"error": "InternalError", "detail": "audit worker exited without a result"})),
    )
        .into_response()
}

fn no_store() -> Response {
    (
        StatusCode::SERVICE_UNAVAILABLE,
        Json(json!({"error": "Run store not configured (need DATABASE_URL)"})),
    )
        .into_response()
}

fn outcome_body(outcome: &AuditOutcome) -> Value {
    let mut body = json!({
        "url": outcome.site.url,
        "title": outcome.site.title(),
        "markdown_length": outcome.site.markdown_chars(),
        "json_ld_count": outcome.site.structured_data.len(),
        "llm_report": outcome.synthesis.report_text,
        "score": outcome.geo_score,
        "coherence_score": outcome.coherence.score,
        "coherence_label": outcome.coherence.label,
        "comparison_score": outcome.competitive.score(),
        "best_competitor": outcome.competitive.best_competitor,
    });
    if let (Some(obj), Some(compressed)) =
        (body.as_object_mut(), &outcome.synthesis.compressed_summary)
    {
        obj.insert("llms_txt_compressed".to_string(), json!(compressed));
    }
    body
}

// --- Handlers ---

/// Run an audit and wait for it.
pub async fn run_audit(
    State(state): State<Arc<AppState>>,
    Json(request): Json<AuditRequest>,
) -> Response {
    let ticket = match state.pool.try_admit(None) {
        Ok(t) => t,
        Err(e) => return pool_rejection(e),
    };

    let request_id = Uuid::new_v4();
    info!(%request_id, url = %request.url, "Audit requested");

    let rx = match state.pool.run_sync(ticket, request.url) {
        Ok(rx) => rx,
        Err(e) => return pool_rejection(e),
    };

    match rx.await {
        Ok(Ok(outcome)) => Json(outcome_body(&outcome)).into_response(),
        Ok(Err(err)) => {
            error!(%request_id, kind = err.kind(), error = %err, "Audit failed");
            audit_failure(&err)
        }
        Err(_) => {
            error!(%request_id, "Audit worker exited without a result");
            worker_vanished()
        }
    }
}

/// Accept a `{"record": {"id", "url"}}` trigger and run it in the background.
pub async fn trigger_audit(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<Value>,
) -> Response {
    let record = match TriggerRecord::from_payload(&payload) {
        Ok(r) => r,
        Err(e) => {
            warn!(error = %e, "Rejected trigger payload");
            return (StatusCode::BAD_REQUEST, Json(json!({"error": e.to_string()}))).into_response();
        }
    };

    let Some(store) = state.store.clone() else {
        return no_store();
    };

    let ticket = match state.pool.try_admit(Some(&record.id)) {
        Ok(t) => t,
        Err(e) => return pool_rejection(e),
    };

    let TriggerRecord { id, url } = record;
    info!(run_id = %id, url = %url, "Audit triggered");
    if let Err(e) = state.pool.run_triggered(ticket, store, id.clone(), url) {
        return pool_rejection(e);
    }

    (
        StatusCode::ACCEPTED,
        Json(json!({"status": "accepted", "id": id})),
    )
        .into_response()
}

pub async fn get_run(State(state): State<Arc<AppState>>, Path(id): Path<String>) -> Response {
    let Some(store) = state.store.as_ref() else {
        return no_store();
    };

    match store.find(&id).await {
        Ok(Some(run)) => Json(run).into_response(),
        Ok(None) => StatusCode::NOT_FOUND.into_response(),
        Err(e) => {
            warn!(run_id = %id, error = %e, "Failed to load audit run");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub mod audit;
pub mod page;

use axum::response::{IntoResponse, Json};

pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({"status": "GEO Auditor API is running"}))
}

//! HTTP surface tests driving the router with in-memory collaborators.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use geo_api::worker::AuditPool;
use geo_api::{build_router, AppState};
use geo_audit::synthesizer::reputation_query;
use geo_audit::testing::{FixedEmbedder, MemoryRunStore, MockCrawler, MockGenerator, MockSearcher};
use geo_audit::{GeoAuditor, RunStore};
use geo_common::{EvidenceRecord, RunStatus, SiteSnapshot};

const URL: &str = "https://acme.example";
const REPORT: &str = r#"{"score": 0.85, "llms_txt_content": "Acme: widgets."}"#;

struct Harness {
    state: Arc<AppState>,
    crawler: Arc<MockCrawler>,
    builds: Arc<AtomicUsize>,
}

fn harness(store: Option<Arc<MemoryRunStore>>, capacity: usize) -> Harness {
    harness_with(
        store,
        capacity,
        SiteSnapshot::new(URL, "Acme sells widgets.").with_title("Acme"),
        REPORT,
    )
}

fn harness_with(
    store: Option<Arc<MemoryRunStore>>,
    capacity: usize,
    page: SiteSnapshot,
    reply: &str,
) -> Harness {
    let crawler = Arc::new(MockCrawler::new().on_url(page));
    let searcher = Arc::new(MockSearcher::new().on_query(
        &reputation_query("Acme"),
        vec![EvidenceRecord {
            content: Some("Acme is a widget seller with great reviews.".into()),
            ..Default::default()
        }],
    ));
    let embedder = Arc::new(FixedEmbedder::new(16));
    let generator = Arc::new(MockGenerator::new(reply));
    let builds = Arc::new(AtomicUsize::new(0));

    let factory = {
        let (crawler, builds) = (crawler.clone(), builds.clone());
        move || -> anyhow::Result<GeoAuditor> {
            builds.fetch_add(1, Ordering::SeqCst);
            Ok(GeoAuditor::new(
                crawler.clone(),
                searcher.clone(),
                embedder.clone(),
                generator.clone(),
            ))
        }
    };

    let state = Arc::new(AppState {
        pool: AuditPool::new(Arc::new(factory), capacity),
        store: store.map(|s| s as Arc<dyn RunStore>),
    });

    Harness {
        state,
        crawler,
        builds,
    }
}

async fn send(state: &Arc<AppState>, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(match body {
            Some(b) => Body::from(b.to_string()),
            None => Body::empty(),
        })
        .unwrap();

    let response = build_router(state.clone()).oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

async fn wait_terminal(store: &MemoryRunStore, id: &str) -> RunStatus {
    for _ in 0..200 {
        if let Some(run) = store.get(id) {
            if run.status.is_terminal() {
                return run.status;
            }
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    panic!("run {id} never finished");
}

#[tokio::test]
async fn health_reports_running() {
    let h = harness(None, 1);
    let (status, body) = send(&h.state, "GET", "/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "GEO Auditor API is running");
}

#[tokio::test]
async fn sync_audit_returns_scores_and_report() {
    let h = harness(None, 1);
    let (status, body) = send(&h.state, "POST", "/audit", Some(json!({"url": URL}))).await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["url"], URL);
    assert_eq!(body["title"], "Acme");
    assert_eq!(body["markdown_length"], 19);
    assert_eq!(body["json_ld_count"], 0);
    assert_eq!(body["best_competitor"], "unknown");
    assert_eq!(body["comparison_score"], 0.0);
    assert!(body["coherence_score"].is_number());
    assert!(body["llm_report"].as_str().unwrap().contains("Acme: widgets."));
    assert!(body.get("llms_txt_compressed").is_none());
    assert_eq!(h.state.pool.available(), 1);
}

#[tokio::test]
async fn sync_audit_of_uncrawlable_url_is_client_error() {
    let h = harness(None, 1);
    let (status, body) = send(
        &h.state,
        "POST",
        "/audit",
        Some(json!({"url": "https://empty.example"})),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "CrawlEmptyError");
}

#[tokio::test]
async fn sync_audit_is_refused_when_pool_is_full() {
    let h = harness(None, 1);
    let _held = h.state.pool.try_admit(None).unwrap();

    let (status, _) = send(&h.state, "POST", "/audit", Some(json!({"url": URL}))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(h.builds.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn trigger_missing_url_is_rejected_before_any_work() {
    let store = Arc::new(MemoryRunStore::new().with_pending("run-1", URL));
    let h = harness(Some(store.clone()), 1);

    let (status, body) = send(
        &h.state,
        "POST",
        "/audit/trigger",
        Some(json!({"record": {"id": "run-1"}})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("url"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.builds.load(Ordering::SeqCst), 0);
    assert!(h.crawler.calls().is_empty());
    assert!(store.transitions().is_empty());
}

#[tokio::test]
async fn trigger_missing_id_is_rejected() {
    let h = harness(Some(Arc::new(MemoryRunStore::new())), 1);
    let (status, _) = send(
        &h.state,
        "POST",
        "/audit/trigger",
        Some(json!({"record": {"url": URL}})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn trigger_runs_to_done_in_background() {
    let store = Arc::new(MemoryRunStore::new().with_pending("run-1", URL));
    let h = harness(Some(store.clone()), 1);

    let (status, body) = send(
        &h.state,
        "POST",
        "/audit/trigger",
        Some(json!({"record": {"id": "run-1", "url": URL}})),
    )
    .await;

    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body, json!({"status": "accepted", "id": "run-1"}));

    assert_eq!(wait_terminal(&store, "run-1").await, RunStatus::Done);
    let run = store.get("run-1").unwrap();
    assert_eq!(run.score, Some(85));
    assert!(run.report_payload.is_some());

    let (status, body) = send(&h.state, "GET", "/audit/runs/run-1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "done");
    assert_eq!(body["score"], 85);
}

#[tokio::test]
async fn trigger_for_run_in_flight_conflicts() {
    let store = Arc::new(MemoryRunStore::new().with_pending("run-1", URL));
    let h = harness(Some(store), 2);
    let _in_flight = h.state.pool.try_admit(Some("run-1")).unwrap();

    let (status, _) = send(
        &h.state,
        "POST",
        "/audit/trigger",
        Some(json!({"record": {"id": "run-1", "url": URL}})),
    )
    .await;

    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(h.builds.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn trigger_without_store_is_unavailable() {
    let h = harness(None, 1);
    let (status, _) = send(
        &h.state,
        "POST",
        "/audit/trigger",
        Some(json!({"record": {"id": "run-1", "url": URL}})),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);

    let (status, _) = send(&h.state, "GET", "/audit/runs/run-1", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn unknown_run_is_not_found() {
    let h = harness(Some(Arc::new(MemoryRunStore::new())), 1);
    let (status, _) = send(&h.state, "GET", "/audit/runs/nope", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn markdown_length_counts_characters_not_bytes() {
    let h = harness_with(
        None,
        1,
        SiteSnapshot::new(URL, "Café à Paris, spécialités.").with_title("Acme"),
        REPORT,
    );
    let (status, body) = send(&h.state, "POST", "/audit", Some(json!({"url": URL}))).await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["markdown_length"], 26);
}

#[tokio::test]
async fn crawl_returns_the_snapshot_without_scoring() {
    let h = harness(None, 1);
    let (status, body) = send(&h.state, "POST", "/crawl", Some(json!({"url": URL}))).await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["message"], "Web Crawler");
    assert_eq!(body["info_website"]["url"], URL);
    assert_eq!(body["info_website"]["markdown_content"], "Acme sells widgets.");
    assert_eq!(body["info_website"]["metadata"]["title"], "Acme");
    assert_eq!(h.crawler.calls(), vec![URL.to_string()]);
    assert_eq!(h.state.pool.available(), 1);
}

#[tokio::test]
async fn crawl_of_blank_page_returns_empty_snapshot() {
    let h = harness(None, 1);
    let (status, body) = send(
        &h.state,
        "POST",
        "/crawl",
        Some(json!({"url": "https://empty.example"})),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["info_website"]["markdown_content"], "");
}

#[tokio::test]
async fn crawl_is_refused_when_pool_is_full() {
    let h = harness(None, 1);
    let _held = h.state.pool.try_admit(None).unwrap();

    let (status, _) = send(&h.state, "POST", "/crawl", Some(json!({"url": URL}))).await;

    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(h.crawler.calls().is_empty());
}

const REWRITE: &str = r##"```json
{"url": "https://acme.example", "markdown_content": "# Acme widgets\nHand-made since 1990.",
 "structured_data": [{"@type": "WebPage"}], "metadata": {"title": "Acme widgets, hand-made since 1990"},
 "comment": "The page had no heading."}
```"##;

#[tokio::test]
async fn suggestion_returns_rewritten_page() {
    let h = harness_with(None, 1, SiteSnapshot::new(URL, "Acme sells widgets."), REWRITE);
    let (status, body) = send(
        &h.state,
        "POST",
        "/suggestion",
        Some(json!({"extracted_from_url": {
            "url": URL,
            "markdown_content": "Acme sells widgets.",
            "metadata": {"title": "Acme"}
        }})),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "body: {body}");
    assert_eq!(body["message"], "Suggestion");
    assert_eq!(body["company"]["markdown_content"], "# Acme widgets\nHand-made since 1990.");
    assert_eq!(body["company"]["structured_data"][0]["@type"], "WebPage");
    assert_eq!(body["company"]["comment"], "The page had no heading.");
    assert!(h.crawler.calls().is_empty());
}

#[tokio::test]
async fn suggestion_for_empty_page_is_client_error() {
    let h = harness(None, 1);
    let (status, body) = send(
        &h.state,
        "POST",
        "/suggestion",
        Some(json!({"extracted_from_url": {"url": URL}})),
    )
    .await;

    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["error"], "CrawlEmptyError");
}

#[tokio::test]
async fn suggestion_with_unparseable_reply_is_server_error() {
    let h = harness_with(None, 1, SiteSnapshot::new(URL, "x"), "sorry, no JSON today");
    let (status, body) = send(
        &h.state,
        "POST",
        "/suggestion",
        Some(json!({"extracted_from_url": {"url": URL, "markdown_content": "Acme sells widgets."}})),
    )
    .await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], "MalformedReportError");
}

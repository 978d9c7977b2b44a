//! Integration tests for PgRunStore.
//! Requires a Postgres instance. Set DATABASE_TEST_URL or these tests are skipped.

use geo_audit::store::PgRunStore;
use geo_audit::RunStore;
use geo_common::{RunCompletion, RunStatus};
use sqlx::PgPool;
use uuid::Uuid;

async fn test_store() -> Option<PgRunStore> {
    let url = std::env::var("DATABASE_TEST_URL").ok()?;
    let pool = PgPool::connect(&url).await.ok()?;
    sqlx::raw_sql(include_str!("../../../migrations/0001_audit_runs.sql"))
        .execute(&pool)
        .await
        .ok()?;
    Some(PgRunStore::new(pool))
}

fn fresh_id() -> String {
    format!("test-{}", Uuid::new_v4())
}

#[tokio::test]
async fn run_moves_from_pending_to_done() {
    let Some(store) = test_store().await else {
        return;
    };
    let id = fresh_id();
    store.insert_pending(&id, "https://acme.example").await.unwrap();

    assert_eq!(store.find(&id).await.unwrap().unwrap().status, RunStatus::Pending);

    store.mark_processing(&id).await.unwrap();
    assert_eq!(store.find(&id).await.unwrap().unwrap().status, RunStatus::Processing);

    store
        .mark_done(
            &id,
            &RunCompletion {
                title: "Acme".into(),
                score: Some(85),
                coherence_score: 0.8123,
                comparison_score: 0.4,
                best_competitor: "Globex".into(),
                report_payload: r#"{"score":85}"#.into(),
            },
        )
        .await
        .unwrap();

    let run = store.find(&id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Done);
    assert_eq!(run.score, Some(85));
    assert_eq!(run.coherence_score, Some(0.8123));
    assert_eq!(run.best_competitor.as_deref(), Some("Globex"));
    assert!(run.updated_at >= run.created_at);
}

#[tokio::test]
async fn error_stores_trace_as_payload() {
    let Some(store) = test_store().await else {
        return;
    };
    let id = fresh_id();
    store.insert_pending(&id, "https://acme.example").await.unwrap();
    store.mark_processing(&id).await.unwrap();
    store.mark_error(&id, "CrawlError: boom\n...").await.unwrap();

    let run = store.find(&id).await.unwrap().unwrap();
    assert_eq!(run.status, RunStatus::Error);
    assert_eq!(run.report_payload.as_deref(), Some("CrawlError: boom\n..."));
}

#[tokio::test]
async fn unknown_ids() {
    let Some(store) = test_store().await else {
        return;
    };
    let id = fresh_id();
    assert!(store.find(&id).await.unwrap().is_none());
    assert!(store.mark_processing(&id).await.is_err());
}

// Postgres-backed audit run store over the `audit_runs` table.

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use geo_common::{AuditRun, RunCompletion, RunStatus};

use crate::traits::RunStore;

#[derive(Clone)]
pub struct PgRunStore {
    pool: PgPool,
}

impl PgRunStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Insert a pending run, as the dashboard's storage trigger does.
    pub async fn insert_pending(&self, id: &str, url: &str) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_runs (id, url, status)
            VALUES ($1, $2, 'pending')
            "#,
        )
        .bind(id)
        .bind(url)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn set_status(&self, id: &str, status: RunStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE audit_runs
            SET status = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(status.as_str())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("audit run {id} not found");
        }
        Ok(())
    }
}

#[async_trait]
impl RunStore for PgRunStore {
    async fn find(&self, id: &str) -> Result<Option<AuditRun>> {
        let row = sqlx::query(
            r#"
            SELECT id, url, status, title, score, coherence_score, comparison_score,
                   best_competitor, report_payload, created_at, updated_at
            FROM audit_runs
            WHERE id = $1
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(row_to_audit_run).transpose()
    }

    async fn mark_processing(&self, id: &str) -> Result<()> {
        self.set_status(id, RunStatus::Processing).await
    }

    async fn mark_done(&self, id: &str, completion: &RunCompletion) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE audit_runs
            SET status = 'done',
                title = $2,
                score = $3,
                coherence_score = $4,
                comparison_score = $5,
                best_competitor = $6,
                report_payload = $7,
                updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(&completion.title)
        .bind(completion.score)
        .bind(completion.coherence_score)
        .bind(completion.comparison_score)
        .bind(&completion.best_competitor)
        .bind(&completion.report_payload)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("audit run {id} not found");
        }
        Ok(())
    }

    async fn mark_error(&self, id: &str, trace: &str) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE audit_runs
            SET status = 'error', report_payload = $2, updated_at = now()
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(trace)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            bail!("audit run {id} not found");
        }
        Ok(())
    }
}

fn row_to_audit_run(r: PgRow) -> Result<AuditRun> {
    let status: String = r.try_get("status")?;
    let Some(status) = RunStatus::parse(&status) else {
        bail!("unknown audit run status {status:?}");
    };

    Ok(AuditRun {
        id: r.try_get("id")?,
        url: r.try_get("url")?,
        status,
        title: r.try_get("title")?,
        score: r.try_get("score")?,
        coherence_score: r.try_get("coherence_score")?,
        comparison_score: r.try_get("comparison_score")?,
        best_competitor: r.try_get("best_competitor")?,
        report_payload: r.try_get("report_payload")?,
        created_at: r.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: r.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

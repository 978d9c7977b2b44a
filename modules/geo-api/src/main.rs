use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use geo_api::worker::AuditPool;
use geo_api::{build_router, AppState};
use geo_audit::store::PgRunStore;
use geo_audit::{LiveAuditorFactory, RunStore};
use geo_common::AppConfig;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .json()
        .with_env_filter(EnvFilter::from_default_env().add_directive("geo=info".parse()?))
        .init();

    let config = AppConfig::from_env()?;

    let store: Option<Arc<dyn RunStore>> = match &config.database_url {
        Some(url) => {
            let pool = sqlx::postgres::PgPoolOptions::new()
                .max_connections(10)
                .connect(url)
                .await?;
            info!("Connected to database");

            sqlx::migrate!("../../migrations").run(&pool).await?;
            info!("Migrations complete");

            Some(Arc::new(PgRunStore::new(pool)))
        }
        None => {
            warn!("DATABASE_URL not set, triggered runs are disabled");
            None
        }
    };

    let addr = format!("{}:{}", config.web_host, config.web_port);
    let pool = AuditPool::new(
        Arc::new(LiveAuditorFactory::new(config.clone())),
        config.max_concurrent_audits,
    );
    let state = Arc::new(AppState { pool, store });
    let app = build_router(state);

    info!("GEO Auditor API starting on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

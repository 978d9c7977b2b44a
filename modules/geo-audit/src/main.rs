use std::process::ExitCode;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info, info_span, Instrument};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use geo_audit::{AuditReport, AuditorFactory, LiveAuditorFactory};
use geo_common::{Agreement, AppConfig, AuditOutcome};

/// Run a GEO audit for one website and print the result.
#[derive(Parser, Debug)]
#[command(name = "geo-audit", version)]
struct Cli {
    /// Website to audit.
    url: String,

    /// Print the full outcome as JSON instead of a summary.
    #[arg(long)]
    json: bool,

    /// Abort the audit after this many seconds (overrides AUDIT_TIMEOUT_SECS).
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("geo=info".parse()?))
        .init();

    let cli = Cli::parse();
    let mut config = AppConfig::from_env()?;
    if let Some(secs) = cli.timeout_secs {
        config.audit_timeout = Some(Duration::from_secs(secs));
    }

    let run_id = Uuid::new_v4();
    let auditor = LiveAuditorFactory::new(config).build()?;
    let result = auditor
        .run(&cli.url)
        .instrument(info_span!("audit", %run_id, url = %cli.url))
        .await;
    auditor.close().await;

    match result {
        Ok(outcome) => {
            if cli.json {
                println!("{}", serde_json::to_string_pretty(&outcome)?);
            } else {
                print_summary(&outcome);
            }
            info!(%run_id, "Done");
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            error!(%run_id, kind = e.kind(), "Audit failed");
            eprintln!("{}", e.diagnostic_trace());
            Ok(ExitCode::FAILURE)
        }
    }
}

fn print_summary(outcome: &AuditOutcome) {
    let report = AuditReport::from_value(&outcome.synthesis.report);
    let rule = "─".repeat(60);

    println!("{rule}");
    println!("  GEO AUDIT  {}", outcome.site.url);
    println!("  Title            : {}", outcome.site.title());
    println!("  Markdown chars   : {}", outcome.site.markdown_chars());
    println!("  JSON-LD blocks   : {}", outcome.site.structured_data.len());
    println!("{rule}");
    println!(
        "  Coherence        : {:.4} ({})",
        outcome.coherence.score,
        Agreement::from_score(outcome.coherence.score).label()
    );
    println!(
        "  Competitive gap  : {:.4} vs {}",
        outcome.competitive.score(),
        outcome.competitive.best_competitor
    );
    match outcome.geo_score {
        Some(score) => println!("  GEO score        : {score}/100"),
        None => println!("  GEO score        : n/a"),
    }
    println!("{rule}");

    if !report.critical_analysis.is_empty() {
        println!("\n{}\n", report.critical_analysis);
    }
    for (i, rec) in report.top5_recommendations.iter().enumerate() {
        println!("  {}. {rec}", i + 1);
    }
    if !report.llms_txt_content.is_empty() {
        println!("\n--- llms.txt ---\n{}", report.llms_txt_content);
    }
}

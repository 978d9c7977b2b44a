//! End-to-end audit pipeline tests against in-memory collaborators.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use geo_audit::competitive::leader_query;
use geo_audit::synthesizer::reputation_query;
use geo_audit::testing::{FixedEmbedder, MockCompressor, MockCrawler, MockGenerator, MockSearcher};
use geo_audit::{GeoAuditor, SiteCrawler};
use geo_common::{AuditError, EvidenceRecord, SiteSnapshot};

const URL: &str = "https://acme.example";
const SITE_TEXT: &str = "Acme sells widgets.";
const EVIDENCE_TEXT: &str = "Acme is a widget seller with great reviews.";

const REPORT: &str = r#"Here is the audit:
```json
{
  "score": 0.85,
  "critical_analysis": "Clear offer, thin proof {of reviews}.",
  "top5_recommendations": ["a", "b", "c", "d", "e"],
  "llms_txt_content": "Acme: widgets for every home.",
  "coherence_interpretation": "Strong agreement",
  "comparison_interpretation": "Close to the leader"
}
```"#;

fn acme() -> SiteSnapshot {
    SiteSnapshot::new(URL, SITE_TEXT).with_title("Acme")
}

fn evidence() -> Vec<EvidenceRecord> {
    vec![EvidenceRecord {
        title: None,
        url: None,
        content: Some(EVIDENCE_TEXT.to_string()),
    }]
}

/// Site and evidence are near neighbours; everything else is hash noise.
fn embedder() -> FixedEmbedder {
    FixedEmbedder::new(4)
        .on_text(SITE_TEXT, vec![0.9, 0.3, 0.1, 0.0])
        .on_text(EVIDENCE_TEXT, vec![0.8, 0.4, 0.0, 0.1])
}

struct Fixture {
    crawler: Arc<MockCrawler>,
    searcher: Arc<MockSearcher>,
    embedder: Arc<FixedEmbedder>,
    generator: Arc<MockGenerator>,
}

impl Fixture {
    fn new(crawler: MockCrawler, generator: MockGenerator) -> Self {
        Self {
            crawler: Arc::new(crawler),
            searcher: Arc::new(
                MockSearcher::new()
                    .on_query(&reputation_query("Acme"), evidence())
                    .on_query(
                        &leader_query("Acme"),
                        vec![EvidenceRecord::new("Globex", "https://globex.example", EVIDENCE_TEXT)],
                    ),
            ),
            embedder: Arc::new(embedder()),
            generator: Arc::new(generator),
        }
    }

    fn auditor(&self) -> GeoAuditor {
        GeoAuditor::new(
            self.crawler.clone(),
            self.searcher.clone(),
            self.embedder.clone(),
            self.generator.clone(),
        )
    }
}

#[tokio::test]
async fn same_topic_site_scores_coherent_and_produces_report() {
    let fx = Fixture::new(MockCrawler::new().on_url(acme()), MockGenerator::new(REPORT));
    let compressor = Arc::new(MockCompressor::returning("Acme: widgets."));
    let auditor = fx.auditor().with_compressor(compressor.clone());

    let outcome = auditor.run(URL).await.unwrap();

    assert!(outcome.coherence.score > 0.5, "got {}", outcome.coherence.score);
    assert_eq!(outcome.coherence.label, "strong agreement");
    assert_eq!(outcome.competitive.best_competitor, "Globex");
    assert_eq!(outcome.geo_score, Some(85));
    assert_eq!(outcome.synthesis.report["llms_txt_content"], "Acme: widgets.");
    assert_eq!(outcome.synthesis.compressed_summary.as_deref(), Some("Acme: widgets."));
    assert_eq!(compressor.calls(), 1);
}

#[tokio::test]
async fn crawl_precedes_scoring_and_synthesis() {
    let fx = Fixture::new(MockCrawler::new().on_url(acme()), MockGenerator::new(REPORT));
    fx.auditor().run(URL).await.unwrap();

    assert_eq!(fx.crawler.calls(), vec![URL.to_string()]);
    let queries: Vec<String> = fx.searcher.queries().into_iter().map(|q| q.query).collect();
    assert_eq!(
        queries,
        vec![reputation_query("Acme"), leader_query("Acme"), reputation_query("Acme")]
    );
    assert_eq!(fx.generator.calls(), 1);

    let prompt = fx.generator.last_prompt();
    assert!(prompt[1].content.contains("Globex"));
}

#[tokio::test]
async fn empty_crawl_aborts_before_any_provider_call() {
    let fx = Fixture::new(MockCrawler::new(), MockGenerator::new(REPORT));

    let err = fx.auditor().run(URL).await.unwrap_err();

    assert!(matches!(err, AuditError::CrawlEmpty(_)));
    assert!(err.is_client_error());
    assert!(fx.searcher.queries().is_empty());
    assert_eq!(fx.embedder.calls(), 0);
    assert_eq!(fx.generator.calls(), 0);
}

#[tokio::test]
async fn whitespace_only_markdown_is_still_audited() {
    let fx = Fixture::new(
        MockCrawler::new().on_url(SiteSnapshot::new(URL, " \n\n ").with_title("Acme")),
        MockGenerator::new(REPORT),
    );

    let outcome = fx.auditor().run(URL).await.unwrap();

    assert_eq!(outcome.site.markdown_chars(), 4);
    assert_eq!(fx.generator.calls(), 1);
}

#[tokio::test]
async fn missing_title_uses_fallback_company_name() {
    let fx = Fixture::new(
        MockCrawler::new().on_url(SiteSnapshot::new(URL, SITE_TEXT)),
        MockGenerator::new(REPORT),
    );
    fx.auditor().run(URL).await.unwrap();

    assert_eq!(fx.searcher.queries()[0].query, reputation_query("this company"));
}

#[tokio::test]
async fn malformed_report_fails_the_audit() {
    let fx = Fixture::new(
        MockCrawler::new().on_url(acme()),
        MockGenerator::new(r#"{"score": 80, "critical_analysis": "unterminated"#),
    );

    let err = fx.auditor().run(URL).await.unwrap_err();
    assert_eq!(err.kind(), "MalformedReportError");
    assert!(!err.is_client_error());
}

#[tokio::test]
async fn close_releases_every_collaborator() {
    let fx = Fixture::new(MockCrawler::new().on_url(acme()), MockGenerator::new(REPORT));
    let auditor = fx.auditor();
    auditor.run(URL).await.unwrap();
    auditor.close().await;

    assert!(fx.crawler.is_closed());
    assert!(fx.searcher.is_closed());
    assert!(fx.embedder.is_closed());
    assert!(fx.generator.is_closed());
}

struct HangingCrawler;

#[async_trait]
impl SiteCrawler for HangingCrawler {
    async fn crawl(&self, _url: &str) -> anyhow::Result<SiteSnapshot> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn timeout_turns_a_hung_crawl_into_an_error() {
    let auditor = GeoAuditor::new(
        Arc::new(HangingCrawler),
        Arc::new(MockSearcher::new()),
        Arc::new(embedder()),
        Arc::new(MockGenerator::new(REPORT)),
    )
    .with_timeout(Some(Duration::from_millis(50)));

    let err = auditor.run(URL).await.unwrap_err();
    assert!(matches!(err, AuditError::Timeout(_)));
}

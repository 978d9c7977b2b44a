use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::info;

use geo_common::error::Result;
use geo_common::{AppConfig, AuditError, AuditOutcome, Agreement, SiteSnapshot};

use crate::adapters::{Embedder, Generator, ScaledownCompressor, TavilySearcher};
use crate::coherence::CoherenceEvaluator;
use crate::competitive::CompetitiveGapEvaluator;
use crate::crawler::ChromeCrawler;
use crate::report::AuditReport;
use crate::similarity::SimilarityScorer;
use crate::suggestion::{Suggestion, WebsiteImprover};
use crate::synthesizer::{reputation_query, ReportSynthesizer};
use crate::traits::{
    ContextCompressor, ReportGenerator, SearchQuery, SiteCrawler, TextEmbedder, WebSearcher,
};

/// One audit's worth of collaborators.
///
/// Built per run, used for a single crawl-score-synthesize sequence and then
/// released with [`GeoAuditor::close`].
pub struct GeoAuditor {
    crawler: Arc<dyn SiteCrawler>,
    searcher: Arc<dyn WebSearcher>,
    embedder: Arc<dyn TextEmbedder>,
    generator: Arc<dyn ReportGenerator>,
    compressor: Option<Arc<dyn ContextCompressor>>,
    timeout: Option<Duration>,
}

impl GeoAuditor {
    pub fn new(
        crawler: Arc<dyn SiteCrawler>,
        searcher: Arc<dyn WebSearcher>,
        embedder: Arc<dyn TextEmbedder>,
        generator: Arc<dyn ReportGenerator>,
    ) -> Self {
        Self {
            crawler,
            searcher,
            embedder,
            generator,
            compressor: None,
            timeout: None,
        }
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn ContextCompressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Crawl `url`, score it and synthesize the report.
    pub async fn run(&self, url: &str) -> Result<AuditOutcome> {
        self.limited(self.pipeline(url)).await
    }

    /// Crawl only. A page that rendered to nothing comes back as an empty
    /// snapshot rather than an error.
    pub async fn crawl(&self, url: &str) -> Result<SiteSnapshot> {
        self.limited(async {
            self.crawler
                .crawl(url)
                .await
                .map_err(|e| AuditError::Crawl(format!("{e:#}")))
        })
        .await
    }

    /// Ask the model for an improved version of an already crawled page.
    pub async fn suggest(&self, page: &SiteSnapshot) -> Result<Suggestion> {
        let improver = WebsiteImprover::new(self.generator.clone());
        self.limited(improver.improve(page)).await
    }

    async fn limited<T>(&self, work: impl Future<Output = Result<T>>) -> Result<T> {
        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, work)
                .await
                .map_err(|_| AuditError::Timeout(limit.as_secs()))?,
            None => work.await,
        }
    }

    async fn pipeline(&self, url: &str) -> Result<AuditOutcome> {
        let site = self
            .crawler
            .crawl(url)
            .await
            .map_err(|e| AuditError::Crawl(format!("{e:#}")))?;
        if site.is_empty() {
            return Err(AuditError::CrawlEmpty(url.to_string()));
        }

        let company = site.company_name();
        info!(url, company = %company, chars = site.markdown_chars(), "Site crawled");

        let scorer = SimilarityScorer::new(self.embedder.clone());

        let evidence = self
            .searcher
            .search(&SearchQuery::advanced(reputation_query(&company)))
            .await
            .map_err(AuditError::evidence)?;
        let coherence = CoherenceEvaluator::new(scorer.clone())
            .evaluate(&site, &evidence)
            .await?;
        info!(
            url,
            score = coherence.score,
            interpretation = Agreement::from_score(coherence.score).label(),
            "Coherence"
        );

        let competitive = CompetitiveGapEvaluator::new(self.searcher.clone(), scorer)
            .evaluate(&site, &company)
            .await?;

        let synthesis = ReportSynthesizer::new(
            self.searcher.clone(),
            self.generator.clone(),
            self.compressor.clone(),
        )
        .synthesize(&site, &coherence, &competitive)
        .await?;

        let geo_score = AuditReport::from_value(&synthesis.report).normalized_score();
        info!(url, geo_score = ?geo_score, "Audit complete");

        Ok(AuditOutcome {
            site,
            coherence,
            competitive,
            synthesis,
            geo_score,
        })
    }

    /// Release every collaborator's network handles.
    pub async fn close(self) {
        self.crawler.close().await;
        self.searcher.close().await;
        self.embedder.close().await;
        self.generator.close().await;
        if let Some(compressor) = &self.compressor {
            compressor.close().await;
        }
    }
}

// ---------------------------------------------------------------------------
// Factory
// ---------------------------------------------------------------------------

/// Builds a fresh auditor inside whatever runtime will drive it.
pub trait AuditorFactory: Send + Sync + 'static {
    fn build(&self) -> anyhow::Result<GeoAuditor>;
}

impl<F> AuditorFactory for F
where
    F: Fn() -> anyhow::Result<GeoAuditor> + Send + Sync + 'static,
{
    fn build(&self) -> anyhow::Result<GeoAuditor> {
        self()
    }
}

/// Production wiring: Chrome, Tavily, OpenAI-compatible models, Scaledown.
pub struct LiveAuditorFactory {
    config: AppConfig,
}

impl LiveAuditorFactory {
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl AuditorFactory for LiveAuditorFactory {
    fn build(&self) -> anyhow::Result<GeoAuditor> {
        let c = &self.config;

        let crawler = Arc::new(ChromeCrawler::new(c.chrome_bin.clone()));
        let searcher = Arc::new(TavilySearcher::new(c.tavily_api_key.clone())?);
        let embedder = Arc::new(
            Embedder::new(&c.embedding_api_key, &c.embedding_base_url, &c.embedding_model)
                .context("Failed to build embedder")?,
        );
        let generator = Arc::new(
            Generator::new(&c.gemini_api_key, &c.llm_base_url, &c.llm_model)
                .context("Failed to build generator")?,
        );

        let mut auditor = GeoAuditor::new(crawler, searcher, embedder, generator)
            .with_timeout(c.audit_timeout);
        if let Some(key) = &c.scaledown_api_key {
            auditor = auditor.with_compressor(Arc::new(ScaledownCompressor::new(
                &c.scaledown_base_url,
                key,
                &c.scaledown_model,
            )?));
        }
        Ok(auditor)
    }
}

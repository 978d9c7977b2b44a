// Collaborator seams for the audit pipeline.
//
// Every external service the pipeline talks to sits behind one of these
// traits so runs can be driven end to end with the mocks in `testing`.
// Each collaborator exposes `close` so the auditor can release network
// handles before its runtime is torn down.

use anyhow::Result;
use async_trait::async_trait;

use ai_client::Message;
use geo_common::{AuditRun, EvidenceRecord, RunCompletion, SiteSnapshot};

// ---------------------------------------------------------------------------
// Crawl
// ---------------------------------------------------------------------------

#[async_trait]
pub trait SiteCrawler: Send + Sync {
    /// Render `url` and extract markdown, JSON-LD blocks and metadata.
    /// A page that renders to nothing returns an empty snapshot, not an error.
    async fn crawl(&self, url: &str) -> Result<SiteSnapshot>;

    async fn close(&self) {}
}

// ---------------------------------------------------------------------------
// Search
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchDepth {
    Basic,
    Advanced,
}

impl SearchDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchDepth::Basic => "basic",
            SearchDepth::Advanced => "advanced",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchQuery {
    pub query: String,
    pub depth: SearchDepth,
    pub max_results: Option<u32>,
}

impl SearchQuery {
    pub fn advanced(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            depth: SearchDepth::Advanced,
            max_results: None,
        }
    }

    pub fn with_max_results(mut self, n: u32) -> Self {
        self.max_results = Some(n);
        self
    }
}

#[async_trait]
pub trait WebSearcher: Send + Sync {
    /// Ranked results, best first.
    async fn search(&self, query: &SearchQuery) -> Result<Vec<EvidenceRecord>>;

    async fn close(&self) {}
}

// ---------------------------------------------------------------------------
// Models
// ---------------------------------------------------------------------------

#[async_trait]
pub trait TextEmbedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    async fn close(&self) {}
}

#[async_trait]
pub trait ReportGenerator: Send + Sync {
    /// One completion for the given conversation, returned as raw text.
    async fn generate(&self, messages: &[Message]) -> Result<String>;

    async fn close(&self) {}
}

#[async_trait]
pub trait ContextCompressor: Send + Sync {
    async fn compress(&self, context: &str, question: &str) -> Result<String>;

    async fn close(&self) {}
}

// ---------------------------------------------------------------------------
// Persistence
// ---------------------------------------------------------------------------

#[async_trait]
pub trait RunStore: Send + Sync {
    async fn find(&self, id: &str) -> Result<Option<AuditRun>>;

    async fn mark_processing(&self, id: &str) -> Result<()>;

    async fn mark_done(&self, id: &str, completion: &RunCompletion) -> Result<()>;

    /// Store `trace` in place of the report.
    async fn mark_error(&self, id: &str, trace: &str) -> Result<()>;
}

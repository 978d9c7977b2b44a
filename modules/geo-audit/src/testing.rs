// Deterministic collaborators for driving the audit pipeline in tests.
//
// - MockCrawler (SiteCrawler): URL → SiteSnapshot map, call log
// - MockSearcher (WebSearcher): query → results map, query log
// - FixedEmbedder (TextEmbedder): registered vectors, hash vectors otherwise
// - MockGenerator (ReportGenerator): canned model output
// - MockCompressor (ContextCompressor): fixed output or failure
// - MemoryRunStore (RunStore): in-memory rows plus a transition log
//
// Every mock records `close` so tests can check resources were released.
// MockCrawler and MemoryRunStore can also share an `EventLog` to check the
// order of crawls and status writes against each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;
use chrono::Utc;

use ai_client::Message;
use geo_common::{AuditRun, EvidenceRecord, RunCompletion, RunStatus, SiteSnapshot};

use crate::traits::{
    ContextCompressor, ReportGenerator, RunStore, SearchQuery, SiteCrawler, TextEmbedder,
    WebSearcher,
};

/// Ordered record of events shared between mocks.
pub type EventLog = Arc<Mutex<Vec<String>>>;

/// Standard embedding dimension for test vectors.
pub const TEST_EMBEDDING_DIM: usize = 64;

// ---------------------------------------------------------------------------
// MockCrawler
// ---------------------------------------------------------------------------

/// Returns registered snapshots. Unregistered URLs crawl to an empty page.
#[derive(Default)]
pub struct MockCrawler {
    pages: HashMap<String, SiteSnapshot>,
    calls: Mutex<Vec<String>>,
    log: Option<EventLog>,
    closed: AtomicBool,
}

impl MockCrawler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_url(mut self, snapshot: SiteSnapshot) -> Self {
        self.pages.insert(snapshot.url.clone(), snapshot);
        self
    }

    /// Append `crawl <url>` to `log` on every call.
    pub fn logging_to(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SiteCrawler for MockCrawler {
    async fn crawl(&self, url: &str) -> Result<SiteSnapshot> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(log) = &self.log {
            log.lock().unwrap().push(format!("crawl {url}"));
        }
        Ok(self
            .pages
            .get(url)
            .cloned()
            .unwrap_or_else(|| SiteSnapshot::empty(url)))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockSearcher
// ---------------------------------------------------------------------------

/// Query-string → results map. Unregistered queries return no results.
#[derive(Default)]
pub struct MockSearcher {
    results: HashMap<String, Vec<EvidenceRecord>>,
    queries: Mutex<Vec<SearchQuery>>,
    fail: bool,
    closed: AtomicBool,
}

impl MockSearcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_query(mut self, query: &str, results: Vec<EvidenceRecord>) -> Self {
        self.results.insert(query.to_string(), results);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn queries(&self) -> Vec<SearchQuery> {
        self.queries.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl WebSearcher for MockSearcher {
    async fn search(&self, query: &SearchQuery) -> Result<Vec<EvidenceRecord>> {
        self.queries.lock().unwrap().push(query.clone());
        if self.fail {
            bail!("search provider unavailable");
        }
        let mut results = self.results.get(&query.query).cloned().unwrap_or_default();
        if let Some(max) = query.max_results {
            results.truncate(max as usize);
        }
        Ok(results)
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// FixedEmbedder
// ---------------------------------------------------------------------------

/// Deterministic embedder for testing. Registered texts get exact vectors;
/// unmatched texts get a unique hash-based vector.
pub struct FixedEmbedder {
    vectors: HashMap<String, Vec<f32>>,
    dimension: usize,
    fail: bool,
    calls: AtomicUsize,
    closed: AtomicBool,
}

impl FixedEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            vectors: HashMap::new(),
            dimension,
            fail: false,
            calls: AtomicUsize::new(0),
            closed: AtomicBool::new(false),
        }
    }

    /// Register a text→vector mapping for controlled similarity.
    pub fn on_text(mut self, text: &str, vector: Vec<f32>) -> Self {
        self.vectors.insert(text.to_string(), vector);
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Generate a deterministic hash-based vector for unmatched text.
    fn hash_vector(&self, text: &str) -> Vec<f32> {
        use std::hash::{Hash, Hasher};
        let mut hasher = std::collections::hash_map::DefaultHasher::new();
        text.hash(&mut hasher);
        let seed = hasher.finish();

        let mut vec = vec![0.0f32; self.dimension];
        let mut state = seed;
        for v in vec.iter_mut() {
            // Simple LCG PRNG
            state = state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            *v = ((state >> 33) as f32 / u32::MAX as f32) * 2.0 - 1.0;
        }
        let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for v in vec.iter_mut() {
                *v /= norm;
            }
        }
        vec
    }
}

#[async_trait]
impl TextEmbedder for FixedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            bail!("embedding provider unavailable");
        }
        Ok(self
            .vectors
            .get(text)
            .cloned()
            .unwrap_or_else(|| self.hash_vector(text)))
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockGenerator
// ---------------------------------------------------------------------------

pub struct MockGenerator {
    response: Option<String>,
    calls: AtomicUsize,
    last_prompt: Mutex<Vec<Message>>,
    closed: AtomicBool,
}

impl MockGenerator {
    pub fn new(response: &str) -> Self {
        Self {
            response: Some(response.to_string()),
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn failing() -> Self {
        Self {
            response: None,
            ..Self::new("")
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Vec<Message> {
        self.last_prompt.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReportGenerator for MockGenerator {
    async fn generate(&self, messages: &[Message]) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = messages.to_vec();
        match &self.response {
            Some(r) => Ok(r.clone()),
            None => bail!("model provider unavailable"),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

// ---------------------------------------------------------------------------
// MockCompressor
// ---------------------------------------------------------------------------

pub struct MockCompressor {
    output: Option<String>,
    calls: AtomicUsize,
}

impl MockCompressor {
    pub fn returning(output: &str) -> Self {
        Self {
            output: Some(output.to_string()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            output: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContextCompressor for MockCompressor {
    async fn compress(&self, _context: &str, _question: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.output {
            Some(o) => Ok(o.clone()),
            None => bail!("compression response missing compressed_context"),
        }
    }
}

// ---------------------------------------------------------------------------
// MemoryRunStore
// ---------------------------------------------------------------------------

/// In-memory run table. Writes to unknown ids create the row, mirroring an
/// upsert; `failing_writes` makes every write error.
#[derive(Default)]
pub struct MemoryRunStore {
    runs: Mutex<HashMap<String, AuditRun>>,
    transitions: Mutex<Vec<(String, RunStatus)>>,
    log: Option<EventLog>,
    fail_writes: bool,
}

impl MemoryRunStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_pending(self, id: &str, url: &str) -> Self {
        self.runs
            .lock()
            .unwrap()
            .insert(id.to_string(), AuditRun::pending(id, url));
        self
    }

    /// Append `<status> <id>` to `log` on every successful write.
    pub fn logging_to(mut self, log: EventLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    pub fn get(&self, id: &str) -> Option<AuditRun> {
        self.runs.lock().unwrap().get(id).cloned()
    }

    /// Every status written, in order.
    pub fn transitions(&self) -> Vec<(String, RunStatus)> {
        self.transitions.lock().unwrap().clone()
    }

    fn write(&self, id: &str, status: RunStatus, apply: impl FnOnce(&mut AuditRun)) -> Result<()> {
        if self.fail_writes {
            bail!("database unavailable");
        }
        let mut runs = self.runs.lock().unwrap();
        let run = runs
            .entry(id.to_string())
            .or_insert_with(|| AuditRun::pending(id, ""));
        run.status = status;
        run.updated_at = Utc::now();
        apply(run);
        self.transitions
            .lock()
            .unwrap()
            .push((id.to_string(), status));
        if let Some(log) = &self.log {
            log.lock().unwrap().push(format!("{} {id}", status.as_str()));
        }
        Ok(())
    }
}

#[async_trait]
impl RunStore for MemoryRunStore {
    async fn find(&self, id: &str) -> Result<Option<AuditRun>> {
        Ok(self.get(id))
    }

    async fn mark_processing(&self, id: &str) -> Result<()> {
        self.write(id, RunStatus::Processing, |_| {})
    }

    async fn mark_done(&self, id: &str, completion: &RunCompletion) -> Result<()> {
        let completion = completion.clone();
        self.write(id, RunStatus::Done, move |run| {
            run.title = Some(completion.title);
            run.score = completion.score;
            run.coherence_score = Some(completion.coherence_score);
            run.comparison_score = Some(completion.comparison_score);
            run.best_competitor = Some(completion.best_competitor);
            run.report_payload = Some(completion.report_payload);
        })
    }

    async fn mark_error(&self, id: &str, trace: &str) -> Result<()> {
        self.write(id, RunStatus::Error, |run| {
            run.report_payload = Some(trace.to_string());
        })
    }
}

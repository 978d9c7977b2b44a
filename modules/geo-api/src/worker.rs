// Run isolation: every admitted audit runs on its own OS thread with a
// private current-thread runtime, so browser processes and provider
// connections never share the serving runtime.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use thiserror::Error;
use tokio::sync::{oneshot, OwnedSemaphorePermit, Semaphore};
use tracing::{error, info, warn};

use geo_audit::{process_run, AuditorFactory, GeoAuditor, RunStore, Suggestion};
use geo_common::{AuditError, AuditOutcome, SiteSnapshot};

/// Upper bound on waiting for leftover tasks when a worker runtime shuts down.
const RUNTIME_SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

pub type RunResult = Result<AuditOutcome, AuditError>;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("audit capacity reached ({0} runs in progress)")]
    Full(usize),
    #[error("run {0} is already in progress")]
    Duplicate(String),
    #[error("failed to start audit worker: {0}")]
    Spawn(String),
}

/// A reserved slot in the pool. Dropping it frees the slot and the run id.
pub struct Ticket {
    _permit: OwnedSemaphorePermit,
    key: Option<String>,
    in_flight: Arc<Mutex<HashSet<String>>>,
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if let Some(key) = self.key.take() {
            if let Ok(mut in_flight) = self.in_flight.lock() {
                in_flight.remove(&key);
            }
        }
    }
}

/// One unit of work run against a freshly built auditor on a worker thread.
trait Job: Sized + Send + 'static {
    type Output: Send + 'static;

    async fn run(self, auditor: &GeoAuditor) -> Result<Self::Output, AuditError>;

    /// Called instead of `run` when no auditor could be built.
    async fn abandon(self, _err: &AuditError) {}
}

struct AuditJob {
    url: String,
}

impl Job for AuditJob {
    type Output = AuditOutcome;

    async fn run(self, auditor: &GeoAuditor) -> RunResult {
        auditor.run(&self.url).await
    }
}

struct TriggeredJob {
    store: Arc<dyn RunStore>,
    id: String,
    url: String,
}

impl Job for TriggeredJob {
    type Output = AuditOutcome;

    async fn run(self, auditor: &GeoAuditor) -> RunResult {
        process_run(auditor, self.store.as_ref(), &self.id, &self.url).await
    }

    async fn abandon(self, err: &AuditError) {
        if let Err(write_err) = self.store.mark_error(&self.id, &err.diagnostic_trace()).await {
            error!(run_id = %self.id, error = %write_err, "Failed to persist run error");
        }
    }
}

struct CrawlJob {
    url: String,
}

impl Job for CrawlJob {
    type Output = SiteSnapshot;

    async fn run(self, auditor: &GeoAuditor) -> Result<SiteSnapshot, AuditError> {
        auditor.crawl(&self.url).await
    }
}

struct SuggestionJob {
    page: SiteSnapshot,
}

impl Job for SuggestionJob {
    type Output = Suggestion;

    async fn run(self, auditor: &GeoAuditor) -> Result<Suggestion, AuditError> {
        auditor.suggest(&self.page).await
    }
}

/// Bounded pool of isolated audit workers.
///
/// Admission never waits: beyond `capacity` concurrent runs callers get
/// [`PoolError::Full`] immediately.
pub struct AuditPool {
    factory: Arc<dyn AuditorFactory>,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    capacity: usize,
}

impl AuditPool {
    pub fn new(factory: Arc<dyn AuditorFactory>, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        info!(capacity, "Audit pool initialized");
        Self {
            factory,
            permits: Arc::new(Semaphore::new(capacity)),
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            capacity,
        }
    }

    pub fn available(&self) -> usize {
        self.permits.available_permits()
    }

    /// Reserve a slot, optionally keyed by run id.
    pub fn try_admit(&self, key: Option<&str>) -> Result<Ticket, PoolError> {
        let mut in_flight = self
            .in_flight
            .lock()
            .map_err(|_| PoolError::Spawn("in-flight set poisoned".to_string()))?;

        if let Some(key) = key {
            if in_flight.contains(key) {
                return Err(PoolError::Duplicate(key.to_string()));
            }
        }

        let permit = self
            .permits
            .clone()
            .try_acquire_owned()
            .map_err(|_| PoolError::Full(self.capacity))?;

        if let Some(key) = key {
            in_flight.insert(key.to_string());
        }

        Ok(Ticket {
            _permit: permit,
            key: key.map(String::from),
            in_flight: self.in_flight.clone(),
        })
    }

    /// Run a full audit of `url` and hand back its outcome.
    pub fn run_sync(
        &self,
        ticket: Ticket,
        url: String,
    ) -> Result<oneshot::Receiver<RunResult>, PoolError> {
        self.spawn(ticket, AuditJob { url })
    }

    /// Drive a triggered run through the state machine in `store`.
    pub fn run_triggered(
        &self,
        ticket: Ticket,
        store: Arc<dyn RunStore>,
        id: String,
        url: String,
    ) -> Result<oneshot::Receiver<RunResult>, PoolError> {
        self.spawn(ticket, TriggeredJob { store, id, url })
    }

    /// Crawl `url` without scoring it.
    pub fn run_crawl(
        &self,
        ticket: Ticket,
        url: String,
    ) -> Result<oneshot::Receiver<Result<SiteSnapshot, AuditError>>, PoolError> {
        self.spawn(ticket, CrawlJob { url })
    }

    /// Rewrite an already crawled page.
    pub fn run_suggestion(
        &self,
        ticket: Ticket,
        page: SiteSnapshot,
    ) -> Result<oneshot::Receiver<Result<Suggestion, AuditError>>, PoolError> {
        self.spawn(ticket, SuggestionJob { page })
    }

    fn spawn<J: Job>(
        &self,
        ticket: Ticket,
        job: J,
    ) -> Result<oneshot::Receiver<Result<J::Output, AuditError>>, PoolError> {
        let (tx, rx) = oneshot::channel();
        let factory = self.factory.clone();

        std::thread::Builder::new()
            .name("audit-worker".to_string())
            .spawn(move || {
                let result = run_isolated(factory.as_ref(), job);
                // Slot and run id are free before the caller sees the result.
                drop(ticket);
                if tx.send(result).is_err() {
                    warn!("Audit result dropped, caller went away");
                }
            })
            .map_err(|e| PoolError::Spawn(e.to_string()))?;

        Ok(rx)
    }
}

/// Build a private runtime, run the job, close every collaborator, then
/// shut the runtime down. Only after that does the result leave the thread.
fn run_isolated<J: Job>(factory: &dyn AuditorFactory, job: J) -> Result<J::Output, AuditError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .thread_name("audit-worker")
        .build()
        .map_err(|e| AuditError::Other(anyhow!(e).context("failed to build worker runtime")))?;

    let result = runtime.block_on(async move {
        let auditor = match factory.build() {
            Ok(auditor) => auditor,
            Err(e) => {
                let err = AuditError::Other(e.context("failed to build auditor"));
                job.abandon(&err).await;
                return Err(err);
            }
        };

        let result = job.run(&auditor).await;
        auditor.close().await;
        result
    });

    runtime.shutdown_timeout(RUNTIME_SHUTDOWN_GRACE);
    result
}

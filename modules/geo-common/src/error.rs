use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("Unable to crawl this URL: {0}")]
    CrawlEmpty(String),

    #[error("Crawl error: {0}")]
    Crawl(String),

    #[error("Evidence provider error: {0}")]
    EvidenceProvider(String),

    #[error("Malformed report at line {line}, column {column}: {message} (near `{snippet}`)")]
    MalformedReport {
        message: String,
        line: usize,
        column: usize,
        snippet: String,
    },

    #[error("Compression error: {0}")]
    Compression(String),

    #[error("State write error: {0}")]
    StateWrite(String),

    #[error("Audit timed out after {0}s")]
    Timeout(u64),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AuditError {
    /// Stable identifier for logs and persisted traces.
    pub fn kind(&self) -> &'static str {
        match self {
            AuditError::CrawlEmpty(_) => "CrawlEmptyError",
            AuditError::Crawl(_) => "CrawlError",
            AuditError::EvidenceProvider(_) => "EvidenceProviderError",
            AuditError::MalformedReport { .. } => "MalformedReportError",
            AuditError::Compression(_) => "CompressionError",
            AuditError::StateWrite(_) => "StateWriteError",
            AuditError::Timeout(_) => "TimeoutError",
            AuditError::Other(_) => "InternalError",
        }
    }

    /// Bad input rather than a pipeline failure.
    pub fn is_client_error(&self) -> bool {
        matches!(self, AuditError::CrawlEmpty(_))
    }

    pub fn evidence(err: impl std::fmt::Display) -> Self {
        AuditError::EvidenceProvider(err.to_string())
    }

    /// `{kind}: {message}` followed by the debug chain.
    pub fn diagnostic_trace(&self) -> String {
        format!("{}: {}\n{:?}", self.kind(), self, self)
    }
}

pub type Result<T> = std::result::Result<T, AuditError>;

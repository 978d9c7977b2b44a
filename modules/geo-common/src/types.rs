use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::text::truncate_chars;

/// Characters of site markdown used as the claim side of every comparison.
pub const LEAD_CHARS: usize = 1000;

/// Characters of evidence text kept as an excerpt on a score.
pub const EXCERPT_CHARS: usize = 500;

/// Placeholder for labels and names that could not be determined.
pub const UNKNOWN: &str = "unknown";

/// Fallback company name when the crawl yields no usable title.
pub const FALLBACK_COMPANY: &str = "this company";

// --- Crawl ---

/// What the crawler extracted from the target page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SiteSnapshot {
    pub url: String,
    pub markdown_content: String,
    /// Parsed `application/ld+json` blocks, in page order.
    pub structured_data: Vec<serde_json::Value>,
    pub metadata: BTreeMap<String, Option<String>>,
}

impl SiteSnapshot {
    pub fn new(url: impl Into<String>, markdown_content: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            markdown_content: markdown_content.into(),
            ..Default::default()
        }
    }

    /// Snapshot of a page that rendered but produced no content.
    pub fn empty(url: impl Into<String>) -> Self {
        Self::new(url, "")
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.metadata.insert("title".to_string(), Some(title.into()));
        self
    }

    /// True only for the crawler's failure marker: no markdown at all.
    pub fn is_empty(&self) -> bool {
        self.markdown_content.is_empty()
    }

    /// Length of the markdown in characters, not bytes.
    pub fn markdown_chars(&self) -> usize {
        self.markdown_content.chars().count()
    }

    pub fn meta(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .and_then(|v| v.as_deref())
            .map(str::trim)
            .filter(|v| !v.is_empty())
    }

    /// Page title, or a neutral stand-in when the page has none.
    pub fn company_name(&self) -> String {
        self.meta("title")
            .unwrap_or(FALLBACK_COMPANY)
            .to_string()
    }

    pub fn title(&self) -> &str {
        self.meta("title").unwrap_or("")
    }

    pub fn lead_excerpt(&self) -> &str {
        truncate_chars(&self.markdown_content, LEAD_CHARS)
    }
}

// --- Evidence ---

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EvidenceRecord {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub content: Option<String>,
}

impl EvidenceRecord {
    pub fn new(title: &str, url: &str, content: &str) -> Self {
        Self {
            title: Some(title.to_string()),
            url: Some(url.to_string()),
            content: Some(content.to_string()),
        }
    }

    /// Title, falling back to url.
    pub fn display_name(&self) -> Option<&str> {
        self.title
            .as_deref()
            .filter(|t| !t.trim().is_empty())
            .or_else(|| self.url.as_deref().filter(|u| !u.trim().is_empty()))
    }
}

// --- Scores ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agreement {
    Strong,
    Moderate,
    Weak,
}

impl Agreement {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.7 {
            Agreement::Strong
        } else if score >= 0.4 {
            Agreement::Moderate
        } else {
            Agreement::Weak
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Agreement::Strong => "strong agreement",
            Agreement::Moderate => "moderate agreement",
            Agreement::Weak => "weak agreement",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ScoreResult {
    pub score: f64,
    pub label: String,
    pub excerpt: String,
}

impl ScoreResult {
    /// Score with its agreement band as the label.
    pub fn banded(score: f64, evidence: &str) -> Self {
        Self {
            score,
            label: Agreement::from_score(score).label().to_string(),
            excerpt: truncate_chars(evidence, EXCERPT_CHARS).to_string(),
        }
    }

    /// Zero score for when there was nothing to compare against.
    pub fn no_evidence() -> Self {
        Self {
            score: 0.0,
            label: UNKNOWN.to_string(),
            excerpt: String::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CompetitiveGap {
    #[serde(flatten)]
    pub result: ScoreResult,
    pub best_competitor: String,
}

impl CompetitiveGap {
    pub fn score(&self) -> f64 {
        self.result.score
    }
}

/// Output of the report synthesizer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Synthesis {
    /// Report object re-serialized as JSON text.
    pub report_text: String,
    pub report: serde_json::Value,
    pub compressed_summary: Option<String>,
}

/// Full result of one audit.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditOutcome {
    pub site: SiteSnapshot,
    pub coherence: ScoreResult,
    pub competitive: CompetitiveGap,
    pub synthesis: Synthesis,
    /// Report score on a 0–100 scale, when the report carried one.
    pub geo_score: Option<i32>,
}

// --- Runs ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "pending",
            RunStatus::Processing => "processing",
            RunStatus::Done => "done",
            RunStatus::Error => "error",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(RunStatus::Pending),
            "processing" => Some(RunStatus::Processing),
            "done" => Some(RunStatus::Done),
            "error" => Some(RunStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Done | RunStatus::Error)
    }

    pub fn can_transition_to(&self, next: RunStatus) -> bool {
        matches!(
            (self, next),
            (RunStatus::Pending, RunStatus::Processing)
                | (RunStatus::Processing, RunStatus::Done)
                | (RunStatus::Processing, RunStatus::Error)
                // processing write may have failed
                | (RunStatus::Pending, RunStatus::Done)
                | (RunStatus::Pending, RunStatus::Error)
        )
    }
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Persisted audit run row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AuditRun {
    pub id: String,
    pub url: String,
    pub status: RunStatus,
    pub title: Option<String>,
    /// Report score on a 0–100 scale.
    pub score: Option<i32>,
    pub coherence_score: Option<f64>,
    pub comparison_score: Option<f64>,
    pub best_competitor: Option<String>,
    /// Report text when done, diagnostic trace when errored.
    pub report_payload: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl AuditRun {
    pub fn pending(id: impl Into<String>, url: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            url: url.into(),
            status: RunStatus::Pending,
            title: None,
            score: None,
            coherence_score: None,
            comparison_score: None,
            best_competitor: None,
            report_payload: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Fields written when a run finishes successfully.
#[derive(Debug, Clone, PartialEq)]
pub struct RunCompletion {
    pub title: String,
    pub score: Option<i32>,
    pub coherence_score: f64,
    pub comparison_score: f64,
    pub best_competitor: String,
    pub report_payload: String,
}

impl From<&AuditOutcome> for RunCompletion {
    fn from(outcome: &AuditOutcome) -> Self {
        Self {
            title: outcome.site.title().to_string(),
            score: outcome.geo_score,
            coherence_score: outcome.coherence.score,
            comparison_score: outcome.competitive.score(),
            best_competitor: outcome.competitive.best_competitor.clone(),
            report_payload: outcome.synthesis.report_text.clone(),
        }
    }
}

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use ai_client::Message;
use geo_common::error::Result;
use geo_common::{
    AuditError, CompetitiveGap, EvidenceRecord, ScoreResult, SiteSnapshot, Synthesis,
};

use crate::report::{extract_json_object, REPORT_KEYS};
use crate::traits::{ContextCompressor, ReportGenerator, SearchQuery, WebSearcher};

pub const COMPRESSION_QUESTION: &str =
    "What services, expertise and strengths should an LLM know about this company?";

pub fn reputation_query(company_name: &str) -> String {
    format!("reputation, services, reviews about {company_name}")
}

const SYSTEM_PROMPT: &str = "\
You are a Generative Engine Optimization (GEO) expert. Your job is to analyse \
the content of a small business website so that large language models are as \
likely as possible to cite and recommend it.

You produce two things:
1. An AUDIT: a score from 0 to 100, a critical analysis of strengths and \
weaknesses, and the 5 highest-priority recommendations.
2. An LLMS.TXT file: an ultra-condensed, structured Markdown summary of the \
business written for AI crawlers.

Every string value you write must be in English, whatever the language of the \
website.";

/// Builds the report from crawl data, fresh evidence and both scores.
pub struct ReportSynthesizer {
    searcher: Arc<dyn WebSearcher>,
    generator: Arc<dyn ReportGenerator>,
    compressor: Option<Arc<dyn ContextCompressor>>,
}

impl ReportSynthesizer {
    pub fn new(
        searcher: Arc<dyn WebSearcher>,
        generator: Arc<dyn ReportGenerator>,
        compressor: Option<Arc<dyn ContextCompressor>>,
    ) -> Self {
        Self {
            searcher,
            generator,
            compressor,
        }
    }

    pub async fn synthesize(
        &self,
        site: &SiteSnapshot,
        coherence: &ScoreResult,
        comparison: &CompetitiveGap,
    ) -> Result<Synthesis> {
        let company = site.company_name();
        let evidence = self
            .searcher
            .search(&SearchQuery::advanced(reputation_query(&company)))
            .await
            .map_err(AuditError::evidence)?;

        let messages = build_messages(site, &evidence, coherence, comparison);
        let raw = self
            .generator
            .generate(&messages)
            .await
            .map_err(|e| AuditError::Other(e.context("report generation failed")))?;

        let mut report = extract_json_object(&raw)?;
        info!(url = %site.url, keys = report.len(), "Report extracted");

        let mut compressed_summary = None;
        let llms_txt = report
            .get("llms_txt_content")
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
            .map(String::from);

        if let (Some(compressor), Some(llms_txt)) = (&self.compressor, llms_txt) {
            match compressor.compress(&llms_txt, COMPRESSION_QUESTION).await {
                Ok(compressed) => {
                    info!(
                        url = %site.url,
                        before = llms_txt.len(),
                        after = compressed.len(),
                        "llms.txt compressed"
                    );
                    report.insert(
                        "llms_txt_content".to_string(),
                        Value::String(compressed.clone()),
                    );
                    compressed_summary = Some(compressed);
                }
                Err(e) => {
                    let err = AuditError::Compression(e.to_string());
                    warn!(url = %site.url, error = %err, "Keeping uncompressed llms.txt");
                }
            }
        }

        let report = Value::Object(report);
        let report_text = serde_json::to_string(&report).map_err(anyhow::Error::from)?;

        Ok(Synthesis {
            report_text,
            report,
            compressed_summary,
        })
    }
}

fn build_messages(
    site: &SiteSnapshot,
    evidence: &[EvidenceRecord],
    coherence: &ScoreResult,
    comparison: &CompetitiveGap,
) -> Vec<Message> {
    let structured_data =
        serde_json::to_string(&site.structured_data).unwrap_or_else(|_| "[]".to_string());
    let web_results = serde_json::to_string_pretty(evidence).unwrap_or_else(|_| "[]".to_string());
    let keys = REPORT_KEYS
        .iter()
        .map(|k| format!("\"{k}\""))
        .collect::<Vec<_>>()
        .join(", ");

    let user = format!(
        "Website data:
URL: {url}
STRUCTURED DATA: {structured_data}
MARKDOWN CONTENT: {markdown}

EXTERNAL EVIDENCE (web search):
{web_results}

COHERENCE SCORE (cosine similarity between the site and web sources, 0 to 1): {coherence_score}
A high score (e.g. 0.85) means the site matches its web reputation and earns trust.
A low score (e.g. 0.30) means a strong mismatch, so LLMs may ignore or misquote the site.

COMPARISON SCORE (cosine similarity between the site and the sector leader \"{competitor}\", 0 to 1): {comparison_score}
Leader excerpt: {leader_excerpt}

Reply with a single JSON object and nothing else. Use exactly these keys: {keys}.
\"score\" is an integer from 0 to 100. \"top5_recommendations\" is a list of exactly 5 strings. \
All other values are strings. Write every value in English.",
        url = site.url,
        markdown = site.lead_excerpt(),
        coherence_score = coherence.score,
        competitor = comparison.best_competitor,
        comparison_score = comparison.score(),
        leader_excerpt = comparison.result.excerpt,
    );

    vec![Message::system(SYSTEM_PROMPT), Message::user(user)]
}

use tracing::info;

use geo_common::error::Result;
use geo_common::{EvidenceRecord, ScoreResult, SiteSnapshot};

use crate::similarity::SimilarityScorer;

/// Evidence records consulted for the coherence comparison.
pub const COHERENCE_EVIDENCE_LIMIT: usize = 5;

/// Agreement between what a site says about itself and what the web says about it.
pub struct CoherenceEvaluator {
    scorer: SimilarityScorer,
}

impl CoherenceEvaluator {
    pub fn new(scorer: SimilarityScorer) -> Self {
        Self { scorer }
    }

    pub async fn evaluate(
        &self,
        site: &SiteSnapshot,
        evidence: &[EvidenceRecord],
    ) -> Result<ScoreResult> {
        let evidence_text = evidence_text(evidence);
        if evidence_text.trim().is_empty() {
            info!(url = %site.url, "No evidence content, coherence unknown");
            return Ok(ScoreResult::no_evidence());
        }

        let score = self
            .scorer
            .similarity(site.lead_excerpt(), &evidence_text)
            .await?;

        info!(url = %site.url, score, "Coherence scored");
        Ok(ScoreResult::banded(score, &evidence_text))
    }
}

/// Space-joined content of the first records, skipping those without content.
fn evidence_text(evidence: &[EvidenceRecord]) -> String {
    evidence
        .iter()
        .take(COHERENCE_EVIDENCE_LIMIT)
        .filter_map(|r| r.content.as_deref())
        .collect::<Vec<_>>()
        .join(" ")
}

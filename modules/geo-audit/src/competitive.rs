use std::sync::Arc;

use tracing::info;

use geo_common::error::Result;
use geo_common::{AuditError, CompetitiveGap, ScoreResult, SiteSnapshot, UNKNOWN};

use crate::similarity::SimilarityScorer;
use crate::traits::{SearchQuery, WebSearcher};

/// Results requested when looking for the sector leader.
pub const LEADER_SEARCH_RESULTS: u32 = 5;
/// Top results whose content describes the leader.
pub const LEADER_CONTENT_RESULTS: usize = 3;

pub fn leader_query(company_name: &str) -> String {
    format!("best leading reference competitor in the sector for {company_name}")
}

/// Distance between a site and the top-ranked competitor in its sector.
///
/// Ranking is taken from the search provider as-is; the first result is the
/// leader.
pub struct CompetitiveGapEvaluator {
    searcher: Arc<dyn WebSearcher>,
    scorer: SimilarityScorer,
}

impl CompetitiveGapEvaluator {
    pub fn new(searcher: Arc<dyn WebSearcher>, scorer: SimilarityScorer) -> Self {
        Self { searcher, scorer }
    }

    pub async fn evaluate(&self, site: &SiteSnapshot, company_name: &str) -> Result<CompetitiveGap> {
        let query = SearchQuery::advanced(leader_query(company_name))
            .with_max_results(LEADER_SEARCH_RESULTS);
        let results = self
            .searcher
            .search(&query)
            .await
            .map_err(AuditError::evidence)?;

        let Some(top) = results.first() else {
            info!(company = company_name, "No competitor found");
            return Ok(no_comparable(UNKNOWN));
        };

        let leader = top.display_name().unwrap_or(UNKNOWN).to_string();
        let leader_text = results
            .iter()
            .take(LEADER_CONTENT_RESULTS)
            .filter_map(|r| r.content.as_deref())
            .collect::<Vec<_>>()
            .join(" ");

        if leader_text.trim().is_empty() {
            info!(company = company_name, leader = %leader, "Leader has no content to compare");
            return Ok(no_comparable(&leader));
        }

        let score = self
            .scorer
            .similarity(site.lead_excerpt(), &leader_text)
            .await?;

        info!(company = company_name, leader = %leader, score, "Competitive gap scored");
        Ok(CompetitiveGap {
            result: ScoreResult::banded(score, &leader_text),
            best_competitor: leader,
        })
    }
}

fn no_comparable(leader: &str) -> CompetitiveGap {
    CompetitiveGap {
        result: ScoreResult::no_evidence(),
        best_competitor: leader.to_string(),
    }
}

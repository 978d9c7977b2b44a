use std::sync::Arc;

use tracing::debug;

use geo_common::error::Result;
use geo_common::AuditError;

use crate::traits::TextEmbedder;

/// Cosine similarity between two embedded texts.
#[derive(Clone)]
pub struct SimilarityScorer {
    embedder: Arc<dyn TextEmbedder>,
}

impl SimilarityScorer {
    pub fn new(embedder: Arc<dyn TextEmbedder>) -> Self {
        Self { embedder }
    }

    /// Similarity of `text_a` and `text_b`, clamped to [-1, 1] and rounded to
    /// four decimals. A blank `text_b` scores exactly 0.0 without embedding.
    pub async fn similarity(&self, text_a: &str, text_b: &str) -> Result<f64> {
        if text_b.trim().is_empty() {
            return Ok(0.0);
        }

        let vec_a = self.embedder.embed(text_a).await.map_err(AuditError::evidence)?;
        let vec_b = self.embedder.embed(text_b).await.map_err(AuditError::evidence)?;

        if vec_a.len() != vec_b.len() {
            return Err(AuditError::EvidenceProvider(format!(
                "embedding dimensions differ: {} vs {}",
                vec_a.len(),
                vec_b.len()
            )));
        }

        let score = round4(cosine_similarity(&vec_a, &vec_b).clamp(-1.0, 1.0));
        debug!(score, "Similarity computed");
        Ok(score)
    }
}

/// Cosine similarity between two f32 vectors. Returns 0.0 for zero-norm inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let norm_a: f64 = a.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    let norm_b: f64 = b.iter().map(|x| (*x as f64) * (*x as f64)).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

pub fn round4(x: f64) -> f64 {
    (x * 10_000.0).round() / 10_000.0
}

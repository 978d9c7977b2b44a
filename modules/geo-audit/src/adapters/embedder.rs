use ai_client::{EmbedAgent, OpenAi};
use anyhow::Result;
use async_trait::async_trait;
use tracing::debug;

use super::ClientSlot;
use crate::traits::TextEmbedder;

/// Embeddings through any OpenAI-compatible endpoint.
pub struct Embedder {
    client: ClientSlot<OpenAi>,
    model: String,
}

impl Embedder {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Result<Self> {
        let client = OpenAi::with_endpoint(api_key, model, base_url)?.with_embedding_model(model);
        Ok(Self {
            client: ClientSlot::new("embedding", client),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl TextEmbedder for Embedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        Ok(self.client.get()?.embed(text).await?)
    }

    async fn close(&self) {
        if self.client.release() {
            debug!(model = %self.model, "Embedder closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn closed_embedder_makes_no_requests() {
        let embedder = Embedder::new("key", "http://127.0.0.1:9", "text-embedding-004").unwrap();
        embedder.close().await;

        let err = embedder.embed("hello").await.unwrap_err();
        assert!(err.to_string().contains("closed"));
    }
}

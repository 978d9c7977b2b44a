use ai_client::{ChatAgent, Message, OpenAi};
use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, info};

use super::ClientSlot;
use crate::traits::ReportGenerator;

/// Output budget per completion. Page rewrites echo the whole page back.
const GENERATION_MAX_TOKENS: u32 = 16_000;

/// Report generation through an OpenAI-compatible chat endpoint
/// (Gemini by default). Temperature is pinned to zero.
pub struct Generator {
    client: ClientSlot<OpenAi>,
    model: String,
}

impl Generator {
    pub fn new(api_key: &str, base_url: &str, model: &str) -> Result<Self> {
        let client = OpenAi::with_endpoint(api_key, model, base_url)?
            .with_temperature(Some(0.0))
            .with_max_tokens(GENERATION_MAX_TOKENS);
        Ok(Self {
            client: ClientSlot::new("generation", client),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl ReportGenerator for Generator {
    async fn generate(&self, messages: &[Message]) -> Result<String> {
        let text = self.client.get()?.chat(messages).await?;
        info!(model = %self.model, chars = text.chars().count(), "Completion received");
        Ok(text)
    }

    async fn close(&self) {
        if self.client.release() {
            debug!(model = %self.model, "Generator closed");
        }
    }
}

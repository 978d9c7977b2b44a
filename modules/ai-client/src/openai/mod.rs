mod client;
pub(crate) mod types;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::warn;

use crate::error::{AiError, Result};
use crate::traits::{ChatAgent, EmbedAgent, Message};
use client::OpenAiClient;
use types::ChatRequest;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);
const DEFAULT_MAX_TOKENS: u32 = 4096;

// =============================================================================
// OpenAi Agent
// =============================================================================

/// Chat + embedding agent for any OpenAI-compatible endpoint (OpenAI itself,
/// Gemini's `/v1beta/openai`, Voyage, local gateways).
///
/// Cloning is cheap and shares the underlying connection pool.
#[derive(Clone)]
pub struct OpenAi {
    client: Arc<OpenAiClient>,
    model: String,
    embedding_model: String,
    temperature: Option<f32>,
    max_tokens: u32,
}

impl OpenAi {
    pub fn with_endpoint(
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: &str,
    ) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(AiError::Config("API key is empty".to_string()));
        }
        let client = OpenAiClient::new(&api_key, base_url, DEFAULT_TIMEOUT)?;
        Ok(Self {
            client: Arc::new(client),
            model: model.into(),
            embedding_model: "text-embedding-3-small".to_string(),
            temperature: Some(0.0),
            max_tokens: DEFAULT_MAX_TOKENS,
        })
    }

    pub fn with_embedding_model(mut self, model: impl Into<String>) -> Self {
        self.embedding_model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    /// Get the chat model name.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Get the embedding model name.
    pub fn embedding_model(&self) -> &str {
        &self.embedding_model
    }
}

// =============================================================================
// ChatAgent Implementation
// =============================================================================

#[async_trait]
impl ChatAgent for OpenAi {
    async fn chat(&self, messages: &[Message]) -> Result<String> {
        let request = ChatRequest::new(&self.model, messages)
            .token_limit(self.max_tokens)
            .temperature(self.temperature);

        let response = self.client.chat(&request).await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AiError::EmptyResponse(format!("no choices from {}", self.model)))?;

        if choice.finish_reason.as_deref() == Some("length") {
            warn!(model = %self.model, "completion truncated at token limit");
        }

        choice
            .message
            .content
            .ok_or_else(|| AiError::EmptyResponse(format!("no content from {}", self.model)))
    }
}

// =============================================================================
// EmbedAgent Implementation
// =============================================================================

#[async_trait]
impl EmbedAgent for OpenAi {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.client
            .embed(&self.embedding_model, &[text])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| AiError::EmptyResponse("no embedding in response".to_string()))
    }
}

pub mod error;

pub use error::{Result, ScaledownError};

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Body of a `/compress/raw` call.
#[derive(Debug, Clone, Serialize)]
pub struct CompressRequest<'a> {
    pub context: &'a str,
    pub question: &'a str,
    pub model_name: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
struct CompressResponse {
    #[serde(default)]
    compressed_context: Option<String>,
}

#[derive(Clone)]
pub struct ScaledownClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ScaledownClient {
    pub fn new(base_url: &str, api_key: &str) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Compress `context` with respect to `question`. Returns the compressed text.
    ///
    /// A 2xx response without a non-empty `compressed_context` string is a
    /// [`ScaledownError::Shape`] error rather than an empty success.
    pub async fn compress(&self, request: &CompressRequest<'_>) -> Result<String> {
        let endpoint = format!("{}/compress/raw/", self.base_url);

        debug!(
            model = request.model_name,
            context_chars = request.context.chars().count(),
            "scaledown compress request"
        );

        let resp = self
            .client
            .post(&endpoint)
            .header("x-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let message = resp.text().await.unwrap_or_default();
            return Err(ScaledownError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let body = resp.text().await?;
        let compressed = parse_compressed(&body)?;

        info!(
            before = request.context.chars().count(),
            after = compressed.chars().count(),
            "scaledown compression complete"
        );

        Ok(compressed)
    }
}

fn parse_compressed(body: &str) -> Result<String> {
    let parsed: CompressResponse =
        serde_json::from_str(body).map_err(|e| ScaledownError::Shape(e.to_string()))?;
    match parsed.compressed_context {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(ScaledownError::Shape(
            "missing or empty compressed_context".to_string(),
        )),
    }
}

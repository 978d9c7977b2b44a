use anyhow::Result;
use async_trait::async_trait;
use scaledown_client::{CompressRequest, ScaledownClient};
use tracing::debug;

use super::ClientSlot;
use crate::traits::ContextCompressor;

pub struct ScaledownCompressor {
    client: ClientSlot<ScaledownClient>,
    model: String,
}

impl ScaledownCompressor {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Result<Self> {
        Ok(Self {
            client: ClientSlot::new("compression", ScaledownClient::new(base_url, api_key)?),
            model: model.to_string(),
        })
    }
}

#[async_trait]
impl ContextCompressor for ScaledownCompressor {
    async fn compress(&self, context: &str, question: &str) -> Result<String> {
        let client = self.client.get()?;
        let request = CompressRequest {
            context,
            question,
            model_name: &self.model,
        };
        Ok(client.compress(&request).await?)
    }

    async fn close(&self) {
        if self.client.release() {
            debug!(model = %self.model, "Compressor closed");
        }
    }
}

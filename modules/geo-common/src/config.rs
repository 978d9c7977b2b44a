use std::time::Duration;

use anyhow::{Context, Result};

pub const DEFAULT_LLM_MODEL: &str = "gemini-2.5-flash-lite";
pub const DEFAULT_LLM_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_SCALEDOWN_BASE_URL: &str = "https://api.scaledown.xyz";
pub const DEFAULT_SCALEDOWN_MODEL: &str = "gpt-4o";
const MAX_DEFAULT_CONCURRENCY: usize = 4;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct AppConfig {
    // Generative model
    pub gemini_api_key: String,
    pub llm_model: String,
    pub llm_base_url: String,

    // Embeddings
    pub embedding_api_key: String,
    pub embedding_model: String,
    pub embedding_base_url: String,

    // Search
    pub tavily_api_key: String,

    // Compression (disabled when no key)
    pub scaledown_api_key: Option<String>,
    pub scaledown_base_url: String,
    pub scaledown_model: String,

    // Database
    pub database_url: Option<String>,

    // Crawler
    pub chrome_bin: String,

    // Worker pool
    pub max_concurrent_audits: usize,
    pub audit_timeout: Option<Duration>,

    // Web server
    pub web_host: String,
    pub web_port: u16,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let gemini_api_key =
            std::env::var("GEMINI_API_KEY").context("GEMINI_API_KEY environment variable is required")?;
        let llm_base_url = env_or("LLM_BASE_URL", DEFAULT_LLM_BASE_URL);

        let config = Self {
            embedding_api_key: non_empty_env("EMBEDDING_API_KEY")
                .unwrap_or_else(|| gemini_api_key.clone()),
            embedding_model: env_or("EMBEDDING_MODEL", DEFAULT_EMBEDDING_MODEL),
            embedding_base_url: non_empty_env("EMBEDDING_BASE_URL")
                .unwrap_or_else(|| llm_base_url.clone()),
            gemini_api_key,
            llm_model: env_or("LLM_MODEL", DEFAULT_LLM_MODEL),
            llm_base_url,
            tavily_api_key: std::env::var("TAVILY_API_KEY")
                .context("TAVILY_API_KEY environment variable is required")?,
            scaledown_api_key: non_empty_env("SCALEDOWN_API_KEY"),
            scaledown_base_url: env_or("SCALEDOWN_BASE_URL", DEFAULT_SCALEDOWN_BASE_URL),
            scaledown_model: env_or("SCALEDOWN_MODEL", DEFAULT_SCALEDOWN_MODEL),
            database_url: non_empty_env("DATABASE_URL"),
            chrome_bin: env_or("CHROME_BIN", "chromium"),
            max_concurrent_audits: match non_empty_env("MAX_CONCURRENT_AUDITS") {
                Some(v) => v
                    .parse::<usize>()
                    .context("MAX_CONCURRENT_AUDITS must be a positive integer")?
                    .max(1),
                None => default_concurrency(),
            },
            audit_timeout: match non_empty_env("AUDIT_TIMEOUT_SECS") {
                Some(v) => Some(Duration::from_secs(
                    v.parse().context("AUDIT_TIMEOUT_SECS must be a number of seconds")?,
                )),
                None => None,
            },
            web_host: env_or("WEB_HOST", "0.0.0.0"),
            web_port: env_or("WEB_PORT", "8000")
                .parse()
                .context("WEB_PORT must be a number")?,
        };

        config.log_keys();
        Ok(config)
    }

    fn log_keys(&self) {
        fn preview(val: &str) -> String {
            let head: String = val.chars().take(5).collect();
            format!("{}...({} chars)", head, val.len())
        }
        fn preview_opt(val: &Option<String>) -> String {
            match val {
                Some(v) if !v.is_empty() => preview(v),
                _ => "<not set>".to_string(),
            }
        }

        tracing::info!("Config loaded:");
        tracing::info!("  GEMINI_API_KEY: {}", preview(&self.gemini_api_key));
        tracing::info!("  LLM_MODEL: {}", self.llm_model);
        tracing::info!("  EMBEDDING_MODEL: {}", self.embedding_model);
        tracing::info!("  TAVILY_API_KEY: {}", preview(&self.tavily_api_key));
        tracing::info!("  SCALEDOWN_API_KEY: {}", preview_opt(&self.scaledown_api_key));
        tracing::info!("  DATABASE_URL: {}", preview_opt(&self.database_url));
        tracing::info!("  MAX_CONCURRENT_AUDITS: {}", self.max_concurrent_audits);
        match self.audit_timeout {
            Some(t) => tracing::info!("  AUDIT_TIMEOUT_SECS: {}", t.as_secs()),
            None => tracing::info!("  AUDIT_TIMEOUT_SECS: <not set>"),
        }
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    non_empty_env(key).unwrap_or_else(|| default.to_string())
}

/// Available parallelism, capped so a single host never runs many browsers at once.
pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
        .min(MAX_DEFAULT_CONCURRENCY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_concurrency_is_bounded() {
        let n = default_concurrency();
        assert!((1..=MAX_DEFAULT_CONCURRENCY).contains(&n));
    }
}

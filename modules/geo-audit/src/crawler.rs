// Headless Chromium crawler: DOM dump → Readability markdown, JSON-LD
// blocks and page metadata.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rand::Rng;
use scraper::{Html, Selector};
use spider_transformations::transformation::content::{
    transform_content_input, ReturnFormat, TransformConfig, TransformInput,
};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use geo_common::SiteSnapshot;

use crate::traits::SiteCrawler;

/// Max concurrent Chromium processes. Each instance is heavy (~100MB+ RSS).
const MAX_CONCURRENT_CHROME: usize = 2;
/// Max retry attempts for transient Chrome failures.
const CHROME_MAX_ATTEMPTS: u32 = 3;
/// Base backoff duration for Chrome retries. Actual delay is base * 3^attempt + jitter.
const CHROME_RETRY_BASE: Duration = Duration::from_secs(3);
const CHROME_RENDER_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ChromeCrawler {
    chrome_bin: String,
    semaphore: Semaphore,
}

impl ChromeCrawler {
    pub fn new(chrome_bin: impl Into<String>) -> Self {
        let chrome_bin = chrome_bin.into();
        info!(chrome_bin, "ChromeCrawler initialized (max_concurrent={MAX_CONCURRENT_CHROME})");
        Self {
            chrome_bin,
            semaphore: Semaphore::new(MAX_CONCURRENT_CHROME),
        }
    }

    /// Launch Chrome --dump-dom and return raw stdout bytes.
    async fn run_chrome(&self, url: &str) -> Result<Vec<u8>> {
        let parsed = url::Url::parse(url).context("Invalid URL")?;
        if parsed.scheme() != "http" && parsed.scheme() != "https" {
            anyhow::bail!("Only http/https URLs allowed, got: {}", parsed.scheme());
        }

        for attempt in 0..CHROME_MAX_ATTEMPTS {
            let tmp_dir = tempfile::tempdir().context("Failed to create temp profile dir")?;
            let last_attempt = attempt + 1 >= CHROME_MAX_ATTEMPTS;

            let result = tokio::time::timeout(
                CHROME_RENDER_TIMEOUT,
                tokio::process::Command::new(&self.chrome_bin)
                    .args([
                        "--headless",
                        "--no-sandbox",
                        "--disable-gpu",
                        "--disable-dev-shm-usage",
                        &format!("--user-data-dir={}", tmp_dir.path().display()),
                        "--dump-dom",
                        url,
                    ])
                    .kill_on_drop(true)
                    .output(),
            )
            .await;

            match result {
                Ok(Ok(output)) if output.status.success() => {
                    if output.stdout.is_empty() && !last_attempt {
                        warn!(url, attempt = attempt + 1, "Chrome returned empty DOM, retrying");
                        backoff(attempt).await;
                        continue;
                    }
                    return Ok(output.stdout);
                }
                Ok(Ok(output)) => {
                    let stderr = String::from_utf8_lossy(&output.stderr);
                    if is_transient_error(&stderr) && !last_attempt {
                        backoff(attempt).await;
                        continue;
                    }
                    warn!(url, stderr = %stderr, "Chrome exited with error");
                    return Ok(Vec::new());
                }
                Ok(Err(e)) => {
                    if is_transient_error(&e.to_string()) && !last_attempt {
                        warn!(url, attempt = attempt + 1, error = %e, "Chrome launch failed, retrying");
                        backoff(attempt).await;
                        continue;
                    }
                    anyhow::bail!("Failed to run Chrome for {url}: {e}");
                }
                Err(_) => {
                    if !last_attempt {
                        warn!(url, attempt = attempt + 1, "Chrome timed out, retrying");
                        backoff(attempt).await;
                        continue;
                    }
                    anyhow::bail!(
                        "Chrome timed out after {}s for {url}",
                        CHROME_RENDER_TIMEOUT.as_secs()
                    );
                }
            }
        }

        Ok(Vec::new())
    }
}

#[async_trait]
impl SiteCrawler for ChromeCrawler {
    async fn crawl(&self, url: &str) -> Result<SiteSnapshot> {
        let _permit = self
            .semaphore
            .acquire()
            .await
            .map_err(|_| anyhow::anyhow!("Chrome semaphore closed"))?;

        info!(url, "Crawling page");
        let html = self.run_chrome(url).await?;
        if html.is_empty() {
            warn!(url, "Empty DOM output");
            return Ok(SiteSnapshot::empty(url));
        }

        let snapshot = snapshot_from_html(url, &html);
        info!(
            url,
            markdown_chars = snapshot.markdown_chars(),
            json_ld = snapshot.structured_data.len(),
            "Crawl complete"
        );
        Ok(snapshot)
    }

    /// Stop admitting new Chrome launches. Renders already running finish.
    async fn close(&self) {
        self.semaphore.close();
        debug!("Chrome crawler closed");
    }
}

/// Build a snapshot from rendered HTML.
pub fn snapshot_from_html(url: &str, html: &[u8]) -> SiteSnapshot {
    let markdown_content = html_to_markdown(html, Some(url));
    let raw = String::from_utf8_lossy(html);
    let document = Html::parse_document(&raw);

    SiteSnapshot {
        url: url.to_string(),
        markdown_content,
        structured_data: extract_json_ld(&document),
        metadata: extract_metadata(&document),
    }
}

/// Convert raw HTML bytes into clean markdown using Readability extraction.
pub fn html_to_markdown(html: &[u8], url: Option<&str>) -> String {
    let parsed_url = url.and_then(|u| url::Url::parse(u).ok());
    let config = TransformConfig {
        readability: true,
        main_content: true,
        return_format: ReturnFormat::Markdown,
        filter_images: true,
        filter_svg: true,
        clean_html: true,
    };
    let input = TransformInput {
        url: parsed_url.as_ref(),
        content: html,
        screenshot_bytes: None,
        encoding: None,
        selector_config: None,
        ignore_tags: None,
    };

    transform_content_input(input, &config)
}

/// Every parseable `application/ld+json` block, in document order.
fn extract_json_ld(document: &Html) -> Vec<serde_json::Value> {
    let Ok(selector) = Selector::parse(r#"script[type="application/ld+json"]"#) else {
        return Vec::new();
    };

    document
        .select(&selector)
        .filter_map(|script| {
            let text: String = script.text().collect();
            match serde_json::from_str(text.trim()) {
                Ok(value) => Some(value),
                Err(e) => {
                    warn!(error = %e, "Skipping invalid JSON-LD block");
                    None
                }
            }
        })
        .collect()
}

fn extract_metadata(document: &Html) -> BTreeMap<String, Option<String>> {
    let mut metadata = BTreeMap::new();

    metadata.insert(
        "title".to_string(),
        first_text(document, "title"),
    );
    metadata.insert(
        "description".to_string(),
        first_attr(document, r#"meta[name="description"]"#, "content"),
    );
    metadata.insert(
        "language".to_string(),
        first_attr(document, "html", "lang"),
    );
    for key in ["og:title", "og:description", "og:site_name"] {
        metadata.insert(
            key.to_string(),
            first_attr(document, &format!(r#"meta[property="{key}"]"#), "content"),
        );
    }
    metadata.insert(
        "canonical".to_string(),
        first_attr(document, r#"link[rel="canonical"]"#, "href"),
    );

    metadata
}

fn first_text(document: &Html, css: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    let text: String = document.select(&selector).next()?.text().collect();
    let text = text.split_whitespace().collect::<Vec<_>>().join(" ");
    (!text.is_empty()).then_some(text)
}

fn first_attr(document: &Html, css: &str, attr: &str) -> Option<String> {
    let selector = Selector::parse(css).ok()?;
    document
        .select(&selector)
        .find_map(|el| el.value().attr(attr))
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_transient_error(msg: &str) -> bool {
    msg.contains("Cannot fork") || msg.contains("Resource temporarily unavailable")
}

async fn backoff(attempt: u32) {
    let delay = CHROME_RETRY_BASE * 3u32.pow(attempt);
    let jitter = Duration::from_millis(rand::rng().random_range(0..1000));
    tokio::time::sleep(delay + jitter).await;
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!doctype html>
<html lang="fr">
<head>
  <title>  Acme
     Widgets </title>
  <meta name="description" content="Widgets since 1990">
  <meta property="og:site_name" content="Acme">
  <link rel="canonical" href="https://acme.example/">
  <script type="application/ld+json">{"@type": "Organization", "name": "Acme"}</script>
  <script type="application/ld+json">{ not json }</script>
  <script type="application/ld+json">[{"@type": "WebSite"}]</script>
</head>
<body><main><h1>Acme Widgets</h1><p>We sell the finest widgets in town.</p></main></body>
</html>"#;

    #[test]
    fn extracts_metadata() {
        let snap = snapshot_from_html("https://acme.example/", PAGE.as_bytes());
        assert_eq!(snap.meta("title"), Some("Acme Widgets"));
        assert_eq!(snap.meta("description"), Some("Widgets since 1990"));
        assert_eq!(snap.meta("language"), Some("fr"));
        assert_eq!(snap.meta("og:site_name"), Some("Acme"));
        assert_eq!(snap.meta("og:title"), None);
        assert_eq!(snap.meta("canonical"), Some("https://acme.example/"));
        assert!(snap.metadata.contains_key("og:description"));
    }

    #[test]
    fn keeps_valid_json_ld_blocks_in_order() {
        let snap = snapshot_from_html("https://acme.example/", PAGE.as_bytes());
        assert_eq!(snap.structured_data.len(), 2);
        assert_eq!(snap.structured_data[0]["name"], "Acme");
        assert!(snap.structured_data[1].is_array());
    }

    #[tokio::test]
    async fn rejects_non_http_urls() {
        let crawler = ChromeCrawler::new("chromium");
        let err = crawler.crawl("file:///etc/passwd").await.unwrap_err();
        assert!(err.to_string().contains("http/https"));
    }

    #[tokio::test]
    async fn closed_crawler_launches_nothing() {
        let crawler = ChromeCrawler::new("/nonexistent/chromium");
        crawler.close().await;

        let err = crawler.crawl("https://acme.example").await.unwrap_err();
        assert!(err.to_string().contains("semaphore closed"));
    }
}

// Page rewrite: send a crawled page to the generative model and get back an
// SEO/AEO-improved version of it plus a plain-language comment.

use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use ai_client::Message;
use geo_common::error::Result;
use geo_common::{AuditError, SiteSnapshot};

use crate::report::extract_json_object;
use crate::traits::ReportGenerator;

static SVG_PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"!\[[^\]]*\]\(data:image/svg\+xml[^)]*\)").expect("valid regex")
});

const REWRITE_PROMPT: &str = "\
You are an SEO and AEO (Answer Engine Optimization) expert. You optimize \
content for both traditional search engines and AI-powered assistants such as \
ChatGPT, Claude, Gemini and Le Chat.

You receive a JSON object describing a web page:
{\"url\": ..., \"markdown_content\": ..., \"structured_data\": [...], \"metadata\": {...}}

Your task:
1. Improve \"markdown_content\" for SEO: fix the heading hierarchy, improve keyword \
usage, keep the content clear and well structured, and answer common visitor \
questions directly.
2. Improve or complete \"structured_data\": add or fix Schema.org JSON-LD blocks \
(WebPage, Article, BreadcrumbList, FAQPage when relevant).
3. Improve \"metadata\": title of 30 to 60 characters, meta description of 50 to \
160 characters, Open Graph tags, lang, robots, canonical, and a \"summary\" tag \
for LLM crawlers.
4. Add a \"comment\" field: a short paragraph of 5 to 10 sentences explaining the \
main flaws found and what was improved, written for a non-technical reader.

Output format:
- Return ONLY one valid JSON object with the keys \"url\", \"markdown_content\", \
\"structured_data\", \"metadata\" and \"comment\".
- No code fences and no text before or after the JSON.
- Escape newlines inside strings as \\n and quotes as \\\".";

/// The model's improved version of a page.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Suggestion {
    pub url: String,
    pub markdown_content: String,
    pub structured_data: Vec<Value>,
    pub metadata: Map<String, Value>,
    /// Plain-language summary of what was wrong and what changed.
    pub comment: String,
}

impl Suggestion {
    /// Read the model's object. Any field it left out or mistyped keeps the
    /// value from `input`, except `comment`, which has nothing to fall back on.
    pub fn from_map(mut map: Map<String, Value>, input: &SiteSnapshot) -> Self {
        let url = match map.remove("url") {
            Some(Value::String(url)) if !url.trim().is_empty() => url,
            _ => input.url.clone(),
        };
        let markdown_content = match map.remove("markdown_content") {
            Some(Value::String(md)) => md,
            _ => {
                warn!(url = %input.url, "Rewrite has no markdown_content, keeping the original");
                input.markdown_content.clone()
            }
        };
        let structured_data = match map.remove("structured_data") {
            Some(Value::Array(blocks)) => blocks,
            Some(Value::Object(block)) => vec![Value::Object(block)],
            _ => input.structured_data.clone(),
        };
        let metadata = match map.remove("metadata") {
            Some(Value::Object(meta)) => meta,
            _ => input
                .metadata
                .iter()
                .map(|(k, v)| (k.clone(), v.clone().map(Value::String).unwrap_or(Value::Null)))
                .collect(),
        };
        let comment = match map.remove("comment") {
            Some(Value::String(comment)) => comment,
            _ => {
                warn!(url = %input.url, "Rewrite has no comment");
                String::new()
            }
        };
        if !map.is_empty() {
            let extra: Vec<&String> = map.keys().collect();
            warn!(url = %input.url, ?extra, "Ignoring unrecognised rewrite keys");
        }

        Self {
            url,
            markdown_content,
            structured_data,
            metadata,
            comment,
        }
    }
}

/// Strip what only adds noise to a rewrite: inline SVG image placeholders and
/// navigation links back into the same site.
pub fn clean_markdown(markdown: &str, site_url: &str) -> String {
    let cleaned = SVG_PLACEHOLDER.replace_all(markdown, "");

    let host = url::Url::parse(site_url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.trim_start_matches("www.").to_string()));
    let cleaned = match host.and_then(|h| same_site_link(&h)) {
        Some(nav) => nav.replace_all(&cleaned, "").into_owned(),
        None => cleaned.into_owned(),
    };

    cleaned.trim().to_string()
}

fn same_site_link(host: &str) -> Option<Regex> {
    Regex::new(&format!(
        r"\[[^\]]*\]\(https?://(?:www\.)?{}(?:/[^)]*)?\)",
        regex::escape(host)
    ))
    .ok()
}

/// Rewrites a crawled page for search engines and AI assistants.
pub struct WebsiteImprover {
    generator: Arc<dyn ReportGenerator>,
}

impl WebsiteImprover {
    pub fn new(generator: Arc<dyn ReportGenerator>) -> Self {
        Self { generator }
    }

    pub async fn improve(&self, page: &SiteSnapshot) -> Result<Suggestion> {
        if page.is_empty() {
            return Err(AuditError::CrawlEmpty(page.url.clone()));
        }

        let mut cleaned = page.clone();
        cleaned.markdown_content = clean_markdown(&page.markdown_content, &page.url);
        info!(
            url = %page.url,
            before = page.markdown_chars(),
            after = cleaned.markdown_chars(),
            "Markdown cleaned for rewrite"
        );

        let messages = build_messages(&cleaned)?;
        let raw = self
            .generator
            .generate(&messages)
            .await
            .map_err(|e| AuditError::Other(e.context("page rewrite failed")))?;

        let suggestion = Suggestion::from_map(extract_json_object(&raw)?, &cleaned);
        info!(
            url = %page.url,
            markdown_chars = suggestion.markdown_content.chars().count(),
            json_ld = suggestion.structured_data.len(),
            "Rewrite extracted"
        );
        Ok(suggestion)
    }
}

fn build_messages(page: &SiteSnapshot) -> Result<Vec<Message>> {
    let input = json!({
        "url": page.url,
        "markdown_content": page.markdown_content,
        "structured_data": page.structured_data,
        "metadata": page.metadata,
    });
    let input = serde_json::to_string_pretty(&input).map_err(anyhow::Error::from)?;

    Ok(vec![Message::user(format!(
        "{REWRITE_PROMPT}\n\nHere is the page to optimize:\n{input}"
    ))])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockGenerator;

    fn page() -> SiteSnapshot {
        let mut page = SiteSnapshot::new(
            "https://www.acme.example/",
            "![logo](data:image/svg+xml;base64,PHN2Zz4=)\n\
             [Home](https://acme.example/) [Contact](https://www.acme.example/contact)\n\
             # Acme\nWe sell widgets. See [reviews](https://reviews.example/acme).",
        )
        .with_title("Acme");
        page.structured_data.push(json!({"@type": "Organization", "name": "Acme"}));
        page
    }

    #[test]
    fn clean_markdown_drops_svg_placeholders_and_site_navigation() {
        let cleaned = clean_markdown(&page().markdown_content, "https://www.acme.example/");
        assert!(!cleaned.contains("data:image/svg"));
        assert!(!cleaned.contains("[Home]"));
        assert!(!cleaned.contains("[Contact]"));
        assert!(cleaned.starts_with("# Acme"));
        assert!(cleaned.contains("[reviews](https://reviews.example/acme)"));
    }

    #[test]
    fn clean_markdown_without_parseable_url_only_strips_images() {
        let cleaned = clean_markdown("  [Home](https://acme.example/) ![x](data:image/svg+xml,<svg/>)  ", "not a url");
        assert_eq!(cleaned, "[Home](https://acme.example/)");
    }

    #[test]
    fn missing_fields_fall_back_to_input() {
        let input = page();
        let map = json!({"markdown_content": "# Better", "comment": "Headings fixed.", "extra": 1});
        let s = Suggestion::from_map(map.as_object().unwrap().clone(), &input);

        assert_eq!(s.url, input.url);
        assert_eq!(s.markdown_content, "# Better");
        assert_eq!(s.structured_data, input.structured_data);
        assert_eq!(s.metadata["title"], "Acme");
        assert_eq!(s.comment, "Headings fixed.");
    }

    #[test]
    fn single_structured_data_object_is_wrapped() {
        let map = json!({"structured_data": {"@type": "WebPage"}});
        let s = Suggestion::from_map(map.as_object().unwrap().clone(), &page());
        assert_eq!(s.structured_data, vec![json!({"@type": "WebPage"})]);
        assert_eq!(s.comment, "");
    }

    #[tokio::test]
    async fn improve_sends_cleaned_page_and_parses_fenced_reply() {
        let generator = Arc::new(MockGenerator::new(
            "Here you go:\n```json\n{\"url\": \"https://www.acme.example/\", \
             \"markdown_content\": \"# Acme widgets\\nHand-made since 1990.\", \
             \"structured_data\": [{\"@type\": \"WebPage\"}], \
             \"metadata\": {\"title\": \"Acme widgets, hand-made since 1990\"}, \
             \"comment\": \"The page lacked a clear heading.\"}\n```",
        ));
        let improver = WebsiteImprover::new(generator.clone());

        let s = improver.improve(&page()).await.unwrap();

        assert_eq!(s.markdown_content, "# Acme widgets\nHand-made since 1990.");
        assert_eq!(s.metadata["title"], "Acme widgets, hand-made since 1990");
        assert_eq!(s.comment, "The page lacked a clear heading.");

        let prompt = generator.last_prompt();
        assert_eq!(prompt.len(), 1);
        assert!(prompt[0].content.contains("\"comment\""));
        assert!(prompt[0].content.contains("We sell widgets."));
        assert!(!prompt[0].content.contains("data:image/svg"));
        assert!(!prompt[0].content.contains("[Home]"));
    }

    #[tokio::test]
    async fn improve_reports_unparseable_reply() {
        let improver = WebsiteImprover::new(Arc::new(MockGenerator::new("{\"comment\": \"cut off")));
        let err = improver.improve(&page()).await.unwrap_err();
        assert_eq!(err.kind(), "MalformedReportError");
    }

    #[tokio::test]
    async fn improve_refuses_empty_page_without_calling_model() {
        let generator = Arc::new(MockGenerator::new("{}"));
        let improver = WebsiteImprover::new(generator.clone());

        let err = improver.improve(&SiteSnapshot::empty("https://acme.example")).await.unwrap_err();

        assert!(matches!(err, AuditError::CrawlEmpty(_)));
        assert_eq!(generator.calls(), 0);
    }
}

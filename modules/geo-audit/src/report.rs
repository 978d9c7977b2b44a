// Tolerant extraction of the report object from free-form model output,
// and the typed view over it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::warn;

use ai_client::{strip_code_blocks, truncate_to_char_boundary};
use geo_common::error::Result;
use geo_common::AuditError;

/// Keys the report prompt asks for, in prompt order.
pub const REPORT_KEYS: [&str; 6] = [
    "score",
    "critical_analysis",
    "top5_recommendations",
    "llms_txt_content",
    "coherence_interpretation",
    "comparison_interpretation",
];

const MAX_RECOMMENDATIONS: usize = 5;
const SNIPPET_BYTES: usize = 200;

// ---------------------------------------------------------------------------
// Extraction
// ---------------------------------------------------------------------------

/// Pull one JSON object out of raw model output.
///
/// Strips a code fence, tries the whole text, then falls back to the first
/// brace-balanced object. Braces inside string literals do not count.
/// Never returns a partial object.
pub fn extract_json_object(raw: &str) -> Result<Map<String, Value>> {
    let cleaned = strip_code_blocks(raw);

    let direct_err = match serde_json::from_str::<Value>(cleaned) {
        Ok(Value::Object(map)) => return Ok(map),
        Ok(_) => None,
        Err(e) => Some(e),
    };

    let Some(start) = cleaned.find('{') else {
        return Err(match direct_err {
            Some(e) => malformed(&e, cleaned),
            None => AuditError::MalformedReport {
                message: "expected a JSON object".to_string(),
                line: 1,
                column: 1,
                snippet: snippet(cleaned),
            },
        });
    };

    let tail = &cleaned[start..];
    let Some(len) = balanced_object_len(tail) else {
        // Never closes; parse the tail anyway so the error carries a position.
        return Err(match serde_json::from_str::<Value>(tail) {
            Err(e) => malformed(&e, tail),
            Ok(_) => AuditError::MalformedReport {
                message: "no complete JSON object found".to_string(),
                line: 1,
                column: 1,
                snippet: snippet(tail),
            },
        });
    };

    let candidate = &tail[..len];
    match serde_json::from_str::<Value>(candidate) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AuditError::MalformedReport {
            message: "expected a JSON object".to_string(),
            line: 1,
            column: 1,
            snippet: snippet(candidate),
        }),
        Err(e) => Err(malformed(&e, candidate)),
    }
}

/// Byte length of the object starting at `s[0] == '{'`, if it closes.
fn balanced_object_len(s: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, ch) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match ch {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}

fn malformed(err: &serde_json::Error, text: &str) -> AuditError {
    AuditError::MalformedReport {
        message: err.to_string(),
        line: err.line(),
        column: err.column(),
        snippet: snippet(text),
    }
}

fn snippet(text: &str) -> String {
    let cut = truncate_to_char_boundary(text, SNIPPET_BYTES);
    if cut.len() < text.len() {
        format!("{cut}...")
    } else {
        cut.to_string()
    }
}

// ---------------------------------------------------------------------------
// Typed report
// ---------------------------------------------------------------------------

/// Typed view of the report object. Every field defaults when absent.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditReport {
    pub score: Option<f64>,
    pub critical_analysis: String,
    pub top5_recommendations: Vec<String>,
    pub llms_txt_content: String,
    pub coherence_interpretation: String,
    pub comparison_interpretation: String,
}

impl AuditReport {
    /// Lenient read: wrong-typed fields fall back to defaults and unknown
    /// keys are logged.
    pub fn from_map(map: &Map<String, Value>) -> Self {
        let unknown: Vec<&str> = map
            .keys()
            .map(String::as_str)
            .filter(|k| !REPORT_KEYS.contains(k))
            .collect();
        if !unknown.is_empty() {
            warn!(keys = ?unknown, "Report has unrecognized keys");
        }

        let text = |key: &str| {
            map.get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };

        Self {
            score: map.get("score").and_then(parse_score),
            critical_analysis: text("critical_analysis"),
            top5_recommendations: map
                .get("top5_recommendations")
                .and_then(Value::as_array)
                .map(|items| {
                    items
                        .iter()
                        .filter_map(Value::as_str)
                        .take(MAX_RECOMMENDATIONS)
                        .map(String::from)
                        .collect()
                })
                .unwrap_or_default(),
            llms_txt_content: text("llms_txt_content"),
            coherence_interpretation: text("coherence_interpretation"),
            comparison_interpretation: text("comparison_interpretation"),
        }
    }

    pub fn from_value(value: &Value) -> Self {
        value.as_object().map(Self::from_map).unwrap_or_default()
    }

    /// Score on a 0–100 scale. Fractions up to 1.0 are read as 0–1 and
    /// rescaled; anything larger is already 0–100.
    pub fn normalized_score(&self) -> Option<i32> {
        self.score.map(normalize_score)
    }
}

pub fn normalize_score(score: f64) -> i32 {
    if score <= 1.0 {
        (score * 100.0).round() as i32
    } else {
        score.round() as i32
    }
}

/// Numbers, or strings holding a number ("85", " 0.9 ").
fn parse_score(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().trim_end_matches('%').trim().parse().ok(),
        _ => None,
    }
    .filter(|s: &f64| s.is_finite())
}

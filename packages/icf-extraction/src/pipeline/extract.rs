//! Extraction module - parse AI responses into engine types.
//!
//! Models wrap JSON in prose or code fences more often than they should.
//! Recovery is limited to locating a JSON object in the text; content that
//! is not JSON is a malformed response, never a best-effort answer.

use std::sync::OnceLock;

use regex::Regex;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{ExtractionError, Result};

/// Search response from AI (one batch).
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AISearchResponse {
    pub candidates: Vec<AICandidate>,

    /// Model's claim that the instructions are now fully answered
    pub sufficient: bool,

    #[serde(default)]
    pub notes: Option<String>,
}

/// A candidate quote from the AI response.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AICandidate {
    pub quote: String,

    /// Accepts `12`, `"12"` or `"Page 12"`; anything else becomes `None`
    #[serde(default, deserialize_with = "lenient_page")]
    pub page: Option<u32>,

    #[serde(default)]
    pub relevance: Option<f32>,
}

/// Synthesis verdict from the AI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AIVerdict {
    Found,
    Partial,
    NotFound,
}

/// Synthesis response from AI.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AISynthesisResponse {
    pub status: AIVerdict,

    #[serde(default)]
    pub answer: String,

    #[serde(default)]
    pub filled_template: String,

    #[serde(default)]
    pub notes: String,

    /// Evidence items disagree with each other
    #[serde(default)]
    pub conflicting: bool,
}

fn lenient_page<'de, D>(deserializer: D) -> std::result::Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_u64().and_then(|n| u32::try_from(n).ok()),
        Some(serde_json::Value::String(s)) => s
            .split(|c: char| !c.is_ascii_digit())
            .find(|part| !part.is_empty())
            .and_then(|digits| digits.parse().ok()),
        _ => None,
    })
}

fn code_fence_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```(?:json)?\s*(.*?)\s*```").expect("code fence regex is valid")
    })
}

/// All top-level `{ ... }` substrings of `text`, in order.
fn brace_candidates(text: &str) -> Vec<&str> {
    let mut depth = 0usize;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;
    let mut results = Vec::new();

    for (i, ch) in text.char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' if depth > 0 => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' if depth > 0 => {
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        results.push(&text[s..=i]);
                    }
                }
            }
            _ => {}
        }
    }

    results
}

/// Parse a JSON object of type `T` from raw model output.
///
/// Tries, in order: the whole text, the first fenced code block, then
/// each top-level brace group from last to first.
pub fn parse_json_response<T: DeserializeOwned>(stage: &'static str, raw: &str) -> Result<T> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ExtractionError::MalformedResponse {
            stage,
            reason: "empty response".to_string(),
            raw: raw.to_string(),
        });
    }

    let first_error = match serde_json::from_str::<T>(trimmed) {
        Ok(parsed) => return Ok(parsed),
        Err(e) => e,
    };

    if let Some(block) = code_fence_regex()
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
    {
        if let Ok(parsed) = serde_json::from_str::<T>(block) {
            return Ok(parsed);
        }
    }

    for candidate in brace_candidates(raw).into_iter().rev() {
        if let Ok(parsed) = serde_json::from_str::<T>(candidate) {
            return Ok(parsed);
        }
    }

    Err(ExtractionError::MalformedResponse {
        stage,
        reason: first_error.to_string(),
        raw: raw.to_string(),
    })
}

/// Parse a search response.
pub fn parse_search_response(raw: &str) -> Result<AISearchResponse> {
    parse_json_response("search", raw)
}

/// Parse a synthesis response.
pub fn parse_synthesis_response(raw: &str) -> Result<AISynthesisResponse> {
    parse_json_response("synthesis", raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_plain_json() {
        let raw = r#"{"candidates": [{"quote": "Drug X every 21 days", "page": 42, "relevance": 0.9}], "sufficient": true}"#;
        let parsed = parse_search_response(raw).unwrap();
        assert_eq!(parsed.candidates.len(), 1);
        assert_eq!(parsed.candidates[0].page, Some(42));
        assert!(parsed.sufficient);
    }

    #[test]
    fn test_parse_code_fence() {
        let raw = "Here you go:\n```json\n{\"candidates\": [], \"sufficient\": false}\n```\nDone.";
        let parsed = parse_search_response(raw).unwrap();
        assert!(parsed.candidates.is_empty());
        assert!(!parsed.sufficient);
    }

    #[test]
    fn test_parse_embedded_object_prefers_last() {
        let raw = r#"Draft: {"status": "PARTIAL"} Final answer: {"status": "FOUND", "answer": "You will get drug X {every} 3 weeks."}"#;
        let parsed = parse_synthesis_response(raw).unwrap();
        assert_eq!(parsed.status, AIVerdict::Found);
        assert_eq!(parsed.answer, "You will get drug X {every} 3 weeks.");
    }

    #[test]
    fn test_lenient_page_numbers() {
        let raw = r#"{"candidates": [
            {"quote": "a", "page": "Page 7"},
            {"quote": "b", "page": "12"},
            {"quote": "c", "page": "unknown"},
            {"quote": "d"}
        ], "sufficient": false}"#;
        let parsed = parse_search_response(raw).unwrap();
        let pages: Vec<_> = parsed.candidates.iter().map(|c| c.page).collect();
        assert_eq!(pages, vec![Some(7), Some(12), None, None]);
    }

    #[test]
    fn test_free_text_is_malformed() {
        let raw = "The protocol says patients get drug X every 21 days.";
        let err = parse_synthesis_response(raw).unwrap_err();
        match err {
            ExtractionError::MalformedResponse { stage, raw: kept, .. } => {
                assert_eq!(stage, "synthesis");
                assert_eq!(kept, raw);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_empty_is_malformed() {
        assert!(matches!(
            parse_search_response("   "),
            Err(ExtractionError::MalformedResponse { .. })
        ));
    }

    #[test]
    fn test_wrong_shape_search_is_malformed() {
        for raw in [
            r#"{"error": "rate limit exceeded", "code": 429}"#,
            r#"{"candidates": []}"#,
            r#"{"sufficient": true}"#,
        ] {
            assert!(
                matches!(
                    parse_search_response(raw),
                    Err(ExtractionError::MalformedResponse { stage: "search", .. })
                ),
                "accepted {raw}"
            );
        }
    }

    #[test]
    fn test_unknown_verdict_is_malformed() {
        let raw = r#"{"status": "MAYBE", "answer": "x"}"#;
        assert!(parse_synthesis_response(raw).is_err());
    }

    #[test]
    fn test_brace_candidates_ignore_braces_in_strings() {
        let text = r#"x {"a": "}"} y {"b": 1}"#;
        assert_eq!(brace_candidates(text), vec![r#"{"a": "}"}"#, r#"{"b": 1}"#]);
    }
}

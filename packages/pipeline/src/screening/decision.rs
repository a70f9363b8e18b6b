//! Classifier response parsing and routing.
//!
//! Models are asked for a JSON object but answer in many shapes: fenced,
//! with string scores, with a citation object or a plain string. Anything
//! that is not a JSON object degrades to an `UNKNOWN` assessment carrying
//! the raw text, which routes to the no-match directory.

use serde::Deserialize;
use serde_json::Value;

pub const UNKNOWN_VERDICT: &str = "UNKNOWN";
pub const OUT_OF_RANGE_VERDICT: &str = "OUT_OF_RANGE";
/// Logged for files that could not be screened or filed.
pub const ERROR_VERDICT: &str = "ERROR";
pub const SKIPPED_VERDICT: &str = "SKIPPED";

/// Verdicts that route to the match directory regardless of score.
const POSITIVE_VERDICTS: &[&str] = &["YES", "SIM", "RELEVANT", "INCLUDE"];

/// Where a screened document is filed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Destination {
    Match,
    NoMatch,
}

/// A parsed classifier answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assessment {
    /// Relevance score clamped to 0-100, when the model gave one.
    pub score: Option<u8>,
    pub verdict: String,
    pub reasoning: String,
    pub citation: Option<String>,
}

impl Assessment {
    pub fn unknown(raw: &str) -> Self {
        Self {
            score: None,
            verdict: UNKNOWN_VERDICT.to_string(),
            reasoning: raw.trim().to_string(),
            citation: None,
        }
    }

    pub fn is_positive(&self) -> bool {
        POSITIVE_VERDICTS
            .iter()
            .any(|v| self.verdict.trim().eq_ignore_ascii_case(v))
    }

    /// Positive verdict or `score >= threshold` files into the match directory.
    pub fn destination(&self, threshold: u8) -> Destination {
        if self.is_positive() || self.score.is_some_and(|s| s >= threshold) {
            Destination::Match
        } else {
            Destination::NoMatch
        }
    }
}

#[derive(Deserialize)]
struct RawResponse {
    #[serde(default, alias = "score")]
    relevance_score: Option<Value>,
    #[serde(default)]
    decision: Option<String>,
    #[serde(default, alias = "justification")]
    reasoning: Option<String>,
    #[serde(default, alias = "suggested_citation")]
    most_relevant_citation: Option<Value>,
}

/// Remove a surrounding Markdown code fence (```` ```json ```` or bare).
pub fn strip_fences(raw: &str) -> &str {
    let text = raw.trim();
    let text = text
        .strip_prefix("```json")
        .or_else(|| text.strip_prefix("```JSON"))
        .or_else(|| text.strip_prefix("```"))
        .unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    text.trim()
}

/// Parse raw classifier output into an [`Assessment`].
pub fn parse_response(raw: &str) -> Assessment {
    let body = strip_fences(raw);
    let parsed: RawResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::debug!(error = %e, "classifier answer is not a JSON object");
            return Assessment::unknown(raw);
        }
    };

    let verdict = parsed
        .decision
        .map(|d| d.trim().to_string())
        .filter(|d| !d.is_empty())
        .unwrap_or_else(|| UNKNOWN_VERDICT.to_string());

    Assessment {
        score: parsed.relevance_score.as_ref().and_then(score_from),
        verdict,
        reasoning: parsed.reasoning.unwrap_or_default().trim().to_string(),
        citation: parsed.most_relevant_citation.as_ref().and_then(citation_from),
    }
}

fn score_from(value: &Value) -> Option<u8> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().trim_end_matches('%').parse::<f64>().ok()?,
        _ => return None,
    };
    if !n.is_finite() {
        return None;
    }
    Some(n.round().clamp(0.0, 100.0) as u8)
}

fn citation_from(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.trim().to_string(),
        Value::Object(map) => {
            let field = |k: &str| {
                map.get(k)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
            };
            match (field("title"), field("author")) {
                (Some(title), Some(author)) => format!("{title} ({author})"),
                (Some(title), None) => title.to_string(),
                (None, Some(author)) => author.to_string(),
                (None, None) => return None,
            }
        }
        _ => return None,
    };
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_fenced_negative_decision() {
        let assessment = parse_response("```json\n{\"decision\":\"NAO\"}\n```");
        assert_eq!(assessment.verdict, "NAO");
        assert_eq!(assessment.score, None);
        assert_eq!(assessment.destination(70), Destination::NoMatch);
    }

    #[test]
    fn test_strip_fences() {
        assert_eq!(strip_fences("```json\n{}\n```"), "{}");
        assert_eq!(strip_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_fences("  {} "), "{}");
    }

    #[test]
    fn test_full_response() {
        let assessment = parse_response(
            r#"{"relevance_score": 85, "decision": "YES", "reasoning": "On topic.",
                "most_relevant_citation": {"title": "Cashew wine", "author": "Silva"}}"#,
        );
        assert_eq!(
            assessment,
            Assessment {
                score: Some(85),
                verdict: "YES".to_string(),
                reasoning: "On topic.".to_string(),
                citation: Some("Cashew wine (Silva)".to_string()),
            }
        );
        assert_eq!(assessment.destination(70), Destination::Match);
    }

    #[test]
    fn test_positive_verdicts_case_insensitive() {
        for verdict in ["yes", "Sim", "RELEVANT", "include"] {
            let assessment = parse_response(&format!(r#"{{"decision": "{verdict}", "score": 0}}"#));
            assert_eq!(assessment.destination(70), Destination::Match, "{verdict}");
        }
    }

    #[test]
    fn test_score_threshold_is_inclusive() {
        let at = parse_response(r#"{"decision": "NO", "relevance_score": 70}"#);
        let below = parse_response(r#"{"decision": "NO", "relevance_score": 69}"#);
        assert_eq!(at.destination(70), Destination::Match);
        assert_eq!(below.destination(70), Destination::NoMatch);
    }

    #[test]
    fn test_lenient_fields() {
        let assessment = parse_response(
            r#"{"score": "92.4", "decision": "no", "justification": "x", "suggested_citation": "Doe 2020"}"#,
        );
        assert_eq!(assessment.score, Some(92));
        assert_eq!(assessment.reasoning, "x");
        assert_eq!(assessment.citation.as_deref(), Some("Doe 2020"));

        let clamped = parse_response(r#"{"relevance_score": 250}"#);
        assert_eq!(clamped.score, Some(100));
        assert_eq!(clamped.verdict, UNKNOWN_VERDICT);
    }

    #[test]
    fn test_unparseable_becomes_unknown() {
        let raw = "I think this paper is relevant.";
        let assessment = parse_response(raw);
        assert_eq!(assessment.verdict, UNKNOWN_VERDICT);
        assert_eq!(assessment.reasoning, raw);
        assert_eq!(assessment.destination(70), Destination::NoMatch);
    }
}

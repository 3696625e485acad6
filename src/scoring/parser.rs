//! Model-response parsing with a deterministic fallback.
//!
//! A malformed response never fails the job: the fallback extracts the
//! first integer following `"score"`, defaults to 50, and annotates the
//! notes so the history row records that fallback parsing was used.

use regex::Regex;
use std::sync::OnceLock;

use crate::domain::{ModelScore, ModelVerdict};

/// Notes annotation appended whenever the fallback parser answered.
pub const FALLBACK_NOTE: &str = "fallback parsing used";

/// Score reported when nothing usable can be extracted or the value is out
/// of range.
const DEFAULT_SCORE: u8 = 50;

fn score_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""score"\s*:?\s*(\d+)"#).expect("score regex"))
}

/// Strict parse into the tagged verdict. Markdown fences are tolerated;
/// anything else non-conforming is preserved as `Malformed`.
pub fn parse_model_response(raw: &str) -> ModelVerdict {
    let cleaned = strip_code_fences(raw);
    let Some(start) = cleaned.find('{') else {
        return ModelVerdict::Malformed(raw.to_string());
    };
    let Some(end) = cleaned.rfind('}') else {
        return ModelVerdict::Malformed(raw.to_string());
    };
    match serde_json::from_str::<ModelScore>(&cleaned[start..=end]) {
        Ok(score) => ModelVerdict::Parsed(score),
        Err(_) => ModelVerdict::Malformed(raw.to_string()),
    }
}

/// Resolved scoring output, after validation and any fallback.
#[derive(Debug, Clone)]
pub struct ResolvedScore {
    pub score: u8,
    pub notes: String,
    /// Model breakdown dims; zeroed when the response was malformed.
    pub legitimacy: i64,
    pub completeness: i64,
    pub relevance: i64,
    pub fallback_used: bool,
}

/// Turn a raw model response into a validated score.
///
/// Parsed scores outside 0..=100 are replaced by the default; malformed
/// responses go through the regex fallback.
pub fn resolve_score(raw: &str) -> ResolvedScore {
    match parse_model_response(raw) {
        ModelVerdict::Parsed(parsed) => {
            let (score, notes) = if (0..=100).contains(&parsed.score) {
                (parsed.score as u8, parsed.notes)
            } else {
                (
                    DEFAULT_SCORE,
                    annotate(&parsed.notes, "score out of range, default applied"),
                )
            };
            ResolvedScore {
                score,
                notes,
                legitimacy: parsed.breakdown.legitimacy,
                completeness: parsed.breakdown.completeness,
                relevance: parsed.breakdown.relevance,
                fallback_used: false,
            }
        }
        ModelVerdict::Malformed(raw) => {
            let score = score_regex()
                .captures(&raw)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<i64>().ok())
                .filter(|s| (0..=100).contains(s))
                .map(|s| s as u8)
                .unwrap_or(DEFAULT_SCORE);
            ResolvedScore {
                score,
                notes: FALLBACK_NOTE.to_string(),
                legitimacy: 0,
                completeness: 0,
                relevance: 0,
                fallback_used: true,
            }
        }
    }
}

fn annotate(notes: &str, annotation: &str) -> String {
    if notes.is_empty() {
        annotation.to_string()
    } else {
        format!("{notes} ({annotation})")
    }
}

fn strip_code_fences(raw: &str) -> String {
    let trimmed = raw.trim();
    if let Some(rest) = trimmed.strip_prefix("```") {
        let rest = rest.strip_prefix("json").unwrap_or(rest);
        let rest = rest.trim_start_matches('\n');
        if let Some(end) = rest.rfind("```") {
            return rest[..end].trim().to_string();
        }
        return rest.trim().to_string();
    }
    trimmed.to_string()
}

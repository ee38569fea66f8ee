//! Prompt construction and response parsing for one batch.

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::warn;

use crate::client::{ChatMessage, ClientError};
use crate::domain::analysis::lenient_f64;
use crate::domain::{Batch, CommentAnalysis, SentimentCategory};

const SYSTEM_PROMPT: &str = r#"You analyze customer comments for a customer-experience team.
Comments may be in Spanish or English. Answer with a single JSON object and nothing else:

{
  "summary": {
    "overall_trend": "positive" | "neutral" | "negative",
    "confidence": number between 0 and 1,
    "key_themes": [string]
  },
  "comments": [
    {
      "index": number (the comment's number in the list),
      "sentiment": "positive" | "neutral" | "negative",
      "confidence": number between 0 and 1,
      "emotions": [{"type": string, "intensity": number between 0 and 1}],
      "themes": [{"category": string, "relevance": number between 0 and 1}],
      "pain_points": [{"type": string, "severity": number between 0 and 1}],
      "urgency": "low" | "medium" | "high"
    }
  ]
}

Rules:
- Return exactly one entry in "comments" per numbered comment, in the same order.
- Emotions: joy, satisfaction, gratitude, trust, surprise, anticipation, confusion,
  frustration, anger, sadness, fear, disappointment.
- Theme categories: service, customer_support, product, quality, price, delivery,
  usability, communication, staff, facilities, other.
- Pain point types: wait_time, poor_service, product_defect, billing, communication,
  availability, usability, other. Use an empty list when there is none.
- All scores are decimals in [0, 1], never percentages."#;

pub fn system_prompt() -> &'static str {
    SYSTEM_PROMPT
}

/// Number the batch's comments `1..k`.
pub fn user_prompt(batch: &Batch) -> String {
    let mut prompt = format!(
        "Analyze the following {} customer comments:\n\n",
        batch.len()
    );
    for (i, text) in batch.texts().enumerate() {
        let single_line = text.split_whitespace().collect::<Vec<_>>().join(" ");
        prompt.push_str(&format!("{}. {}\n", i + 1, single_line));
    }
    prompt
}

pub fn build_messages(batch: &Batch) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(user_prompt(batch)),
    ]
}

/// Parsed model output for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedBatch {
    pub overall_trend: SentimentCategory,
    pub summary_confidence: Option<f64>,
    pub key_themes: Vec<String>,
    /// At most `batch.len()` entries, in prompt order.
    pub comments: Vec<CommentAnalysis>,
    /// Entries the model left out.
    pub missing: usize,
    /// Surplus entries dropped.
    pub truncated: usize,
}

#[derive(Debug, Default, Deserialize)]
struct WireBatch {
    #[serde(default)]
    summary: WireSummary,
    #[serde(default, alias = "analyses", alias = "results", alias = "comentarios")]
    comments: Vec<CommentAnalysis>,
}

#[derive(Debug, Default, Deserialize)]
struct WireSummary {
    #[serde(default, alias = "trend", alias = "sentiment")]
    overall_trend: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    confidence: Option<f64>,
    #[serde(default)]
    key_themes: Vec<String>,
}

fn fence_regex() -> Option<&'static Regex> {
    static FENCE: OnceLock<Option<Regex>> = OnceLock::new();
    FENCE
        .get_or_init(|| Regex::new(r"(?s)^\s*```[A-Za-z]*\s*(.*?)\s*```\s*$").ok())
        .as_ref()
}

/// Remove a surrounding markdown code fence, if any.
pub fn strip_code_fences(content: &str) -> &str {
    fence_regex()
        .and_then(|re| re.captures(content))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .unwrap_or_else(|| content.trim())
}

/// Parse a model reply for `batch`.
///
/// Code fences and prose around the JSON object are tolerated. Surplus
/// entries are truncated; missing ones are logged and tolerated.
pub fn parse_batch_response(content: &str, batch: &Batch) -> Result<ParsedBatch, ClientError> {
    let body = strip_code_fences(content);
    let wire: WireBatch = match serde_json::from_str(body) {
        Ok(wire) => wire,
        Err(first) => {
            let embedded = match (body.find('{'), body.rfind('}')) {
                (Some(start), Some(end)) if start < end => &body[start..=end],
                _ => return Err(ClientError::Parse(first.to_string())),
            };
            serde_json::from_str(embedded).map_err(|_| ClientError::Parse(first.to_string()))?
        }
    };

    if wire.comments.is_empty() && !batch.is_empty() {
        return Err(ClientError::Parse(
            "response contains no per-comment analyses".to_string(),
        ));
    }

    let mut comments = wire.comments;
    let expected = batch.len();
    let truncated = comments.len().saturating_sub(expected);
    let missing = expected.saturating_sub(comments.len());
    if truncated > 0 {
        warn!(
            batch = batch.index,
            expected,
            received = comments.len(),
            "model returned more analyses than comments; truncating"
        );
        comments.truncate(expected);
    }
    if missing > 0 {
        warn!(
            batch = batch.index,
            expected,
            received = comments.len(),
            "model returned fewer analyses than comments"
        );
    }

    let overall_trend = SentimentCategory::parse_label(&wire.summary.overall_trend)
        .unwrap_or_else(|| majority_trend(&comments));

    Ok(ParsedBatch {
        overall_trend,
        summary_confidence: wire.summary.confidence,
        key_themes: wire.summary.key_themes,
        comments,
        missing,
        truncated,
    })
}

/// Majority sentiment of the entries, ties going to neutral.
fn majority_trend(comments: &[CommentAnalysis]) -> SentimentCategory {
    let mut counts = [0usize; 3];
    for c in comments {
        match c.sentiment_category() {
            SentimentCategory::Positive => counts[0] += 1,
            SentimentCategory::Neutral => counts[1] += 1,
            SentimentCategory::Negative => counts[2] += 1,
        }
    }
    if counts[0] > counts[1] && counts[0] > counts[2] {
        SentimentCategory::Positive
    } else if counts[2] > counts[0] && counts[2] > counts[1] {
        SentimentCategory::Negative
    } else {
        SentimentCategory::Neutral
    }
}

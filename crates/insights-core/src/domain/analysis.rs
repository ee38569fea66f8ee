//! Raw per-batch analysis as returned by the model, before domain mapping.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};

use super::comment::Batch;
use super::value_objects::{EmotionKind, ThemeCategory};

/// Sentiment polarity of a comment or a whole batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SentimentCategory {
    Positive,
    Neutral,
    Negative,
}

impl SentimentCategory {
    pub const ALL: [SentimentCategory; 3] = [
        SentimentCategory::Positive,
        SentimentCategory::Neutral,
        SentimentCategory::Negative,
    ];

    /// Parse a model label (English or Spanish). `None` for anything unrecognised.
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "positive" | "positivo" | "positiva" | "pos" => Some(Self::Positive),
            "neutral" | "neutro" | "neutra" | "mixed" | "mixto" | "mixta" => Some(Self::Neutral),
            "negative" | "negativo" | "negativa" | "neg" => Some(Self::Negative),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Positive => "positive",
            Self::Neutral => "neutral",
            Self::Negative => "negative",
        }
    }
}

impl fmt::Display for SentimentCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How quickly a comment needs follow-up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Low,
    Medium,
    High,
}

impl Urgency {
    pub fn parse_label(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "low" | "baja" | "bajo" => Some(Self::Low),
            "medium" | "media" | "medio" | "moderate" => Some(Self::Medium),
            "high" | "alta" | "alto" | "urgent" | "critical" | "critica" | "crítica" => {
                Some(Self::High)
            }
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A score brought into `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalizedScore {
    pub value: f64,
    /// `true` when the raw value had to be rescaled or clamped.
    pub adjusted: bool,
}

/// Bring a model-supplied score into `[0, 1]`.
///
/// Values in `(1, 100]` are read as percentages; anything else outside the unit
/// interval is clamped. Non-finite input yields `None`.
pub fn normalize_score(raw: f64) -> Option<NormalizedScore> {
    if !raw.is_finite() {
        return None;
    }
    if (0.0..=1.0).contains(&raw) {
        return Some(NormalizedScore {
            value: raw,
            adjusted: false,
        });
    }
    let value = if raw > 1.0 && raw <= 100.0 {
        raw / 100.0
    } else {
        raw.clamp(0.0, 1.0)
    };
    Some(NormalizedScore {
        value,
        adjusted: true,
    })
}

/// Accept numbers, numeric strings and `null` for score fields.
pub(crate) fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(serde_json::Value::Number(n)) => n.as_f64(),
        Some(serde_json::Value::String(s)) => s.trim().trim_end_matches('%').parse().ok(),
        _ => None,
    })
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawEmotion {
    #[serde(rename = "type", alias = "emotion", alias = "name", default)]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub intensity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawTheme {
    #[serde(alias = "theme", alias = "name", default)]
    pub category: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub relevance: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPainPoint {
    #[serde(rename = "type", alias = "pain_point", alias = "name", default)]
    pub kind: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub severity: Option<f64>,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: Option<f64>,
}

/// One per-comment record from the model, kept lenient on purpose: the domain
/// mapper decides what survives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommentAnalysis {
    #[serde(default)]
    pub index: Option<usize>,
    #[serde(default)]
    pub sentiment: String,
    #[serde(default, deserialize_with = "lenient_f64")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub emotions: Vec<RawEmotion>,
    #[serde(default)]
    pub themes: Vec<RawTheme>,
    #[serde(default)]
    pub pain_points: Vec<RawPainPoint>,
    #[serde(default)]
    pub urgency: Option<String>,
}

impl CommentAnalysis {
    /// Sentiment category, defaulting to neutral for unknown labels.
    pub fn sentiment_category(&self) -> SentimentCategory {
        SentimentCategory::parse_label(&self.sentiment).unwrap_or(SentimentCategory::Neutral)
    }

    /// Confidence in `[0, 1]`, if the model supplied a usable one.
    pub fn normalized_confidence(&self) -> Option<f64> {
        self.confidence
            .and_then(normalize_score)
            .map(|score| score.value)
    }
}

/// Token accounting reported by the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

impl std::ops::Add for TokenUsage {
    type Output = TokenUsage;

    fn add(self, rhs: TokenUsage) -> TokenUsage {
        TokenUsage {
            prompt_tokens: self.prompt_tokens + rhs.prompt_tokens,
            completion_tokens: self.completion_tokens + rhs.completion_tokens,
            total_tokens: self.total_tokens + rhs.total_tokens,
        }
    }
}

/// Parsed response for one batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    pub batch_index: usize,
    /// Number of comments that were sent in the batch.
    pub batch_size: usize,
    pub overall_trend: SentimentCategory,
    pub summary_confidence: Option<f64>,
    /// Per-comment records, positionally paired with the batch's comments.
    /// May be shorter than `batch_size` when the model returned fewer entries.
    pub comments: Vec<CommentAnalysis>,
    pub usage: TokenUsage,
    pub elapsed_ms: u64,
    pub attempts: u32,
    pub temperature: f64,
    /// Accepted although the confidence stayed under the threshold.
    pub low_confidence: bool,
    /// Synthesised stand-in, not a model response.
    pub fallback: bool,
}

impl BatchResult {
    /// Mean per-comment confidence; falls back to the summary confidence, then 0.
    pub fn confidence(&self) -> f64 {
        let scores: Vec<f64> = self
            .comments
            .iter()
            .filter_map(CommentAnalysis::normalized_confidence)
            .collect();
        if scores.is_empty() {
            return self
                .summary_confidence
                .and_then(normalize_score)
                .map(|s| s.value)
                .unwrap_or(0.0);
        }
        scores.iter().sum::<f64>() / scores.len() as f64
    }

    pub fn sentiment_counts(&self) -> BTreeMap<SentimentCategory, usize> {
        let mut counts = BTreeMap::new();
        for analysis in &self.comments {
            *counts.entry(analysis.sentiment_category()).or_insert(0) += 1;
        }
        counts
    }

    /// Theme category -> summed relevance. Labels fold into [`ThemeCategory`].
    pub fn theme_weights(&self) -> BTreeMap<String, f64> {
        let mut weights = BTreeMap::new();
        for theme in self.comments.iter().flat_map(|c| &c.themes) {
            add_weight(&mut weights, &theme.category, theme.relevance, |label| {
                ThemeCategory::from_label(label).as_str()
            });
        }
        weights
    }

    /// Emotion kind -> summed intensity. Labels fold into [`EmotionKind`].
    pub fn emotion_weights(&self) -> BTreeMap<String, f64> {
        let mut weights = BTreeMap::new();
        for emotion in self.comments.iter().flat_map(|c| &c.emotions) {
            add_weight(&mut weights, &emotion.kind, emotion.intensity, |label| {
                EmotionKind::from_label(label).as_str()
            });
        }
        weights
    }

    /// Neutral stand-in used when every real attempt for a file failed.
    pub fn fallback_for(batch: &Batch) -> Self {
        Self {
            batch_index: batch.index,
            batch_size: batch.len(),
            overall_trend: SentimentCategory::Neutral,
            summary_confidence: Some(0.0),
            comments: (0..batch.len())
                .map(|i| CommentAnalysis {
                    index: Some(i + 1),
                    sentiment: SentimentCategory::Neutral.as_str().to_string(),
                    confidence: Some(0.0),
                    ..CommentAnalysis::default()
                })
                .collect(),
            usage: TokenUsage::default(),
            elapsed_ms: 0,
            attempts: 0,
            temperature: 0.0,
            low_confidence: true,
            fallback: true,
        }
    }
}

fn add_weight(
    weights: &mut BTreeMap<String, f64>,
    label: &str,
    raw: Option<f64>,
    category: impl Fn(&str) -> &'static str,
) {
    let label = label.trim();
    if label.is_empty() {
        return;
    }
    let value = raw.and_then(normalize_score).map(|s| s.value).unwrap_or(0.0);
    *weights.entry(category(label).to_string()).or_insert(0.0) += value;
}

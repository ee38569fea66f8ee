//! Raw model records -> validated domain value objects.
//!
//! Scores are normalised before the strict factories run: values on a 0–100
//! scale are divided by 100, other out-of-range finite values are clamped, and
//! each adjustment is logged. A record whose score is missing or not a number
//! is skipped on its own; it never takes the rest of the comment down with it.
//! Unknown labels map to the `Other` kind of each category.

use crate::domain::{
    normalize_score, Batch, BatchResult, CommentAnalysis, CommentInsight, DomainAnalysis, Emotion,
    EmotionKind, MappingStats, PainPoint, PainPointKind, Sentiment, Theme, ThemeCategory, Urgency,
    ValidationError,
};
use crate::obs;

/// Result of mapping one raw record.
#[derive(Debug, Clone, PartialEq)]
pub struct MappedComment {
    pub analysis: DomainAnalysis,
    pub adjusted_values: usize,
    pub skipped_records: usize,
}

struct Normalizer {
    adjusted: usize,
}

impl Normalizer {
    /// `None` when the record should be skipped.
    fn score(&mut self, field: &'static str, raw: Option<f64>) -> Option<f64> {
        let raw = raw?;
        let score = normalize_score(raw)?;
        if score.adjusted {
            self.adjusted += 1;
            obs::emit_record_adjusted(field, raw, score.value);
        }
        Some(score.value)
    }

    /// Optional per-record confidence, defaulting to the comment's.
    fn confidence(&mut self, field: &'static str, raw: Option<f64>, default: f64) -> f64 {
        match raw {
            Some(_) => self.score(field, raw).unwrap_or(default),
            None => default,
        }
    }
}

/// Map one raw per-comment record.
pub fn map_comment(raw: &CommentAnalysis) -> MappedComment {
    let mut norm = Normalizer { adjusted: 0 };
    let mut skipped = 0;

    let confidence = norm.score("sentiment.confidence", raw.confidence).unwrap_or(0.0);
    let sentiment = Sentiment::new(raw.sentiment_category(), confidence)
        .unwrap_or_else(|_| Sentiment::unscored(raw.sentiment_category()));

    let mut emotions = Vec::new();
    for e in &raw.emotions {
        let Some(intensity) = norm.score("emotion.intensity", e.intensity) else {
            skipped += 1;
            continue;
        };
        let Ok(label) = ValidationError::check_label("emotion.type", &e.kind) else {
            skipped += 1;
            continue;
        };
        let conf = norm.confidence("emotion.confidence", e.confidence, confidence);
        match Emotion::new(EmotionKind::from_label(label), intensity, conf) {
            Ok(emotion) => emotions.push(emotion),
            Err(_) => skipped += 1,
        }
    }

    let mut themes = Vec::new();
    for t in &raw.themes {
        let Some(relevance) = norm.score("theme.relevance", t.relevance) else {
            skipped += 1;
            continue;
        };
        let Ok(label) = ValidationError::check_label("theme.category", &t.category) else {
            skipped += 1;
            continue;
        };
        let conf = norm.confidence("theme.confidence", t.confidence, confidence);
        match Theme::new(ThemeCategory::from_label(label), relevance, conf) {
            Ok(theme) => themes.push(theme),
            Err(_) => skipped += 1,
        }
    }

    let mut pain_points = Vec::new();
    for p in &raw.pain_points {
        let Some(severity) = norm.score("pain_point.severity", p.severity) else {
            skipped += 1;
            continue;
        };
        let Ok(label) = ValidationError::check_label("pain_point.type", &p.kind) else {
            skipped += 1;
            continue;
        };
        let conf = norm.confidence("pain_point.confidence", p.confidence, confidence);
        match PainPoint::new(PainPointKind::from_label(label), severity, conf) {
            Ok(point) => pain_points.push(point),
            Err(_) => skipped += 1,
        }
    }

    let urgency = raw.urgency.as_deref().and_then(Urgency::parse_label);

    MappedComment {
        analysis: DomainAnalysis::new(sentiment, emotions, themes, pain_points, urgency),
        adjusted_values: norm.adjusted,
        skipped_records: skipped,
    }
}

/// Pair each comment of `batch` with its record in `result` and map it.
///
/// Records carrying a complete, distinct set of `index` values (1-based) are
/// paired by index; otherwise by position. Comments without a record, or
/// whose batch failed (`result == None`), get no analysis.
pub fn map_batch(batch: &Batch, result: Option<&BatchResult>) -> (Vec<CommentInsight>, MappingStats) {
    let mut stats = MappingStats::default();
    let records = result.map(|r| pair_records(batch.len(), &r.comments));
    let low_confidence = result.is_some_and(|r| r.low_confidence);

    let insights = batch
        .comments
        .iter()
        .enumerate()
        .map(|(pos, comment)| {
            let raw = records.as_ref().and_then(|r| r[pos]);
            let analysis = raw.map(|raw| {
                let mapped = map_comment(raw);
                stats.adjusted_values += mapped.adjusted_values;
                stats.skipped_records += mapped.skipped_records;
                mapped.analysis
            });
            if analysis.is_some() {
                stats.mapped_comments += 1;
            } else {
                stats.unmapped_comments += 1;
            }
            CommentInsight {
                comment: comment.clone(),
                analysis,
                batch_index: batch.index,
                low_confidence,
            }
        })
        .collect();

    (insights, stats)
}

fn pair_records(len: usize, records: &[CommentAnalysis]) -> Vec<Option<&CommentAnalysis>> {
    let mut by_index: Vec<Option<&CommentAnalysis>> = vec![None; len];
    let mut indexed = !records.is_empty();
    for record in records {
        match record.index {
            Some(i) if (1..=len).contains(&i) && by_index[i - 1].is_none() => {
                by_index[i - 1] = Some(record);
            }
            _ => {
                indexed = false;
                break;
            }
        }
    }
    if indexed {
        return by_index;
    }
    (0..len).map(|pos| records.get(pos)).collect()
}

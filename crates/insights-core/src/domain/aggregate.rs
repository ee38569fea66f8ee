//! File-level results: the aggregate summary and the per-comment insights.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::analysis::{SentimentCategory, TokenUsage};
use super::comment::Comment;
use super::value_objects::DomainAnalysis;

/// Union of all surviving batch results for one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AggregatedResult {
    /// Sum of surviving batch sizes; lower than the file's comment count when
    /// batches were aborted.
    pub total_comments: usize,
    /// Count per category; every category is present, possibly with 0.
    pub distribution: BTreeMap<SentimentCategory, usize>,
    pub dominant_trend: SentimentCategory,
    /// Theme label -> summed relevance.
    pub themes: BTreeMap<String, f64>,
    /// Emotion label -> summed intensity.
    pub emotions: BTreeMap<String, f64>,
    /// Unweighted mean of per-batch confidences.
    pub overall_confidence: f64,
    pub usage: TokenUsage,
    pub elapsed_ms: u64,
    pub batches_total: usize,
    pub batches_failed: usize,
    pub low_confidence_batches: usize,
    pub fallback_used: bool,
}

impl AggregatedResult {
    pub fn count(&self, category: SentimentCategory) -> usize {
        self.distribution.get(&category).copied().unwrap_or(0)
    }

    /// Share of counted comments in `category`, in `[0, 1]`.
    pub fn share(&self, category: SentimentCategory) -> f64 {
        if self.total_comments == 0 {
            return 0.0;
        }
        self.count(category) as f64 / self.total_comments as f64
    }

    pub fn top_themes(&self, n: usize) -> Vec<(String, f64)> {
        top_n(&self.themes, n)
    }

    pub fn top_emotions(&self, n: usize) -> Vec<(String, f64)> {
        top_n(&self.emotions, n)
    }

    pub fn is_complete(&self) -> bool {
        self.batches_failed == 0 && !self.fallback_used
    }
}

/// Highest weights first; equal weights keep label order.
fn top_n(weights: &BTreeMap<String, f64>, n: usize) -> Vec<(String, f64)> {
    let mut entries: Vec<(String, f64)> = weights
        .iter()
        .map(|(label, weight)| (label.clone(), *weight))
        .collect();
    entries.sort_by(|a, b| b.1.total_cmp(&a.1));
    entries.truncate(n);
    entries
}

/// Counts produced by the domain mapper for one file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MappingStats {
    pub mapped_comments: usize,
    /// Comments with no analysis (dropped batch or short model response).
    pub unmapped_comments: usize,
    /// Scores that had to be rescaled or clamped.
    pub adjusted_values: usize,
    /// Emotion/theme/pain-point records that could not be mapped.
    pub skipped_records: usize,
}

impl MappingStats {
    pub fn merge(&mut self, other: MappingStats) {
        self.mapped_comments += other.mapped_comments;
        self.unmapped_comments += other.unmapped_comments;
        self.adjusted_values += other.adjusted_values;
        self.skipped_records += other.skipped_records;
    }
}

/// One input comment together with its validated analysis, if any.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CommentInsight {
    pub comment: Comment,
    pub analysis: Option<DomainAnalysis>,
    /// Index of the batch the comment was sent in.
    pub batch_index: usize,
    pub low_confidence: bool,
}

/// Everything produced for one analysed file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileAnalysis {
    pub analysis_id: Uuid,
    pub model: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub aggregate: AggregatedResult,
    /// Ordered by source row.
    pub comments: Vec<CommentInsight>,
    pub mapping: MappingStats,
}

impl FileAnalysis {
    pub fn analyzed(&self) -> impl Iterator<Item = &CommentInsight> {
        self.comments.iter().filter(|c| c.analysis.is_some())
    }

    pub fn critical_comments(&self) -> impl Iterator<Item = &CommentInsight> {
        self.comments.iter().filter(|c| {
            c.analysis
                .as_ref()
                .is_some_and(DomainAnalysis::has_critical_pain_point)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AggregatedResult {
        let mut distribution = BTreeMap::new();
        distribution.insert(SentimentCategory::Positive, 3);
        distribution.insert(SentimentCategory::Neutral, 0);
        distribution.insert(SentimentCategory::Negative, 1);
        let mut themes = BTreeMap::new();
        themes.insert("price".to_string(), 0.4);
        themes.insert("service".to_string(), 1.6);
        themes.insert("delivery".to_string(), 0.9);
        AggregatedResult {
            total_comments: 4,
            distribution,
            dominant_trend: SentimentCategory::Positive,
            themes,
            emotions: BTreeMap::new(),
            overall_confidence: 0.8,
            usage: TokenUsage::default(),
            elapsed_ms: 10,
            batches_total: 1,
            batches_failed: 0,
            low_confidence_batches: 0,
            fallback_used: false,
        }
    }

    #[test]
    fn test_share_and_count() {
        let agg = sample();
        assert_eq!(agg.count(SentimentCategory::Positive), 3);
        assert!((agg.share(SentimentCategory::Negative) - 0.25).abs() < 1e-9);
        assert!(agg.is_complete());
    }

    #[test]
    fn test_top_themes_ordered_by_weight() {
        let top = sample().top_themes(2);
        assert_eq!(top[0].0, "service");
        assert_eq!(top[1].0, "delivery");
        assert_eq!(top.len(), 2);
    }

    #[test]
    fn test_mapping_stats_merge() {
        let mut a = MappingStats {
            mapped_comments: 2,
            adjusted_values: 1,
            ..MappingStats::default()
        };
        a.merge(MappingStats {
            mapped_comments: 3,
            skipped_records: 2,
            ..MappingStats::default()
        });
        assert_eq!(a.mapped_comments, 5);
        assert_eq!(a.skipped_records, 2);
        assert_eq!(a.adjusted_values, 1);
    }
}

//! Merge surviving batch results into one file-level summary.
//!
//! Aggregation is a pure fold: batch order does not matter and calling it twice
//! on the same input yields the same value.

use std::collections::BTreeMap;

use crate::domain::{AggregatedResult, BatchResult, SentimentCategory, TokenUsage};

/// Aggregate `results`, the batches that survived out of `batches_total`.
///
/// Aborted batches are simply absent, so `total_comments` only counts
/// comments whose batch produced a result.
pub fn aggregate(results: &[BatchResult], batches_total: usize) -> AggregatedResult {
    let mut distribution: BTreeMap<SentimentCategory, usize> =
        SentimentCategory::ALL.iter().map(|c| (*c, 0)).collect();
    let mut themes = BTreeMap::new();
    let mut emotions = BTreeMap::new();
    let mut usage = TokenUsage::default();
    let mut total_comments = 0;
    let mut elapsed_ms = 0;
    let mut confidence_sum = 0.0;

    for result in results {
        total_comments += result.batch_size;
        for (category, count) in result.sentiment_counts() {
            *distribution.entry(category).or_insert(0) += count;
        }
        merge_weights(&mut themes, result.theme_weights());
        merge_weights(&mut emotions, result.emotion_weights());
        usage = usage + result.usage;
        elapsed_ms += result.elapsed_ms;
        confidence_sum += result.confidence();
    }

    let overall_confidence = if results.is_empty() {
        0.0
    } else {
        confidence_sum / results.len() as f64
    };

    AggregatedResult {
        total_comments,
        dominant_trend: dominant_trend(&distribution),
        distribution,
        themes,
        emotions,
        overall_confidence,
        usage,
        elapsed_ms,
        batches_total,
        batches_failed: batches_total.saturating_sub(results.len()),
        low_confidence_batches: results.iter().filter(|r| r.low_confidence).count(),
        fallback_used: results.iter().any(|r| r.fallback),
    }
}

/// Category with the largest count; any tie at the top goes to neutral.
pub fn dominant_trend(distribution: &BTreeMap<SentimentCategory, usize>) -> SentimentCategory {
    let max = distribution.values().copied().max().unwrap_or(0);
    let leaders: Vec<SentimentCategory> = distribution
        .iter()
        .filter(|(_, count)| **count == max)
        .map(|(category, _)| *category)
        .collect();
    match leaders.as_slice() {
        [only] if max > 0 => *only,
        _ => SentimentCategory::Neutral,
    }
}

fn merge_weights(into: &mut BTreeMap<String, f64>, from: BTreeMap<String, f64>) {
    for (label, weight) in from {
        *into.entry(label).or_insert(0.0) += weight;
    }
}

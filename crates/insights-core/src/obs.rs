//! Structured lifecycle events for one file analysis.
//!
//! - `AnalysisSpan` RAII guard tagging everything with `analysis_id`
//! - `emit_*` functions for file start/finish, batch attempts, retry decisions,
//!   completions, aborts, fallback and mapping adjustments
//!
//! Events carry an `event` field (`batch.aborted`, ...) so JSON logs can be
//! filtered on it.

use tracing::{info, warn};

/// RAII guard that enters a span tagged with the analysis id.
///
/// ```ignore
/// let _span = AnalysisSpan::enter("0d1c...");
/// // every event below now carries analysis_id
/// ```
pub struct AnalysisSpan {
    _span: tracing::span::EnteredSpan,
}

impl AnalysisSpan {
    pub fn enter(analysis_id: &str) -> Self {
        Self {
            _span: analysis_span(analysis_id).entered(),
        }
    }
}

/// Span for async work of one analysis; attach with `Instrument::instrument`.
pub fn analysis_span(analysis_id: &str) -> tracing::Span {
    tracing::info_span!("insights.analysis", analysis_id = %analysis_id)
}

pub fn emit_file_started(
    analysis_id: &str,
    model: &str,
    comments: usize,
    batches: usize,
    batch_size: usize,
    parallel: bool,
) {
    info!(
        event = "file.started",
        analysis_id = %analysis_id,
        model = %model,
        comments = comments,
        batches = batches,
        batch_size = batch_size,
        parallel = parallel,
    );
}

pub fn emit_batch_attempt(batch: usize, attempt: u32, temperature: f64, cached: bool) {
    info!(
        event = "batch.attempt",
        batch = batch,
        attempt = attempt,
        temperature = temperature,
        cached = cached,
    );
}

/// Retry controller verdict for one attempt.
pub fn emit_retry_decision(
    batch: usize,
    attempt: u32,
    decision: &str,
    confidence: Option<f64>,
    error: Option<&dyn std::fmt::Display>,
) {
    match error {
        Some(error) => info!(
            event = "batch.retry_decision",
            batch = batch,
            attempt = attempt,
            decision = %decision,
            error = %error,
        ),
        None => info!(
            event = "batch.retry_decision",
            batch = batch,
            attempt = attempt,
            decision = %decision,
            confidence = confidence.unwrap_or_default(),
        ),
    }
}

pub fn emit_batch_completed(
    batch: usize,
    attempts: u32,
    confidence: f64,
    low_confidence: bool,
    tokens: u64,
) {
    info!(
        event = "batch.completed",
        batch = batch,
        attempts = attempts,
        confidence = confidence,
        low_confidence = low_confidence,
        tokens = tokens,
    );
}

/// A batch was given up on; its comments are missing from the aggregate.
pub fn emit_batch_aborted(
    batch: usize,
    attempts: u32,
    comments_dropped: usize,
    reason: &dyn std::fmt::Display,
) {
    warn!(
        event = "batch.aborted",
        batch = batch,
        attempts = attempts,
        comments_dropped = comments_dropped,
        reason = %reason,
    );
}

pub fn emit_fallback_used(batches: usize, comments: usize) {
    warn!(
        event = "file.fallback_used",
        batches = batches,
        comments = comments,
        "every batch failed; neutral stand-in results synthesized"
    );
}

pub fn emit_file_finished(
    analysis_id: &str,
    duration_ms: u64,
    total_comments: usize,
    batches_total: usize,
    batches_failed: usize,
) {
    info!(
        event = "file.finished",
        analysis_id = %analysis_id,
        duration_ms = duration_ms,
        total_comments = total_comments,
        batches_total = batches_total,
        batches_failed = batches_failed,
    );
}

/// A model-supplied score had to be rescaled or clamped.
pub fn emit_record_adjusted(field: &str, raw: f64, value: f64) {
    warn!(
        event = "mapping.record_adjusted",
        field = %field,
        raw = raw,
        value = value,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analysis_span_create() {
        let _span = AnalysisSpan::enter("test-analysis-id");
    }
}

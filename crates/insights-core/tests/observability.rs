//! Structured lifecycle events for an analysis run.

use std::sync::Arc;

use insights_core::fakes::ScriptedChatClient;
use insights_core::obs::{
    emit_batch_aborted, emit_fallback_used, emit_file_started, emit_record_adjusted,
    emit_retry_decision,
};
use insights_core::{map_comment, AnalysisConfig, AnalysisPipeline, AnalysisSpan, ClientError, Comment};
use tracing_test::traced_test;

#[traced_test]
#[test]
fn test_file_started_carries_plan() {
    emit_file_started("a-1", "gpt-4o-mini", 45, 3, 20, false);
    assert!(logs_contain("file.started"));
    assert!(logs_contain("batch_size=20"));
}

#[traced_test]
#[test]
fn test_batch_aborted_reports_dropped_comments() {
    let err = ClientError::Server {
        status: 503,
        message: "overloaded".to_string(),
    };
    emit_batch_aborted(2, 4, 5, &err);
    assert!(logs_contain("batch.aborted"));
    assert!(logs_contain("comments_dropped=5"));
    assert!(logs_contain("WARN"));
}

#[traced_test]
#[test]
fn test_retry_decision_with_error() {
    let err = ClientError::Timeout { after_secs: 120 };
    emit_retry_decision(0, 1, "retry_standard", None, Some(&err));
    assert!(logs_contain("retry_standard"));
    assert!(logs_contain("timed out after 120s"));
}

#[traced_test]
#[test]
fn test_fallback_and_adjustment_warnings() {
    emit_fallback_used(3, 45);
    emit_record_adjusted("theme.relevance", 80.0, 0.8);
    assert!(logs_contain("file.fallback_used"));
    assert!(logs_contain("mapping.record_adjusted"));
}

#[traced_test]
#[test]
fn test_analysis_span_tags_events() {
    let _span = AnalysisSpan::enter("span-analysis-7");
    emit_file_started("span-analysis-7", "gpt-4o", 1, 1, 20, false);
    assert!(logs_contain("span-analysis-7"));
}

#[traced_test]
#[test]
fn test_mapper_logs_rescaled_scores() {
    let raw = serde_json::from_value(serde_json::json!({
        "sentiment": "positive",
        "confidence": 90
    }))
    .unwrap();
    let mapped = map_comment(&raw);
    assert_eq!(mapped.adjusted_values, 1);
    assert!(logs_contain("sentiment.confidence"));
}

#[traced_test]
#[tokio::test]
async fn test_pipeline_emits_lifecycle() {
    let pipeline = AnalysisPipeline::new(
        AnalysisConfig::default(),
        Arc::new(ScriptedChatClient::uniform("positive", 0.9)),
    );
    let analysis = pipeline
        .analyze(vec![Comment::new(1, "lovely shop, kind people")])
        .await
        .unwrap();

    assert!(logs_contain("file.started"));
    assert!(logs_contain("batch.attempt"));
    assert!(logs_contain("batch.completed"));
    assert!(logs_contain("file.finished"));
    assert!(logs_contain(&analysis.analysis_id.to_string()));
}

//! End-to-end pipeline runs against a scripted chat endpoint.

use std::sync::Arc;

use insights_core::fakes::{chat_response, numbered_comments, response_json, ScriptedChatClient};
use insights_core::{
    AnalysisConfig, AnalysisPipeline, ClientError, Comment, InsightsError, ResponseCache,
    SentimentCategory,
};

fn comments(texts: &[&str]) -> Vec<Comment> {
    texts
        .iter()
        .enumerate()
        .map(|(i, t)| Comment::new(i + 1, *t))
        .collect()
}

/// Sentiment follows the first word of each comment.
fn keyword_client() -> ScriptedChatClient {
    ScriptedChatClient::new(|request, _| {
        let entries: Vec<(&str, f64)> = numbered_comments(request)
            .iter()
            .map(|text| {
                let sentiment = if text.starts_with("good") {
                    "positive"
                } else if text.starts_with("bad") {
                    "negative"
                } else {
                    "neutral"
                };
                (sentiment, 0.9)
            })
            .collect();
        Ok(chat_response(response_json(&entries)))
    })
}

#[tokio::test]
async fn test_three_comment_file_ties_to_neutral() {
    let client = Arc::new(keyword_client());
    let pipeline = AnalysisPipeline::new(AnalysisConfig::default(), client.clone());

    let analysis = pipeline
        .analyze(comments(&[
            "good service, thank you",
            "it was okay I guess",
            "bad experience, slow staff",
        ]))
        .await
        .unwrap();

    let agg = &analysis.aggregate;
    assert_eq!(agg.total_comments, 3);
    for category in SentimentCategory::ALL {
        assert_eq!(agg.count(category), 1);
    }
    assert_eq!(agg.dominant_trend, SentimentCategory::Neutral);
    assert!(agg.is_complete());
    assert_eq!(client.calls(), 1);
    assert_eq!(analysis.model, "gpt-4o-mini");
    assert!(analysis.finished_at >= analysis.started_at);

    let request = &client.requests()[0];
    assert_eq!(request.seed, Some(42));
    assert_eq!(request.temperature, 0.0);
    assert!(request.json_mode);
}

#[tokio::test]
async fn test_mixed_confidences_accepted_at_threshold() {
    let client = Arc::new(ScriptedChatClient::new(|_, _| {
        Ok(chat_response(response_json(&[
            ("positive", 0.9),
            ("negative", 0.85),
            ("neutral", 0.5),
        ])))
    }));
    let config = AnalysisConfig {
        confidence_threshold: 0.5,
        ..AnalysisConfig::default()
    };
    let pipeline = AnalysisPipeline::new(config, client.clone());

    let analysis = pipeline
        .analyze(comments(&["great service", "terrible service", "ok service"]))
        .await
        .unwrap();

    assert_eq!(client.calls(), 1);
    let agg = &analysis.aggregate;
    assert_eq!(agg.total_comments, 3);
    for category in SentimentCategory::ALL {
        assert_eq!(agg.count(category), 1);
    }
    assert_eq!(agg.dominant_trend, SentimentCategory::Neutral);
    assert!((agg.overall_confidence - 0.75).abs() < 1e-9);
    assert_eq!(agg.low_confidence_batches, 0);

    let confidences: Vec<f64> = analysis
        .comments
        .iter()
        .map(|c| c.analysis.as_ref().unwrap().sentiment().confidence())
        .collect();
    assert_eq!(confidences, vec![0.9, 0.85, 0.5]);
}

#[tokio::test]
async fn test_empty_input_is_rejected() {
    let pipeline = AnalysisPipeline::new(
        AnalysisConfig::default(),
        Arc::new(ScriptedChatClient::uniform("positive", 0.9)),
    );
    let err = pipeline.analyze(Vec::new()).await.unwrap_err();
    assert!(matches!(err, InsightsError::EmptyInput));
}

#[tokio::test(start_paused = true)]
async fn test_parallel_run_keeps_row_order() {
    let config = AnalysisConfig {
        batch_size: 10,
        ..AnalysisConfig::default()
    };
    let client = Arc::new(keyword_client());
    let pipeline = AnalysisPipeline::new(config, client.clone());

    let input: Vec<Comment> = (1..=70)
        .map(|i| {
            let word = if i % 2 == 0 { "good" } else { "bad" };
            Comment::new(i, format!("{word} visit number {i}"))
        })
        .collect();
    assert!(pipeline.uses_parallel(&pipeline.plan(input.len())));

    let analysis = pipeline.analyze(input).await.unwrap();
    assert_eq!(client.calls(), 7);
    assert_eq!(analysis.aggregate.batches_total, 7);
    assert_eq!(analysis.aggregate.count(SentimentCategory::Positive), 35);
    assert_eq!(analysis.aggregate.count(SentimentCategory::Negative), 35);

    let rows: Vec<usize> = analysis.comments.iter().map(|c| c.comment.row).collect();
    assert_eq!(rows, (1..=70).collect::<Vec<_>>());
    for insight in &analysis.comments {
        let expected = if insight.comment.row % 2 == 0 {
            SentimentCategory::Positive
        } else {
            SentimentCategory::Negative
        };
        let got = insight.analysis.as_ref().map(|a| a.sentiment().category());
        assert_eq!(got, Some(expected), "row {}", insight.comment.row);
        assert_eq!(insight.batch_index, (insight.comment.row - 1) / 10);
    }
}

#[tokio::test(start_paused = true)]
async fn test_auth_failure_aborts_file() {
    let client = Arc::new(ScriptedChatClient::new(|_, _| {
        Err(ClientError::Auth {
            status: 401,
            message: "invalid api key".to_string(),
        })
    }));
    let config = AnalysisConfig {
        batch_size: 2,
        ..AnalysisConfig::default()
    };
    let pipeline = AnalysisPipeline::new(config, client.clone());

    let err = pipeline
        .analyze(comments(&["good one", "bad one", "another one", "last one"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        InsightsError::Client(ClientError::Auth { status: 401, .. })
    ));
    assert_eq!(client.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_total_failure_uses_neutral_fallback() {
    let client = Arc::new(ScriptedChatClient::new(|_, _| {
        Err(ClientError::InvalidRequest {
            status: 400,
            message: "maximum context length exceeded".to_string(),
        })
    }));
    let pipeline = AnalysisPipeline::new(AnalysisConfig::default(), client);

    let analysis = pipeline
        .analyze(comments(&["good one", "bad one"]))
        .await
        .unwrap();
    let agg = &analysis.aggregate;
    assert!(agg.fallback_used);
    assert_eq!(agg.batches_failed, agg.batches_total);
    assert_eq!(agg.count(SentimentCategory::Neutral), 2);
    assert_eq!(agg.overall_confidence, 0.0);
    assert!(analysis.comments.iter().all(|c| c.low_confidence));
}

#[tokio::test(start_paused = true)]
async fn test_total_failure_without_fallback_is_an_error() {
    let client = Arc::new(ScriptedChatClient::new(|_, _| {
        Err(ClientError::InvalidRequest {
            status: 400,
            message: "unsupported parameter".to_string(),
        })
    }));
    let config = AnalysisConfig {
        fallback_on_total_failure: false,
        ..AnalysisConfig::default()
    };
    let pipeline = AnalysisPipeline::new(config, client);

    let err = pipeline
        .analyze(comments(&["good one", "bad one"]))
        .await
        .unwrap_err();
    match err {
        InsightsError::AllBatchesFailed {
            batches,
            last_error,
        } => {
            assert_eq!(batches, 1);
            assert!(last_error.contains("unsupported parameter"));
        }
        other => panic!("expected AllBatchesFailed, got {other:?}"),
    }
}

#[tokio::test(start_paused = true)]
async fn test_low_confidence_keeps_best_answer() {
    let client = Arc::new(ScriptedChatClient::uniform("negative", 0.2));
    let pipeline = AnalysisPipeline::new(AnalysisConfig::default(), client.clone());

    let analysis = pipeline
        .analyze(comments(&["bad delivery", "bad support"]))
        .await
        .unwrap();

    // every retry steps the temperature up until the budget ends
    assert_eq!(client.calls(), 4);
    let requests = client.requests();
    let temperatures: Vec<f64> = requests.iter().map(|r| r.temperature).collect();
    for (got, want) in temperatures.iter().zip([0.0, 0.1, 0.2, 0.3]) {
        assert!((got - want).abs() < 1e-9, "temperatures {temperatures:?}");
    }
    for pair in requests.windows(2) {
        assert_ne!(pair[0], pair[1]);
    }
    assert!(requests.iter().all(|r| r.seed == Some(42)));

    let agg = &analysis.aggregate;
    assert_eq!(agg.batches_failed, 0);
    assert_eq!(agg.low_confidence_batches, 1);
    assert_eq!(agg.count(SentimentCategory::Negative), 2);
    assert_eq!(agg.usage.total_tokens, 4 * 150);
    assert!(analysis.comments.iter().all(|c| c.low_confidence));
}

#[tokio::test(start_paused = true)]
async fn test_malformed_response_is_retried() {
    let client = Arc::new(ScriptedChatClient::sequence(vec![
        Ok(chat_response("I could not produce JSON this time")),
        Ok(chat_response(format!(
            "```json\n{}\n```",
            response_json(&[("positive", 0.95), ("positive", 0.9)])
        ))),
    ]));
    let pipeline = AnalysisPipeline::new(AnalysisConfig::default(), client.clone());

    let analysis = pipeline
        .analyze(comments(&["good food", "good staff"]))
        .await
        .unwrap();
    assert_eq!(client.calls(), 2);
    assert_eq!(analysis.aggregate.count(SentimentCategory::Positive), 2);
    assert_eq!(analysis.aggregate.low_confidence_batches, 0);
}

#[tokio::test]
async fn test_cached_answers_skip_the_endpoint() {
    let client = Arc::new(ScriptedChatClient::uniform("positive", 0.9));
    let cache = Arc::new(ResponseCache::new(16, std::time::Duration::from_secs(60)));
    let pipeline =
        AnalysisPipeline::new(AnalysisConfig::default(), client.clone()).with_cache(cache.clone());

    let input = comments(&["good coffee", "good music"]);
    let first = pipeline.analyze(input.clone()).await.unwrap();
    let second = pipeline.analyze(input).await.unwrap();

    assert_eq!(client.calls(), 1);
    assert_eq!(cache.stats().hits, 1);
    assert_eq!(first.aggregate.distribution, second.aggregate.distribution);
    assert_ne!(first.analysis_id, second.analysis_id);
}

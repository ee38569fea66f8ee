//! Batch planning: counts, ordering and token-budget reduction.

use insights_core::batcher::{estimate_output_tokens, BatchPlan, MAX_BATCH_SIZE};
use insights_core::{split_into_batches, AnalysisConfig, Comment};

fn comments(n: usize) -> Vec<Comment> {
    (1..=n).map(|i| Comment::new(i, format!("comment {i}"))).collect()
}

#[test]
fn test_batch_count_is_ceiling_for_many_shapes() {
    for n in [1, 2, 5, 19, 20, 21, 45, 99, 100, 101, 257] {
        for size in [1, 3, 7, 20, 50, 100] {
            let batches = split_into_batches(&comments(n), size);
            assert_eq!(batches.len(), n.div_ceil(size), "n={n} size={size}");
            assert!(batches.iter().all(|b| !b.is_empty() && b.len() <= size));
        }
    }
}

#[test]
fn test_concatenated_batches_preserve_input_order() {
    let input = comments(53);
    let batches = split_into_batches(&input, 10);
    let flattened: Vec<Comment> = batches.iter().flat_map(|b| b.comments.clone()).collect();
    assert_eq!(flattened, input);
    for (i, batch) in batches.iter().enumerate() {
        assert_eq!(batch.index, i);
        assert_eq!(batch.offset, i * 10);
    }
}

#[test]
fn test_oversized_batch_request_is_clamped() {
    let batches = split_into_batches(&comments(250), 1_000);
    assert_eq!(batches.len(), 3);
    assert_eq!(batches[0].len(), MAX_BATCH_SIZE);
}

#[test]
fn test_plan_reduces_batch_to_fit_small_context() {
    let config = AnalysisConfig {
        model: "gpt-4".to_string(),
        batch_size: 50,
        ..AnalysisConfig::default()
    };
    let plan = BatchPlan::new(&config, 100);
    assert!(plan.reduced);
    assert_eq!(plan.batch_size, 24);
    assert_eq!(plan.batch_count, 5);
    assert!(u64::from(plan.max_tokens) >= estimate_output_tokens(plan.batch_size));
    assert_eq!(plan.split(&comments(100)).len(), plan.batch_count);
}

#[test]
fn test_plan_keeps_configured_size_when_it_fits() {
    let plan = BatchPlan::new(&AnalysisConfig::default(), 45);
    assert!(!plan.reduced);
    assert_eq!(plan.batch_size, 20);
    assert_eq!(plan.batch_count, 3);
}

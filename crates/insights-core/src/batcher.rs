//! Model token budgets and batch planning.
//!
//! Batch size is the configured size, reduced until the estimated response fits
//! the output cap and request plus response fit the model's context window.

use serde::Serialize;

use crate::config::{AnalysisConfig, ParallelConfig};
use crate::domain::{Batch, Comment};

/// Hard ceiling on comments per request, whatever the model.
pub const MAX_BATCH_SIZE: usize = 100;
/// Production-safety ceiling on output tokens per request.
pub const OUTPUT_TOKEN_CEILING: u32 = 12_000;

const OUTPUT_BASE_TOKENS: u64 = 800;
const OUTPUT_TOKENS_PER_COMMENT: u64 = 120;
/// Output estimate buffer, percent.
const OUTPUT_BUFFER_PCT: u64 = 10;
const INPUT_BASE_TOKENS: u64 = 600;
const INPUT_TOKENS_PER_COMMENT: u64 = 60;

/// Token limits of a chat model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ModelProfile {
    pub name: &'static str,
    pub context_window: u32,
    pub max_output_tokens: u32,
}

const PROFILES: &[ModelProfile] = &[
    ModelProfile {
        name: "gpt-4o-mini",
        context_window: 128_000,
        max_output_tokens: 16_384,
    },
    ModelProfile {
        name: "gpt-4o",
        context_window: 128_000,
        max_output_tokens: 16_384,
    },
    ModelProfile {
        name: "gpt-4-turbo",
        context_window: 128_000,
        max_output_tokens: 4_096,
    },
    ModelProfile {
        name: "gpt-4",
        context_window: 8_192,
        max_output_tokens: 4_096,
    },
    ModelProfile {
        name: "gpt-3.5-turbo",
        context_window: 16_385,
        max_output_tokens: 4_096,
    },
];

const DEFAULT_PROFILE: ModelProfile = ModelProfile {
    name: "default",
    context_window: 8_192,
    max_output_tokens: 4_096,
};

impl ModelProfile {
    /// Longest-prefix match against the built-in profiles.
    pub fn for_model(model: &str) -> ModelProfile {
        let model = model.trim().to_lowercase();
        PROFILES
            .iter()
            .filter(|p| model.starts_with(p.name))
            .max_by_key(|p| p.name.len())
            .copied()
            .unwrap_or(DEFAULT_PROFILE)
    }

    /// Cheaper models get a slightly lower confidence bar.
    pub fn is_small(&self) -> bool {
        self.name.contains("mini") || self.name.contains("3.5")
    }
}

/// Whether a model name denotes a small model.
pub fn is_small_model(model: &str) -> bool {
    let model = model.to_lowercase();
    model.contains("mini") || model.contains("3.5")
}

/// Estimated response tokens for `n` comments, buffer included.
pub fn estimate_output_tokens(n: usize) -> u64 {
    let raw = OUTPUT_BASE_TOKENS + n as u64 * OUTPUT_TOKENS_PER_COMMENT;
    (raw * (100 + OUTPUT_BUFFER_PCT)).div_ceil(100)
}

/// Estimated request tokens for `n` comments.
pub fn estimate_input_tokens(n: usize) -> u64 {
    INPUT_BASE_TOKENS + n as u64 * INPUT_TOKENS_PER_COMMENT
}

/// `min(profile limit, configured limit, production ceiling)`.
pub fn output_cap(profile: &ModelProfile, configured_max_tokens: u32) -> u32 {
    profile
        .max_output_tokens
        .min(configured_max_tokens)
        .min(OUTPUT_TOKEN_CEILING)
}

/// Largest batch size not above `configured` (clamped to `1..=MAX_BATCH_SIZE`)
/// that fits the output cap and the context window. Never below 1.
pub fn effective_batch_size(configured: usize, profile: &ModelProfile, cap: u32) -> usize {
    let mut size = configured.clamp(1, MAX_BATCH_SIZE);
    while size > 1 && !fits(size, profile, cap) {
        size -= 1;
    }
    size
}

fn fits(n: usize, profile: &ModelProfile, cap: u32) -> bool {
    let output = estimate_output_tokens(n);
    output <= u64::from(cap) && estimate_input_tokens(n) + output <= u64::from(profile.context_window)
}

/// Batch layout for one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchPlan {
    pub model: String,
    pub profile: ModelProfile,
    pub total_comments: usize,
    pub configured_batch_size: usize,
    pub batch_size: usize,
    pub batch_count: usize,
    /// `max_tokens` sent with each request.
    pub max_tokens: u32,
    /// `true` when the token budget forced a smaller batch than configured.
    pub reduced: bool,
}

impl BatchPlan {
    pub fn new(config: &AnalysisConfig, total_comments: usize) -> Self {
        let profile = ModelProfile::for_model(&config.model);
        let cap = output_cap(&profile, config.max_tokens);
        let batch_size = effective_batch_size(config.batch_size, &profile, cap);
        let needed = estimate_output_tokens(batch_size).min(u64::from(cap));
        Self {
            model: config.model.clone(),
            profile,
            total_comments,
            configured_batch_size: config.batch_size,
            batch_size,
            batch_count: total_comments.div_ceil(batch_size),
            max_tokens: u32::try_from(needed).unwrap_or(cap),
            reduced: batch_size < config.batch_size,
        }
    }

    pub fn split(&self, comments: &[Comment]) -> Vec<Batch> {
        split_into_batches(comments, self.batch_size)
    }

    /// Parallel iff enabled and both the batch and comment counts reach their thresholds.
    pub fn runs_parallel(&self, parallel: &ParallelConfig) -> bool {
        parallel.enabled
            && self.batch_count >= parallel.min_batches
            && self.total_comments >= parallel.min_comments
    }
}

/// Split into `ceil(n / size)` ordered, non-overlapping batches.
///
/// `size` is clamped to `1..=MAX_BATCH_SIZE`.
pub fn split_into_batches(comments: &[Comment], size: usize) -> Vec<Batch> {
    let size = size.clamp(1, MAX_BATCH_SIZE);
    comments
        .chunks(size)
        .enumerate()
        .map(|(index, chunk)| Batch {
            index,
            offset: index * size,
            comments: chunk.to_vec(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_profile_longest_prefix() {
        assert_eq!(ModelProfile::for_model("gpt-4o-mini-2024-07-18").name, "gpt-4o-mini");
        assert_eq!(ModelProfile::for_model("gpt-4o-2024-08-06").name, "gpt-4o");
        assert_eq!(ModelProfile::for_model("gpt-4-0613").name, "gpt-4");
        assert_eq!(ModelProfile::for_model("claude-x").name, "default");
    }

    #[test]
    fn test_small_models() {
        assert!(is_small_model("gpt-4o-mini"));
        assert!(is_small_model("gpt-3.5-turbo"));
        assert!(!is_small_model("gpt-4o"));
    }

    #[test]
    fn test_estimates() {
        // (800 + 20*120) * 1.1 = 3520
        assert_eq!(estimate_output_tokens(20), 3_520);
        assert_eq!(estimate_input_tokens(20), 1_800);
        // (800 + 1*120) * 1.1 = 1012
        assert_eq!(estimate_output_tokens(1), 1_012);
    }

    #[test]
    fn test_default_config_is_not_reduced() {
        let plan = BatchPlan::new(&AnalysisConfig::default(), 45);
        assert_eq!(plan.batch_size, 20);
        assert_eq!(plan.batch_count, 3);
        assert_eq!(plan.max_tokens, 3_520);
        assert!(!plan.reduced);
    }

    #[test]
    fn test_small_output_budget_reduces_batch() {
        let config = AnalysisConfig {
            model: "gpt-4".to_string(),
            batch_size: 50,
            ..AnalysisConfig::default()
        };
        let plan = BatchPlan::new(&config, 100);
        // cap 4096: (800 + n*120)*1.1 <= 4096  ->  n <= 24
        assert_eq!(plan.batch_size, 24);
        assert!(plan.reduced);
        assert!(plan.max_tokens <= 4_096);
    }

    #[test]
    fn test_configured_size_clamped_to_ceiling() {
        let profile = ModelProfile::for_model("gpt-4o");
        assert_eq!(effective_batch_size(0, &profile, 12_000), 1);
        assert!(effective_batch_size(500, &profile, 12_000) <= MAX_BATCH_SIZE);
    }

    #[test]
    fn test_split_keeps_order() {
        let comments: Vec<Comment> = (1..=45).map(|i| Comment::new(i, format!("c{i}"))).collect();
        let batches = split_into_batches(&comments, 20);
        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![20, 20, 5]);
        assert_eq!(batches[2].offset, 40);
        assert_eq!(batches[2].comments[0].row, 41);
    }
}

//! Per-batch retry controller.
//!
//! After every attempt the controller maps a [`RetryContext`] to a
//! [`RetryDecision`]:
//!
//! - confidence at or above the effective threshold -> `Success`
//! - auth / invalid request -> `Abort`
//! - `attempt >= max_retries` -> `Abort`
//! - transport, timeout, rate limit, server error -> `RetryStandard` with backoff
//! - low confidence or malformed output from a deterministic configuration ->
//!   `RetryWithVariation` (temperature stepped up past every value already
//!   sent) or `SkipRetry` once the retry temperature cap is reached; a
//!   non-deterministic configuration gets `RetryStandard`

mod history;

pub use history::{AttemptHistory, AttemptRecord, HISTORY_CAPACITY};

use std::time::Duration;

use serde::Serialize;

use crate::batcher::is_small_model;
use crate::client::ClientError;
use crate::config::AnalysisConfig;

/// Temperatures at or below this count as zero.
pub const DETERMINISTIC_EPSILON: f64 = 1e-6;
/// Lowest effective confidence threshold.
pub const THRESHOLD_FLOOR: f64 = 0.3;
/// Batches this small or smaller get a lower threshold.
pub const SMALL_BATCH_SIZE: usize = 5;
const SMALL_BATCH_RELIEF: f64 = 0.1;
const SMALL_MODEL_RELIEF: f64 = 0.05;
const HISTORY_RELIEF: f64 = 0.05;
const HISTORY_MIN_SAMPLES: usize = 5;

/// Bounded retry policy for one file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub temperature_increment: f64,
    pub max_retry_temperature: f64,
    pub vary_temperature: bool,
    pub max_parse_retries: u32,
    pub confidence_threshold: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&AnalysisConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &AnalysisConfig) -> Self {
        let retry = &config.retry;
        Self {
            max_retries: retry.max_retries,
            base_delay: Duration::from_millis(retry.base_delay_ms),
            max_delay: Duration::from_millis(retry.max_delay_ms),
            temperature_increment: retry.temperature_increment,
            max_retry_temperature: retry.max_retry_temperature,
            vary_temperature: retry.vary_temperature,
            max_parse_retries: retry.max_parse_retries,
            confidence_threshold: config.confidence_threshold,
        }
    }

    /// `base_delay * 2^attempt`, capped at `max_delay`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

/// What happened on the attempt just made.
#[derive(Debug, Clone, PartialEq)]
pub enum AttemptOutcome {
    /// A response was parsed; `confidence` is its aggregate per-comment confidence.
    Completed { confidence: f64 },
    Failed(ClientError),
}

/// Everything the controller needs to decide the next step for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryContext {
    pub batch_index: usize,
    /// 0-based number of the attempt just made.
    pub attempt: u32,
    pub outcome: AttemptOutcome,
    /// Temperature used on this attempt.
    pub temperature: f64,
    /// Temperature the configuration asked for.
    pub requested_temperature: f64,
    pub seed: Option<u64>,
    pub model: String,
    pub batch_size: usize,
    /// Malformed responses seen so far for this batch, this one included.
    pub parse_failures: u32,
}

impl RetryContext {
    /// The configuration asked for temperature ≈ 0 with a fixed seed, so an
    /// identical call repeats the result. Judged on the requested temperature:
    /// a batch that has already been varied is still a deterministic one.
    pub fn is_deterministic(&self) -> bool {
        self.requested_temperature <= DETERMINISTIC_EPSILON && self.seed.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum RetryDecision {
    Success,
    RetryStandard { delay: Duration },
    RetryWithVariation { delay: Duration, temperature: f64 },
    SkipRetry,
    Abort,
}

impl RetryDecision {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryDecision::Success => "success",
            RetryDecision::RetryStandard { .. } => "retry_standard",
            RetryDecision::RetryWithVariation { .. } => "retry_with_variation",
            RetryDecision::SkipRetry => "skip_retry",
            RetryDecision::Abort => "abort",
        }
    }

    pub fn is_retry(&self) -> bool {
        matches!(
            self,
            RetryDecision::RetryStandard { .. } | RetryDecision::RetryWithVariation { .. }
        )
    }

    pub fn is_terminal(&self) -> bool {
        !self.is_retry()
    }
}

/// Retry state machine shared by all batches of one file.
#[derive(Debug, Default)]
pub struct RetryController {
    policy: RetryPolicy,
    history: AttemptHistory,
}

impl RetryController {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            history: AttemptHistory::default(),
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn history(&self) -> &AttemptHistory {
        &self.history
    }

    /// Threshold after relief for small batches, small models and a file whose
    /// recent confidences run low. Never below [`THRESHOLD_FLOOR`] unless the
    /// configured threshold already is.
    pub fn effective_threshold(&self, batch_size: usize, model: &str) -> f64 {
        let configured = self.policy.confidence_threshold;
        let mut threshold = configured;
        if batch_size <= SMALL_BATCH_SIZE {
            threshold -= SMALL_BATCH_RELIEF;
        }
        if is_small_model(model) {
            threshold -= SMALL_MODEL_RELIEF;
        }
        if self
            .history
            .mean_confidence(HISTORY_MIN_SAMPLES)
            .is_some_and(|mean| mean < configured)
        {
            threshold -= HISTORY_RELIEF;
        }
        threshold.max(THRESHOLD_FLOOR.min(configured))
    }

    /// Decide the next step and record the attempt.
    pub fn decide(&self, ctx: &RetryContext) -> RetryDecision {
        let decision = self.evaluate(ctx);
        let confidence = match ctx.outcome {
            AttemptOutcome::Completed { confidence } => Some(confidence),
            AttemptOutcome::Failed(_) => None,
        };
        self.history.record(AttemptRecord {
            batch_index: ctx.batch_index,
            attempt: ctx.attempt,
            confidence,
            temperature: ctx.temperature,
            success: decision == RetryDecision::Success,
        });
        decision
    }

    fn evaluate(&self, ctx: &RetryContext) -> RetryDecision {
        let exhausted = ctx.attempt >= self.policy.max_retries;
        match &ctx.outcome {
            AttemptOutcome::Completed { confidence } => {
                if *confidence >= self.effective_threshold(ctx.batch_size, &ctx.model) {
                    RetryDecision::Success
                } else if exhausted {
                    RetryDecision::Abort
                } else {
                    self.quality_retry(ctx)
                }
            }
            AttemptOutcome::Failed(err) if err.is_fatal() => RetryDecision::Abort,
            AttemptOutcome::Failed(_) if exhausted => RetryDecision::Abort,
            AttemptOutcome::Failed(ClientError::Parse(_)) => {
                if ctx.parse_failures > self.policy.max_parse_retries {
                    RetryDecision::Abort
                } else {
                    self.quality_retry(ctx)
                }
            }
            AttemptOutcome::Failed(ClientError::RateLimited {
                retry_after_secs: Some(secs),
            }) => RetryDecision::RetryStandard {
                delay: self
                    .policy
                    .backoff(ctx.attempt)
                    .max(Duration::from_secs(*secs))
                    .min(self.policy.max_delay),
            },
            AttemptOutcome::Failed(_) => RetryDecision::RetryStandard {
                delay: self.policy.backoff(ctx.attempt),
            },
        }
    }

    /// Retry after a low-quality answer: the same deterministic call would give
    /// the same answer, so only a temperature not tried yet is worth paying for.
    /// Each variation steps one increment above the last, up to
    /// `max_retry_temperature`; past that there is nothing new to send.
    fn quality_retry(&self, ctx: &RetryContext) -> RetryDecision {
        let delay = self.policy.backoff(ctx.attempt);
        if !ctx.is_deterministic() {
            return RetryDecision::RetryStandard { delay };
        }
        if !self.policy.vary_temperature {
            return RetryDecision::SkipRetry;
        }
        let current = ctx.temperature.max(ctx.requested_temperature);
        let next = (current + self.policy.temperature_increment)
            .min(self.policy.max_retry_temperature);
        if next > current + DETERMINISTIC_EPSILON {
            RetryDecision::RetryWithVariation {
                delay,
                temperature: next,
            }
        } else {
            RetryDecision::SkipRetry
        }
    }
}

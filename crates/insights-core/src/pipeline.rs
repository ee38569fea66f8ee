//! End-to-end analysis of one file's comments.
//!
//! plan batches -> (sequential | bounded parallel) per-batch retry loop ->
//! aggregate -> map to domain objects -> [`FileAnalysis`]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tracing::{debug, instrument, Instrument};
use uuid::Uuid;

use crate::aggregator::aggregate;
use crate::batcher::BatchPlan;
use crate::cache::{cache_key, ResponseCache};
use crate::client::{ChatClient, ChatRequest, ClientError};
use crate::config::AnalysisConfig;
use crate::domain::{
    Batch, BatchResult, Comment, FileAnalysis, InsightsError, MappingStats, Result, TokenUsage,
};
use crate::mapper::map_batch;
use crate::metrics::METRICS;
use crate::obs;
use crate::parallel::run_bounded;
use crate::prompt::{self, ParsedBatch};
use crate::retry::{AttemptOutcome, RetryContext, RetryController, RetryDecision, RetryPolicy};

/// How one batch ended.
#[derive(Debug, Clone)]
pub enum BatchOutcome {
    Accepted(BatchResult),
    Failed { attempts: u32, error: String },
    /// Failure that invalidates the whole file (bad credentials).
    Fatal(ClientError),
}

/// Drives batches of one file through the model.
pub struct AnalysisPipeline {
    config: Arc<AnalysisConfig>,
    client: Arc<dyn ChatClient>,
    cache: Option<Arc<ResponseCache>>,
}

impl AnalysisPipeline {
    pub fn new(config: AnalysisConfig, client: Arc<dyn ChatClient>) -> Self {
        Self {
            config: Arc::new(config),
            client,
            cache: None,
        }
    }

    pub fn with_cache(mut self, cache: Arc<ResponseCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn plan(&self, total_comments: usize) -> BatchPlan {
        BatchPlan::new(&self.config, total_comments)
    }

    pub fn uses_parallel(&self, plan: &BatchPlan) -> bool {
        plan.runs_parallel(&self.config.parallel)
    }

    /// Analyse `comments` and return the file-level result.
    ///
    /// Failed batches are left out of the aggregate and counted in
    /// `batches_failed`. Authentication failures abort the file.
    pub async fn analyze(&self, comments: Vec<Comment>) -> Result<FileAnalysis> {
        if comments.is_empty() {
            return Err(InsightsError::EmptyInput);
        }
        let analysis_id = Uuid::new_v4();
        let span = obs::analysis_span(&analysis_id.to_string());
        self.analyze_with_id(analysis_id, comments)
            .instrument(span)
            .await
    }

    async fn analyze_with_id(&self, analysis_id: Uuid, comments: Vec<Comment>) -> Result<FileAnalysis> {
        let id_str = analysis_id.to_string();
        let started_at = Utc::now();
        let clock = Instant::now();

        let plan = self.plan(comments.len());
        let batches = plan.split(&comments);
        let parallel = self.uses_parallel(&plan);
        obs::emit_file_started(
            &id_str,
            &self.config.model,
            comments.len(),
            batches.len(),
            plan.batch_size,
            parallel,
        );
        if plan.reduced {
            debug!(
                configured = plan.configured_batch_size,
                effective = plan.batch_size,
                "batch size reduced to fit the token budget"
            );
        }

        let runner = Arc::new(BatchRunner {
            config: Arc::clone(&self.config),
            client: Arc::clone(&self.client),
            cache: self.cache.clone(),
            controller: RetryController::new(RetryPolicy::from_config(&self.config)),
            max_tokens: plan.max_tokens,
            halted: AtomicBool::new(false),
        });

        let outcomes = if parallel {
            self.run_parallel(&runner, &batches).await
        } else {
            self.run_sequential(&runner, &batches).await
        };

        let mut accepted = Vec::new();
        let mut last_error = String::new();
        for (batch, outcome) in batches.iter().zip(outcomes) {
            match outcome {
                BatchOutcome::Accepted(result) => {
                    METRICS.inc_batches_completed();
                    accepted.push(result);
                }
                BatchOutcome::Failed { attempts, error } => {
                    METRICS.inc_batches_failed();
                    obs::emit_batch_aborted(batch.index, attempts, batch.len(), &error);
                    last_error = error;
                }
                BatchOutcome::Fatal(err) => {
                    obs::emit_batch_aborted(batch.index, 0, comments.len(), &err);
                    METRICS.flush();
                    return Err(InsightsError::Client(err));
                }
            }
        }

        if accepted.is_empty() {
            if !self.config.fallback_on_total_failure {
                METRICS.flush();
                return Err(InsightsError::AllBatchesFailed {
                    batches: batches.len(),
                    last_error,
                });
            }
            obs::emit_fallback_used(batches.len(), comments.len());
            accepted = batches.iter().map(BatchResult::fallback_for).collect();
        }

        let mut aggregate = aggregate(&accepted, batches.len());
        if aggregate.fallback_used {
            // Stand-ins replace every batch, none of which produced a real answer.
            aggregate.batches_failed = batches.len();
        }

        let mut insights = Vec::with_capacity(comments.len());
        let mut mapping = MappingStats::default();
        for batch in &batches {
            let result = accepted.iter().find(|r| r.batch_index == batch.index);
            let (batch_insights, stats) = map_batch(batch, result);
            insights.extend(batch_insights);
            mapping.merge(stats);
        }
        insights.sort_by_key(|insight| insight.comment.row);

        let duration_ms = u64::try_from(clock.elapsed().as_millis()).unwrap_or(u64::MAX);
        obs::emit_file_finished(
            &id_str,
            duration_ms,
            aggregate.total_comments,
            aggregate.batches_total,
            aggregate.batches_failed,
        );
        METRICS.flush();

        Ok(FileAnalysis {
            analysis_id,
            model: self.config.model.clone(),
            started_at,
            finished_at: Utc::now(),
            aggregate,
            comments: insights,
            mapping,
        })
    }

    async fn run_sequential(&self, runner: &Arc<BatchRunner>, batches: &[Batch]) -> Vec<BatchOutcome> {
        let timeout = self.batch_timeout();
        let mut outcomes = Vec::with_capacity(batches.len());
        for batch in batches {
            let outcome = match tokio::time::timeout(timeout, runner.run(batch.clone())).await {
                Ok(outcome) => outcome,
                Err(_) => BatchOutcome::Failed {
                    attempts: 0,
                    error: format!("batch timed out after {}s", timeout.as_secs()),
                },
            };
            let fatal = matches!(outcome, BatchOutcome::Fatal(_));
            outcomes.push(outcome);
            if fatal {
                break;
            }
        }
        outcomes
    }

    async fn run_parallel(&self, runner: &Arc<BatchRunner>, batches: &[Batch]) -> Vec<BatchOutcome> {
        let runner = Arc::clone(runner);
        let span = tracing::Span::current();
        let results = run_bounded(
            batches.to_vec(),
            self.config.parallel.max_workers,
            self.batch_timeout(),
            move |_, batch| {
                let runner = Arc::clone(&runner);
                async move { runner.run(batch).await }.instrument(span.clone())
            },
        )
        .await;
        results
            .into_iter()
            .map(|result| match result {
                Ok(outcome) => outcome,
                Err(err) => BatchOutcome::Failed {
                    attempts: 0,
                    error: err.to_string(),
                },
            })
            .collect()
    }

    fn batch_timeout(&self) -> Duration {
        Duration::from_secs(self.config.parallel.batch_timeout_secs.max(1))
    }
}

/// Per-file state shared by every batch task.
struct BatchRunner {
    config: Arc<AnalysisConfig>,
    client: Arc<dyn ChatClient>,
    cache: Option<Arc<ResponseCache>>,
    controller: RetryController,
    max_tokens: u32,
    /// Set after a fatal error so remaining batches stop spending tokens.
    halted: AtomicBool,
}

impl BatchRunner {
    #[instrument(skip_all, fields(batch = batch.index, size = batch.len()))]
    async fn run(&self, batch: Batch) -> BatchOutcome {
        let started = Instant::now();
        let messages = prompt::build_messages(&batch);
        let mut temperature = self.config.temperature;
        let mut attempt: u32 = 0;
        let mut parse_failures: u32 = 0;
        let mut usage = TokenUsage::default();
        let mut best: Option<BatchResult> = None;

        loop {
            if self.halted.load(Ordering::SeqCst) {
                return BatchOutcome::Failed {
                    attempts: attempt,
                    error: "analysis halted after a fatal error".to_string(),
                };
            }

            let request = ChatRequest {
                model: self.config.model.clone(),
                messages: messages.clone(),
                temperature,
                seed: self.config.seed,
                max_tokens: self.max_tokens,
                json_mode: true,
            };
            let key = cache_key(&request);
            let cached = self.cache.as_ref().and_then(|c| c.get(&key));
            obs::emit_batch_attempt(batch.index, attempt, temperature, cached.is_some());

            let from_cache = cached.is_some();
            let reply = match cached {
                Some(response) => {
                    METRICS.inc_cache_hits();
                    Ok(response)
                }
                None => {
                    METRICS.inc_api_calls();
                    self.client.complete(&request).await
                }
            };

            let parsed = reply.and_then(|response| {
                if !from_cache {
                    usage = usage + response.usage;
                    METRICS.add_tokens(response.usage.total_tokens);
                }
                prompt::parse_batch_response(&response.content, &batch).map(|p| (response, p))
            });

            let (outcome, candidate) = match parsed {
                Ok((response, parsed)) => {
                    let result = batch_result(&batch, parsed, usage, attempt, temperature, started);
                    let confidence = result.confidence();
                    (AttemptOutcome::Completed { confidence }, Some((response, result)))
                }
                Err(err) => {
                    if matches!(err, ClientError::Parse(_)) {
                        parse_failures += 1;
                    }
                    (AttemptOutcome::Failed(err), None)
                }
            };

            let ctx = RetryContext {
                batch_index: batch.index,
                attempt,
                outcome,
                temperature,
                requested_temperature: self.config.temperature,
                seed: self.config.seed,
                model: self.config.model.clone(),
                batch_size: batch.len(),
                parse_failures,
            };
            let decision = self.controller.decide(&ctx);
            match &ctx.outcome {
                AttemptOutcome::Completed { confidence } => {
                    obs::emit_retry_decision(batch.index, attempt, decision.as_str(), Some(*confidence), None)
                }
                AttemptOutcome::Failed(err) => obs::emit_retry_decision(
                    batch.index,
                    attempt,
                    decision.as_str(),
                    None,
                    Some(err as &dyn std::fmt::Display),
                ),
            }

            if let Some((response, result)) = candidate {
                if decision == RetryDecision::Success {
                    if let (Some(cache), false) = (&self.cache, from_cache) {
                        cache.insert(key, response);
                    }
                    obs::emit_batch_completed(
                        batch.index,
                        result.attempts,
                        result.confidence(),
                        false,
                        usage.total_tokens,
                    );
                    return BatchOutcome::Accepted(result);
                }
                if best
                    .as_ref()
                    .map_or(true, |b| result.confidence() > b.confidence())
                {
                    best = Some(result);
                }
            }

            match decision {
                RetryDecision::Success => {}
                RetryDecision::RetryStandard { delay } => {
                    METRICS.inc_retries();
                    tokio::time::sleep(delay).await;
                }
                RetryDecision::RetryWithVariation {
                    delay,
                    temperature: next,
                } => {
                    METRICS.inc_retries();
                    tokio::time::sleep(delay).await;
                    temperature = next;
                }
                RetryDecision::SkipRetry | RetryDecision::Abort => {
                    if let AttemptOutcome::Failed(err @ ClientError::Auth { .. }) = &ctx.outcome {
                        self.halted.store(true, Ordering::SeqCst);
                        return BatchOutcome::Fatal(err.clone());
                    }
                    return match best {
                        Some(mut result) => {
                            result.low_confidence = true;
                            result.attempts = attempt + 1;
                            result.usage = usage;
                            result.elapsed_ms = elapsed_ms(started);
                            obs::emit_batch_completed(
                                batch.index,
                                attempt + 1,
                                result.confidence(),
                                true,
                                usage.total_tokens,
                            );
                            BatchOutcome::Accepted(result)
                        }
                        None => BatchOutcome::Failed {
                            attempts: attempt + 1,
                            error: match &ctx.outcome {
                                AttemptOutcome::Failed(err) => err.to_string(),
                                AttemptOutcome::Completed { confidence } => {
                                    format!("confidence {confidence:.2} below threshold")
                                }
                            },
                        },
                    };
                }
            }
            attempt += 1;
        }
    }
}

fn batch_result(
    batch: &Batch,
    parsed: ParsedBatch,
    usage: TokenUsage,
    attempt: u32,
    temperature: f64,
    started: Instant,
) -> BatchResult {
    BatchResult {
        batch_index: batch.index,
        batch_size: batch.len(),
        overall_trend: parsed.overall_trend,
        summary_confidence: parsed.summary_confidence,
        comments: parsed.comments,
        usage,
        elapsed_ms: elapsed_ms(started),
        attempts: attempt + 1,
        temperature,
        low_confidence: false,
        fallback: false,
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

//! Process-wide atomic counters.
//!
//! Incremented silently at the call site; [`Metrics::flush`] emits the current
//! values as one `info!` event, typically once per analysed file.

use std::sync::atomic::{AtomicU64, Ordering};

/// Global metrics singleton.
pub static METRICS: Metrics = Metrics::new();

/// Atomic counters for one process; no allocation, no locking.
pub struct Metrics {
    api_calls: AtomicU64,
    cache_hits: AtomicU64,
    retries: AtomicU64,
    batches_completed: AtomicU64,
    batches_failed: AtomicU64,
    tokens_used: AtomicU64,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub api_calls: u64,
    pub cache_hits: u64,
    pub retries: u64,
    pub batches_completed: u64,
    pub batches_failed: u64,
    pub tokens_used: u64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            api_calls: AtomicU64::new(0),
            cache_hits: AtomicU64::new(0),
            retries: AtomicU64::new(0),
            batches_completed: AtomicU64::new(0),
            batches_failed: AtomicU64::new(0),
            tokens_used: AtomicU64::new(0),
        }
    }

    /// Count one request sent to the chat endpoint.
    pub fn inc_api_calls(&self) {
        self.api_calls.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "api_calls", "counter incremented");
    }

    /// Count one attempt answered from the response cache.
    pub fn inc_cache_hits(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "cache_hits", "counter incremented");
    }

    /// Count one retry, standard or varied.
    pub fn inc_retries(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(metric = "retries", "counter incremented");
    }

    /// Count one batch accepted into the aggregate.
    pub fn inc_batches_completed(&self) {
        self.batches_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Count one batch dropped after its retries.
    pub fn inc_batches_failed(&self) {
        self.batches_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Add the total tokens reported for one response.
    pub fn add_tokens(&self, tokens: u64) {
        self.tokens_used.fetch_add(tokens, Ordering::Relaxed);
    }

    /// Read every counter.
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            api_calls: self.api_calls.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            batches_completed: self.batches_completed.load(Ordering::Relaxed),
            batches_failed: self.batches_failed.load(Ordering::Relaxed),
            tokens_used: self.tokens_used.load(Ordering::Relaxed),
        }
    }

    /// Emit all current counter values as a single `info!` event.
    ///
    /// Call at the end of a file rather than on every increment.
    pub fn flush(&self) {
        let s = self.snapshot();
        tracing::info!(
            metric = "flush",
            api_calls = s.api_calls,
            cache_hits = s.cache_hits,
            retries = s.retries,
            batches_completed = s.batches_completed,
            batches_failed = s.batches_failed,
            tokens_used = s.tokens_used,
        );
    }

    /// Reset all counters to zero (useful in tests).
    pub fn reset(&self) {
        for counter in [
            &self.api_calls,
            &self.cache_hits,
            &self.retries,
            &self.batches_completed,
            &self.batches_failed,
            &self.tokens_used,
        ] {
            counter.store(0, Ordering::Relaxed);
        }
    }
}

//! Bounded fan-out with per-task timeouts.
//!
//! One tokio task per item, at most `max_workers` running at once. A task that
//! exceeds its timeout is dropped (its in-flight future is cancelled) and
//! reported as [`TaskError::Timeout`]; a panicking task becomes
//! [`TaskError::Panicked`]. Results come back in input order.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tracing::warn;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    #[error("task {index} timed out after {}s", after.as_secs())]
    Timeout { index: usize, after: Duration },

    #[error("task {index} panicked: {message}")]
    Panicked { index: usize, message: String },

    #[error("task {index} was cancelled")]
    Cancelled { index: usize },
}

/// Run `f(index, item)` for every item with bounded concurrency.
///
/// The timeout covers the work only, not the wait for a worker slot.
pub async fn run_bounded<T, R, F, Fut>(
    items: Vec<T>,
    max_workers: usize,
    timeout: Duration,
    f: F,
) -> Vec<Result<R, TaskError>>
where
    T: Send + 'static,
    R: Send + 'static,
    F: Fn(usize, T) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
{
    let f = Arc::new(f);
    let sem = Arc::new(Semaphore::new(max_workers.max(1)));

    let handles: Vec<_> = items
        .into_iter()
        .enumerate()
        .map(|(index, item)| {
            let f = Arc::clone(&f);
            let sem = Arc::clone(&sem);
            tokio::spawn(async move {
                let _permit = sem.acquire_owned().await.ok();
                tokio::time::timeout(timeout, f(index, item)).await
            })
        })
        .collect();

    let mut results = Vec::with_capacity(handles.len());
    for (index, handle) in handles.into_iter().enumerate() {
        let result = match handle.await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_elapsed)) => {
                warn!(task = index, timeout_secs = timeout.as_secs(), "task timed out");
                Err(TaskError::Timeout {
                    index,
                    after: timeout,
                })
            }
            Err(join_err) if join_err.is_panic() => {
                let message = panic_message(join_err.into_panic());
                warn!(task = index, %message, "task panicked");
                Err(TaskError::Panicked { index, message })
            }
            Err(_) => Err(TaskError::Cancelled { index }),
        };
        results.push(result);
    }
    results
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

//! Bounded operations: race a future against a timer.
//!
//! Every suspension point of the pipeline (document load, page render,
//! preview render, recognition) goes through [`run_with_timeout`]. A future
//! that loses the race is dropped; if it was driving a `spawn_blocking` task
//! or a child process, that work finishes (or is killed) on its own and its
//! result is never observed.

use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// A bounded operation did not settle in time.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("{operation} timed out after {}s", after.as_secs())]
pub struct TimeoutError {
    /// Human-readable name of the operation, e.g. `"PDF loading"`.
    pub operation: &'static str,
    /// The bound that was exceeded.
    pub after: Duration,
}

/// Run `fut` for at most `after`.
pub async fn run_with_timeout<F, T>(
    operation: &'static str,
    after: Duration,
    fut: F,
) -> Result<T, TimeoutError>
where
    F: Future<Output = T>,
{
    tokio::time::timeout(after, fut)
        .await
        .map_err(|_| TimeoutError { operation, after })
}

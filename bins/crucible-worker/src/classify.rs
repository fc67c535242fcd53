/// Failure Classifier - maps engine-level failures to a queue disposition
///
/// Failures raised by the engine itself (outside the runner's normal return
/// path) end up here and become a well-formed `worker_error` result plus an
/// explicit retryable/non-retryable disposition for the queue adapter. The
/// engine never throws across the submission boundary.
use std::time::Duration;

use crucible_common::types::{ExecutionResult, ExecutionStatus};
use thiserror::Error;

/// Maximum delivery attempts the queue adapter should allow for retryable
/// failures.
pub const MAX_RETRIES: u32 = 3;

const BACKOFF_BASE: Duration = Duration::from_secs(5);
const BACKOFF_CAP: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("unsupported language: {0}")]
    UnsupportedLanguage(String),
    #[error("source code exceeds maximum size of {limit} bytes")]
    SourceTooLarge { limit: usize },
    #[error("workspace error: {0}")]
    Workspace(#[source] anyhow::Error),
    #[error("isolation runtime error: {0}")]
    Runner(#[source] anyhow::Error),
}

/// What the external queue should do with the submission after this result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Done: store the result, never redeliver.
    Terminal,
    /// Infrastructure hiccup: redeliver with backoff, up to the retry ceiling.
    Retryable,
}

pub fn classify(error: &EngineError) -> Disposition {
    match error {
        // Retrying cannot make an unknown language known or shrink the source.
        EngineError::UnsupportedLanguage(_) | EngineError::SourceTooLarge { .. } => {
            Disposition::Terminal
        }
        EngineError::Workspace(_) | EngineError::Runner(_) => Disposition::Retryable,
    }
}

/// Recommended delay before the next delivery attempt: exponential, capped.
pub fn backoff_delay(attempt: u32) -> Duration {
    let factor = 1u32 << attempt.min(4);
    std::cmp::min(BACKOFF_BASE * factor, BACKOFF_CAP)
}

/// A well-formed terminal result for a failure that happened before (or
/// outside) the per-case loop. `overall_passed` stays absent: nothing ran,
/// so there is no pass/fail fact to report.
pub fn worker_error_result(error: &EngineError, execution_time_ms: u64) -> ExecutionResult {
    ExecutionResult {
        status: ExecutionStatus::WorkerError,
        overall_passed: None,
        output: String::new(),
        error: Some(error.to_string()),
        execution_time_ms,
        test_results: Vec::new(),
    }
}

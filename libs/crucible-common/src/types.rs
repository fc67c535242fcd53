use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One unit of work: a language, the submitted source, and the cases to
/// validate it against. Immutable once submitted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub test_cases: Vec<TestCase>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    pub input: String,
    pub expected_output: String,
}

/// Per-case verdict. `index` is 1-based and matches submission order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCaseResult {
    pub index: u32,
    pub input: String,
    pub expected_output: String,
    pub actual_output: String,
    pub passed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub time_ms: u64,
}

/// Terminal status taxonomy, declared in severity order so that `Ord`
/// matches the aggregation rule: the overall status of an execution is the
/// maximum severity observed across its cases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Clean run, all attempted comparisons matched.
    Success,
    /// Clean run, at least one output mismatch.
    Failure,
    /// Build step embedded in the entrypoint exited nonzero before any run.
    CompilationError,
    /// Nonzero exit or stderr during execution.
    RuntimeError,
    /// Deadline exceeded.
    Timeout,
    /// Infrastructure failure inside the engine itself.
    WorkerError,
}

/// The single terminal result handed back to the queue's result store.
///
/// `overall_passed` is `None` only when the execution failed before anything
/// ran (unsupported language, workspace failure): there is no pass/fail fact
/// to report in that case.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub overall_passed: Option<bool>,
    pub output: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub execution_time_ms: u64,
    pub test_results: Vec<TestCaseResult>,
}

/// Envelope the queue delivers to a worker. `attempts` counts completed
/// delivery attempts; the engine itself has no memory of prior tries.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedSubmission {
    pub id: Uuid,
    pub request: ExecutionRequest,
    #[serde(default)]
    pub attempts: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order_matches_taxonomy() {
        assert!(ExecutionStatus::Success < ExecutionStatus::Failure);
        assert!(ExecutionStatus::Failure < ExecutionStatus::CompilationError);
        assert!(ExecutionStatus::CompilationError < ExecutionStatus::RuntimeError);
        assert!(ExecutionStatus::RuntimeError < ExecutionStatus::Timeout);
        assert!(ExecutionStatus::Timeout < ExecutionStatus::WorkerError);
    }

    #[test]
    fn status_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&ExecutionStatus::RuntimeError).unwrap(),
            "\"runtime_error\""
        );
        assert_eq!(
            serde_json::from_str::<ExecutionStatus>("\"worker_error\"").unwrap(),
            ExecutionStatus::WorkerError
        );
    }

    #[test]
    fn request_accepts_missing_test_cases() {
        let req: ExecutionRequest =
            serde_json::from_str(r#"{"language":"python","code":"print(1)"}"#).unwrap();
        assert!(req.test_cases.is_empty());
    }

    #[test]
    fn submission_defaults_to_zero_attempts() {
        let sub: QueuedSubmission = serde_json::from_str(
            r#"{"id":"7f2c9f7e-9d3f-4a57-9d2a-0b2f0d6f2d11","request":{"language":"python","code":""}}"#,
        )
        .unwrap();
        assert_eq!(sub.attempts, 0);
    }
}

/// Result Aggregator - folds per-case verdicts into one terminal result
///
/// Pure functions: no Docker, no Redis, no filesystem. The execution-level
/// status is the maximum severity observed; `overall_passed` is the
/// conjunction of per-case flags (vacuously true for a clean no-tests run);
/// `output` joins per-case outputs in submission order.
use crucible_common::types::{ExecutionResult, ExecutionStatus, TestCaseResult};

use crate::harness::{CaseVerdict, SingleRunVerdict};

/// Fold the per-case loop's verdicts into the terminal result.
pub fn aggregate_cases(verdicts: Vec<CaseVerdict>, execution_time_ms: u64) -> ExecutionResult {
    let mut status = ExecutionStatus::Success;
    let mut overall_passed = true;
    let mut test_results: Vec<TestCaseResult> = Vec::with_capacity(verdicts.len());

    for verdict in verdicts {
        status = status.max(verdict.status);
        overall_passed &= verdict.result.passed;
        test_results.push(verdict.result);
    }

    let output = test_results
        .iter()
        .map(|r| r.actual_output.as_str())
        .collect::<Vec<_>>()
        .join("\n");

    ExecutionResult {
        status,
        overall_passed: Some(overall_passed),
        output,
        error: None,
        execution_time_ms,
        test_results,
    }
}

/// Lift the no-test-cases branch outcome into the terminal result.
pub fn from_single_run(verdict: SingleRunVerdict, execution_time_ms: u64) -> ExecutionResult {
    ExecutionResult {
        status: verdict.status,
        overall_passed: Some(verdict.passed),
        output: verdict.output,
        error: verdict.error,
        execution_time_ms,
        test_results: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn verdict(index: u32, passed: bool, actual: &str, status: ExecutionStatus) -> CaseVerdict {
        CaseVerdict {
            status,
            result: TestCaseResult {
                index,
                input: String::new(),
                expected_output: String::new(),
                actual_output: actual.to_string(),
                passed,
                error: None,
                time_ms: 1,
            },
        }
    }

    #[test]
    fn status_is_the_maximum_severity() {
        let result = aggregate_cases(
            vec![
                verdict(1, true, "a", ExecutionStatus::Success),
                verdict(2, false, "b", ExecutionStatus::RuntimeError),
                verdict(3, false, "", ExecutionStatus::Timeout),
                verdict(4, false, "c", ExecutionStatus::Failure),
            ],
            10,
        );
        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert_eq!(result.overall_passed, Some(false));
    }

    #[test]
    fn all_passing_cases_yield_success() {
        let result = aggregate_cases(
            vec![
                verdict(1, true, "x", ExecutionStatus::Success),
                verdict(2, true, "y", ExecutionStatus::Success),
            ],
            7,
        );
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.overall_passed, Some(true));
        assert_eq!(result.execution_time_ms, 7);
    }

    #[test]
    fn output_joins_case_outputs_in_order() {
        let result = aggregate_cases(
            vec![
                verdict(1, true, "first", ExecutionStatus::Success),
                verdict(2, true, "second", ExecutionStatus::Success),
                verdict(3, false, "third", ExecutionStatus::Failure),
            ],
            1,
        );
        assert_eq!(result.output, "first\nsecond\nthird");
        assert_eq!(result.test_results.len(), 3);
        assert_eq!(result.test_results[2].index, 3);
    }

    #[test]
    fn single_mismatch_downgrades_success_to_failure() {
        let result = aggregate_cases(
            vec![
                verdict(1, true, "ok", ExecutionStatus::Success),
                verdict(2, false, "6", ExecutionStatus::Failure),
            ],
            1,
        );
        assert_eq!(result.status, ExecutionStatus::Failure);
        assert_eq!(result.overall_passed, Some(false));
    }

    #[test]
    fn clean_single_run_is_vacuously_passed() {
        let result = from_single_run(
            SingleRunVerdict {
                status: ExecutionStatus::Success,
                passed: true,
                output: "hello".to_string(),
                error: None,
            },
            3,
        );
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.overall_passed, Some(true));
        assert!(result.test_results.is_empty());
        assert_eq!(result.output, "hello");
    }

    #[test]
    fn single_run_advisory_error_does_not_fail_the_run() {
        let result = from_single_run(
            SingleRunVerdict {
                status: ExecutionStatus::Success,
                passed: true,
                output: String::new(),
                error: Some("warning: deprecated".to_string()),
            },
            3,
        );
        assert_eq!(result.overall_passed, Some(true));
        assert_eq!(result.error.as_deref(), Some("warning: deprecated"));
    }
}

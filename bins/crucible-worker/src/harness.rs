/// Test Harness - drives test cases through the Isolation Runner
///
/// **Core Responsibility:**
/// Deliver per-case stdin, classify each raw outcome, and compare normalized
/// output against the expectation.
///
/// **Critical Properties:**
/// - Cases run strictly in submission order, never in parallel
/// - A timeout or failure on one case never aborts the batch
/// - A runner error at a case boundary becomes a failed case result and the
///   loop continues; it never escapes
/// - Output mismatch is a failed assertion, not an error
use std::time::Duration;

use crucible_common::types::{ExecutionStatus, TestCase, TestCaseResult};
use tracing::{debug, warn};

use crate::registry::LanguageConfig;
use crate::runner::{ContainerRunner, RunOutcome};
use crate::workspace::Workspace;

/// Normalize output before comparison: trim leading/trailing whitespace and
/// unify line endings. Idempotent.
///
/// **Preserves:**
/// - Internal whitespace
/// - Case sensitivity
/// - Empty lines within content
pub fn normalize_output(output: &str) -> String {
    output.trim().replace("\r\n", "\n")
}

/// Per-case verdict paired with the severity it contributes to the
/// execution-level status.
#[derive(Debug, Clone)]
pub struct CaseVerdict {
    pub result: TestCaseResult,
    pub status: ExecutionStatus,
}

/// Outcome of the no-test-cases branch: a single run with no stdin.
#[derive(Debug, Clone)]
pub struct SingleRunVerdict {
    pub status: ExecutionStatus,
    pub passed: bool,
    pub output: String,
    pub error: Option<String>,
}

fn exit_error(stderr: &str, exit_code: i64) -> String {
    if stderr.is_empty() {
        format!("process exited with code {}", exit_code)
    } else {
        stderr.to_string()
    }
}

/// Interactive-style programs expect a newline-terminated line on stdin, so
/// a single trailing newline is appended when the input lacks one. Inputs
/// already ending in a newline pass through untouched.
fn stdin_payload(input: &str) -> Vec<u8> {
    let mut bytes = input.as_bytes().to_vec();
    if !bytes.ends_with(b"\n") {
        bytes.push(b'\n');
    }
    bytes
}

/// Run once with no stdin and classify the outcome.
///
/// Policy note: on a clean exit, stderr is surfaced as an advisory message
/// while the run still counts as a success. The per-case loop treats stderr
/// as a hard runtime error instead. The asymmetry is deliberate, not an
/// accident to unify.
pub async fn run_without_cases<R: ContainerRunner + ?Sized>(
    runner: &R,
    config: &LanguageConfig,
    workspace: &Workspace,
    deadline: Duration,
) -> anyhow::Result<SingleRunVerdict> {
    let outcome = runner.run(config, workspace, None, deadline).await?;

    Ok(match outcome {
        RunOutcome::TimedOut { .. } => SingleRunVerdict {
            status: ExecutionStatus::Timeout,
            passed: false,
            output: String::new(),
            error: Some("timed out".to_string()),
        },
        RunOutcome::Exited {
            exit_code,
            stdout,
            stderr,
            ..
        } => {
            let output = normalize_output(&stdout);
            let stderr = stderr.trim().to_string();

            if exit_code != 0 {
                SingleRunVerdict {
                    status: ExecutionStatus::RuntimeError,
                    passed: false,
                    output,
                    error: Some(exit_error(&stderr, exit_code)),
                }
            } else {
                SingleRunVerdict {
                    status: ExecutionStatus::Success,
                    passed: true,
                    output,
                    error: if stderr.is_empty() { None } else { Some(stderr) },
                }
            }
        }
    })
}

/// Run every test case in submission order and classify each outcome.
/// Always returns exactly one verdict per case.
pub async fn run_test_cases<R: ContainerRunner + ?Sized>(
    runner: &R,
    config: &LanguageConfig,
    workspace: &Workspace,
    cases: &[TestCase],
    deadline: Duration,
) -> Vec<CaseVerdict> {
    let mut verdicts = Vec::with_capacity(cases.len());

    for (idx, case) in cases.iter().enumerate() {
        let index = (idx + 1) as u32;
        debug!(case = index, total = cases.len(), "Running test case");

        let payload = stdin_payload(&case.input);
        let outcome = runner
            .run(config, workspace, Some(payload.as_slice()), deadline)
            .await;

        let verdict = match outcome {
            Ok(RunOutcome::TimedOut { elapsed }) => {
                warn!(case = index, "Test case timed out");
                CaseVerdict {
                    status: ExecutionStatus::Timeout,
                    result: TestCaseResult {
                        index,
                        input: case.input.clone(),
                        expected_output: case.expected_output.clone(),
                        actual_output: String::new(),
                        passed: false,
                        error: Some("timed out".to_string()),
                        time_ms: elapsed.as_millis() as u64,
                    },
                }
            }
            Ok(RunOutcome::Exited {
                exit_code,
                stdout,
                stderr,
                elapsed,
            }) => {
                let actual_output = normalize_output(&stdout);
                let stderr = stderr.trim().to_string();
                let time_ms = elapsed.as_millis() as u64;

                if exit_code != 0 || !stderr.is_empty() {
                    CaseVerdict {
                        status: ExecutionStatus::RuntimeError,
                        result: TestCaseResult {
                            index,
                            input: case.input.clone(),
                            expected_output: case.expected_output.clone(),
                            actual_output,
                            passed: false,
                            error: Some(exit_error(&stderr, exit_code)),
                            time_ms,
                        },
                    }
                } else if actual_output == normalize_output(&case.expected_output) {
                    CaseVerdict {
                        status: ExecutionStatus::Success,
                        result: TestCaseResult {
                            index,
                            input: case.input.clone(),
                            expected_output: case.expected_output.clone(),
                            actual_output,
                            passed: true,
                            error: None,
                            time_ms,
                        },
                    }
                } else {
                    // Mismatch carries no error message.
                    CaseVerdict {
                        status: ExecutionStatus::Failure,
                        result: TestCaseResult {
                            index,
                            input: case.input.clone(),
                            expected_output: case.expected_output.clone(),
                            actual_output,
                            passed: false,
                            error: None,
                            time_ms,
                        },
                    }
                }
            }
            Err(e) => {
                warn!(case = index, error = %e, "Runner failed at case boundary, continuing");
                CaseVerdict {
                    status: ExecutionStatus::WorkerError,
                    result: TestCaseResult {
                        index,
                        input: case.input.clone(),
                        expected_output: case.expected_output.clone(),
                        actual_output: String::new(),
                        passed: false,
                        error: Some(e.to_string()),
                        time_ms: 0,
                    },
                }
            }
        };

        verdicts.push(verdict);
    }

    verdicts
}

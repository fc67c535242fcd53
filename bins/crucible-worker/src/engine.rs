/// Execution Engine - one submission, end to end
///
/// **Responsibility:**
/// Resolve the language, materialize the workspace, drive the harness, fold
/// the verdicts, and guarantee workspace release on every exit path.
///
/// The engine is an explicitly constructed service: registry and runner are
/// injected, there are no ambient globals, and `execute` always hands back a
/// well-formed result paired with a queue disposition.
use std::time::{Duration, Instant};

use crucible_common::types::{ExecutionRequest, ExecutionResult};
use tracing::{info, warn};

use crate::aggregate;
use crate::classify::{self, Disposition, EngineError};
use crate::harness;
use crate::registry::LanguageRegistry;
use crate::runner::ContainerRunner;
use crate::workspace::Workspace;

/// Safety limit so pathological submissions never reach the workspace
pub const MAX_SOURCE_CODE_BYTES: usize = 1024 * 1024; // 1MB

pub struct ExecutionEngine<R> {
    registry: LanguageRegistry,
    runner: R,
    case_deadline: Duration,
}

impl<R: ContainerRunner> ExecutionEngine<R> {
    pub fn new(registry: LanguageRegistry, runner: R, case_deadline: Duration) -> Self {
        Self {
            registry,
            runner,
            case_deadline,
        }
    }

    /// Process one submission to a terminal result. Raw errors never cross
    /// this boundary: engine-level failures are classified into a
    /// `worker_error` result and a disposition for the queue adapter.
    pub async fn execute(&self, request: &ExecutionRequest) -> (ExecutionResult, Disposition) {
        // Fallback clock for failures that never reach the workspace; the
        // measured window for completed runs starts in try_execute.
        let received = Instant::now();

        info!(
            language = %request.language,
            test_cases = request.test_cases.len(),
            source_size = request.code.len(),
            "Starting execution"
        );

        match self.try_execute(request).await {
            Ok(result) => (result, Disposition::Terminal),
            Err(e) => {
                let disposition = classify::classify(&e);
                warn!(
                    error = %e,
                    retryable = disposition == Disposition::Retryable,
                    "Execution failed before completion"
                );
                (
                    classify::worker_error_result(&e, received.elapsed().as_millis() as u64),
                    disposition,
                )
            }
        }
    }

    async fn try_execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult, EngineError> {
        // Unsupported languages are rejected before any workspace or
        // container exists.
        let config = self
            .registry
            .resolve(&request.language)
            .ok_or_else(|| EngineError::UnsupportedLanguage(request.language.clone()))?;

        if request.code.len() > MAX_SOURCE_CODE_BYTES {
            return Err(EngineError::SourceTooLarge {
                limit: MAX_SOURCE_CODE_BYTES,
            });
        }

        // execution_time covers workspace acquisition through release, not
        // the registry lookup or size guard above.
        let started = Instant::now();
        let workspace = Workspace::create(config, &request.code).map_err(EngineError::Workspace)?;

        if request.test_cases.is_empty() {
            let verdict =
                harness::run_without_cases(&self.runner, config, &workspace, self.case_deadline)
                    .await
                    .map_err(EngineError::Runner)?;
            // Release before stamping the wall clock; Drop also covers the
            // error path above.
            drop(workspace);
            Ok(aggregate::from_single_run(
                verdict,
                started.elapsed().as_millis() as u64,
            ))
        } else {
            let verdicts = harness::run_test_cases(
                &self.runner,
                config,
                &workspace,
                &request.test_cases,
                self.case_deadline,
            )
            .await;
            drop(workspace);
            Ok(aggregate::aggregate_cases(
                verdicts,
                started.elapsed().as_millis() as u64,
            ))
        }
    }
}

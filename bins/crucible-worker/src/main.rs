mod aggregate;
mod classify;
mod engine;
mod harness;
mod registry;
mod runner;
mod workspace;

use std::time::Duration;

use classify::{backoff_delay, Disposition, MAX_RETRIES};
use crucible_common::queue;
use crucible_common::types::QueuedSubmission;
use engine::ExecutionEngine;
use registry::LanguageRegistry;
use runner::{ContainerRunner, DockerRunner};
use tokio::signal;
use tracing::{error, info, warn};

const DEFAULT_CASE_TIMEOUT_MS: u64 = 30_000;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .init();

    info!("Crucible worker booting...");

    // Load the language registry; completeness is validated here, before any
    // submission is accepted.
    let registry = LanguageRegistry::load_default().map_err(|e| {
        error!("Failed to load language registry: {}", e);
        error!("Make sure config/languages.json exists");
        e
    })?;

    info!("Languages configured: {:?}", registry.list_languages());

    let case_timeout_ms = std::env::var("CASE_TIMEOUT_MS")
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(DEFAULT_CASE_TIMEOUT_MS);

    info!("Per-case deadline: {}ms", case_timeout_ms);

    let runner = DockerRunner::connect()?;
    let engine = ExecutionEngine::new(registry, runner, Duration::from_millis(case_timeout_ms));

    // Connect to Redis
    let redis_url =
        std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string());

    let client = redis::Client::open(redis_url.as_str())?;
    let mut redis_conn = redis::aio::ConnectionManager::new(client).await?;

    info!("Connected to Redis: {}", redis_url);

    // Setup graceful shutdown
    let shutdown = async {
        signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C signal handler");
        warn!("Received shutdown signal, draining...");
    };

    tokio::select! {
        _ = worker_loop(&mut redis_conn, &engine) => {},
        _ = shutdown => {},
    }

    info!("Worker shutdown complete");
    Ok(())
}

async fn worker_loop<R: ContainerRunner>(
    redis_conn: &mut redis::aio::ConnectionManager,
    engine: &ExecutionEngine<R>,
) -> anyhow::Result<()> {
    loop {
        // BLPOP with a 5 second timeout so shutdown stays responsive
        match queue::pop_submission(redis_conn, 5.0).await {
            Ok(Some(submission)) => {
                handle_submission(redis_conn, engine, submission).await;
            }
            Ok(None) => {
                // Timeout - check for shutdown
                continue;
            }
            Err(e) => {
                error!(error = %e, "Redis error");
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        }
    }
}

/// Process one delivery: execute, then either persist the terminal result
/// or re-queue the submission per the classifier's disposition. Re-delivery
/// re-runs the entire submission from scratch.
async fn handle_submission<R: ContainerRunner>(
    redis_conn: &mut redis::aio::ConnectionManager,
    engine: &ExecutionEngine<R>,
    submission: QueuedSubmission,
) {
    let submission_id = submission.id;
    info!(
        submission_id = %submission_id,
        language = %submission.request.language,
        test_cases = submission.request.test_cases.len(),
        source_size = submission.request.code.len(),
        attempt = submission.attempts + 1,
        "Received submission"
    );

    let (result, disposition) = engine.execute(&submission.request).await;

    info!(
        submission_id = %submission_id,
        status = ?result.status,
        overall_passed = ?result.overall_passed,
        execution_ms = result.execution_time_ms,
        test_results = result.test_results.len(),
        "Execution completed"
    );

    if disposition == Disposition::Retryable && submission.attempts + 1 < MAX_RETRIES {
        let delay = backoff_delay(submission.attempts);
        warn!(
            submission_id = %submission_id,
            attempt = submission.attempts + 1,
            delay_ms = delay.as_millis() as u64,
            "Retryable failure, re-queueing with backoff"
        );
        tokio::time::sleep(delay).await;

        let requeued = QueuedSubmission {
            attempts: submission.attempts + 1,
            ..submission
        };
        match queue::push_submission(redis_conn, &requeued).await {
            Ok(_) => return,
            Err(e) => {
                error!(
                    submission_id = %submission_id,
                    error = %e,
                    "Failed to re-queue; storing the worker_error result instead"
                );
            }
        }
    }

    match queue::store_result(redis_conn, &submission_id, &result).await {
        Ok(_) => {
            info!(submission_id = %submission_id, "Result persisted");
        }
        Err(e) => {
            error!(submission_id = %submission_id, error = %e, "Failed to persist result");
            // Non-fatal - worker continues
        }
    }
}

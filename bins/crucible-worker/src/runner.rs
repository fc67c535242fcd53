/// Isolation Runner - drives the external container runtime
///
/// **Core Responsibility:**
/// Run one entrypoint invocation against a workspace with a hard deadline
/// and hand back the raw outcome (exit code, stdout, stderr, elapsed).
///
/// **Critical Architectural Boundary:**
/// - The runner knows HOW to execute (Docker via bollard)
/// - The runner does NOT compare outputs or classify verdicts
/// - A deadline expiry is a distinct outcome, not a nonzero exit
///
/// The `ContainerRunner` trait is the seam that lets the harness and engine
/// be exercised without a Docker daemon.
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    KillContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
    WaitContainerOptions,
};
use bollard::image::CreateImageOptions;
use bollard::Docker;
use futures_util::StreamExt;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::registry::LanguageConfig;
use crate::workspace::Workspace;

/// Where the workspace is bind-mounted inside the container. Entrypoints are
/// resolved relative to this directory.
pub const CONTAINER_WORKDIR: &str = "/app";

/// Safety limit so pathological test inputs never reach Docker
pub const MAX_TEST_INPUT_BYTES: usize = 10 * 1024 * 1024; // 10MB

/// Raw outcome of one isolation-runtime invocation.
#[derive(Debug, Clone)]
pub enum RunOutcome {
    /// The process exited on its own before the deadline.
    Exited {
        exit_code: i64,
        stdout: String,
        stderr: String,
        elapsed: Duration,
    },
    /// The deadline expired; the container was forcibly killed.
    TimedOut { elapsed: Duration },
}

#[async_trait]
pub trait ContainerRunner: Send + Sync {
    /// Run the configured entrypoint against the workspace. `stdin`, when
    /// present, is streamed to the process as-is (binary-safe). The whole
    /// invocation, isolation-runtime startup included, is bounded by
    /// `deadline`.
    async fn run(
        &self,
        config: &LanguageConfig,
        workspace: &Workspace,
        stdin: Option<&[u8]>,
        deadline: Duration,
    ) -> Result<RunOutcome>;
}

/// Container cleanup guard - guarantees container removal on drop.
/// Ensures containers are removed even when the invocation times out,
/// errors, or the surrounding task is cancelled.
struct ContainerGuard {
    docker: Docker,
    container_id: String,
}

impl ContainerGuard {
    fn new(docker: Docker, container_id: String) -> Self {
        Self {
            docker,
            container_id,
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        // Best-effort cleanup - cannot be async in Drop
        let container_id = self.container_id.clone();
        let docker = self.docker.clone();

        tokio::spawn(async move {
            let remove_options = RemoveContainerOptions {
                force: true,
                ..Default::default()
            };

            if let Err(e) = docker.remove_container(&container_id, Some(remove_options)).await {
                warn!(container = %container_id, error = %e, "Failed to remove container");
            }
        });
    }
}

/// Docker-based runner for real sandboxed execution
///
/// **Execution Rules:**
/// 1. Pulls the language image if not present
/// 2. Bind-mounts the workspace at the container working directory
/// 3. Network disabled, memory and CPU pinned per language config
/// 4. Streams stdin directly over the attach socket when provided
/// 5. Hard deadline via tokio::time::timeout covering startup and
///    execution alike; kills the container on expiry
/// 6. Container removal guaranteed by a Drop guard
pub struct DockerRunner {
    docker: Docker,
}

impl DockerRunner {
    pub fn connect() -> Result<Self> {
        let docker = Docker::connect_with_local_defaults()
            .context("Failed to connect to Docker daemon")?;
        Ok(Self { docker })
    }

    /// Ensure the image is available locally, pulling it on a cache miss.
    async fn ensure_image(&self, image: &str) -> Result<()> {
        if self.docker.inspect_image(image).await.is_ok() {
            debug!(image = %image, "Image cache hit");
            return Ok(());
        }

        warn!(image = %image, "Image cache miss, pulling");

        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(result) = stream.next().await {
            result.context("Failed to pull Docker image")?;
        }

        info!(image = %image, "Image pulled");
        Ok(())
    }
}

#[async_trait]
impl ContainerRunner for DockerRunner {
    async fn run(
        &self,
        config: &LanguageConfig,
        workspace: &Workspace,
        stdin: Option<&[u8]>,
        deadline: Duration,
    ) -> Result<RunOutcome> {
        if let Some(input) = stdin {
            if input.len() > MAX_TEST_INPUT_BYTES {
                bail!(
                    "Test input exceeds maximum size of {} bytes",
                    MAX_TEST_INPUT_BYTES
                );
            }
        }

        // The deadline bounds the combined lifetime of the invocation:
        // image pull, container creation, attach, and startup spend from
        // the same budget as the process itself. The clock starts here.
        let started = Instant::now();

        // Shared with the timeout arm so a container that was already
        // created can be killed when the budget runs out mid-flight.
        let container_ref: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));

        let execution = {
            let container_ref = Arc::clone(&container_ref);

            async move {
                self.ensure_image(&config.image).await.with_context(|| {
                    format!("Failed to ensure Docker image '{}' is available", config.image)
                })?;

                let container_name = format!("crucible-{}", uuid::Uuid::new_v4());
                let bind = format!("{}:{}", workspace.path().display(), CONTAINER_WORKDIR);
                let has_stdin = stdin.is_some();

                let memory_limit = (config.memory_limit_mb as i64) * 1024 * 1024;
                let nano_cpus = (config.cpu_limit * 1_000_000_000.0) as i64;

                let create_config = Config {
                    image: Some(config.image.clone()),
                    cmd: Some(config.entrypoint.clone()),
                    working_dir: Some(CONTAINER_WORKDIR.to_string()),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    attach_stdin: Some(has_stdin),
                    open_stdin: Some(has_stdin),
                    stdin_once: Some(has_stdin),
                    network_disabled: Some(true), // untrusted code gets no network
                    host_config: Some(bollard::models::HostConfig {
                        binds: Some(vec![bind]),
                        memory: Some(memory_limit),
                        nano_cpus: Some(nano_cpus),
                        ..Default::default()
                    }),
                    ..Default::default()
                };

                let create_options = CreateContainerOptions {
                    name: container_name.as_str(),
                    platform: None,
                };

                let container = self
                    .docker
                    .create_container(Some(create_options), create_config)
                    .await
                    .context("Failed to create Docker container")?;

                let container_id = container.id;
                *container_ref.lock().unwrap() = Some(container_id.clone());

                // Guard set up immediately after creation. It lives inside
                // this future, so removal happens whether the future
                // completes or is dropped by the deadline.
                let _guard = ContainerGuard::new(self.docker.clone(), container_id.clone());

                // Attach before starting so no early output is lost and
                // stdin is connected from the first instruction.
                let attach_options = AttachContainerOptions::<String> {
                    stdin: Some(has_stdin),
                    stdout: Some(true),
                    stderr: Some(true),
                    stream: Some(true),
                    ..Default::default()
                };

                let AttachContainerResults {
                    mut output,
                    mut input,
                } = self
                    .docker
                    .attach_container(&container_id, Some(attach_options))
                    .await
                    .context("Failed to attach to Docker container")?;

                self.docker
                    .start_container(&container_id, None::<StartContainerOptions<String>>)
                    .await
                    .context("Failed to start Docker container")?;

                if let Some(bytes) = stdin {
                    input
                        .write_all(bytes)
                        .await
                        .context("Failed to stream stdin to container")?;
                    // Closing the write half delivers EOF (stdin_once).
                    let _ = input.shutdown().await;
                }
                drop(input);

                let mut stdout = String::new();
                let mut stderr = String::new();

                while let Some(chunk) = output.next().await {
                    match chunk {
                        Ok(LogOutput::StdOut { message }) => {
                            stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(LogOutput::StdErr { message }) => {
                            stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(error = %e, "Error reading container output");
                            break;
                        }
                    }
                }

                let wait_options = WaitContainerOptions {
                    condition: "not-running",
                };

                let mut exit_code: i64 = -1;
                let mut wait_stream = self.docker.wait_container(&container_id, Some(wait_options));
                if let Some(wait_result) = wait_stream.next().await {
                    match wait_result {
                        Ok(response) => exit_code = response.status_code,
                        // bollard surfaces nonzero exits through this variant
                        Err(bollard::errors::Error::DockerContainerWaitError { code, .. }) => {
                            exit_code = code;
                        }
                        Err(e) => {
                            warn!(error = %e, "Failed to read container exit code");
                        }
                    }
                }

                Ok::<_, anyhow::Error>((exit_code, stdout, stderr))
            }
        };

        match tokio::time::timeout(deadline, execution).await {
            Ok(Ok((exit_code, stdout, stderr))) => {
                debug!(exit_code, elapsed_ms = started.elapsed().as_millis() as u64, "Container exited");
                Ok(RunOutcome::Exited {
                    exit_code,
                    stdout,
                    stderr,
                    elapsed: started.elapsed(),
                })
            }
            Ok(Err(e)) => Err(e),
            Err(_) => {
                let container_id = container_ref.lock().unwrap().clone();
                match container_id {
                    Some(id) => {
                        warn!(
                            container = %id,
                            deadline_ms = deadline.as_millis() as u64,
                            "Deadline expired, killing container"
                        );

                        if let Err(e) = self
                            .docker
                            .kill_container(&id, None::<KillContainerOptions<String>>)
                            .await
                        {
                            warn!(container = %id, error = %e, "Failed to kill timed-out container");
                        }
                    }
                    None => {
                        // Budget ran out during image pull or creation; the
                        // dropped future means nothing was started.
                        warn!(
                            deadline_ms = deadline.as_millis() as u64,
                            "Deadline expired before the container was created"
                        );
                    }
                }

                Ok(RunOutcome::TimedOut {
                    elapsed: started.elapsed(),
                })
            }
        }
    }
}


/// Integration tests against a live Docker daemon.
#[cfg(test)]
mod docker_tests {
    use super::*;

    fn python_config() -> LanguageConfig {
        LanguageConfig {
            name: "python".to_string(),
            image: "python:3.11-slim".to_string(),
            entrypoint: vec!["python".to_string(), "main.py".to_string()],
            source_filename: "main.py".to_string(),
            memory_limit_mb: 256,
            cpu_limit: 0.5,
        }
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn runs_program_with_streamed_stdin() {
        let runner = DockerRunner::connect().expect("Docker daemon required");
        let config = python_config();
        let workspace = Workspace::create(&config, "print(int(input()) * 2)").unwrap();

        let outcome = runner
            .run(
                &config,
                &workspace,
                Some(b"21\n".as_slice()),
                Duration::from_secs(30),
            )
            .await
            .unwrap();

        match outcome {
            RunOutcome::Exited {
                exit_code, stdout, ..
            } => {
                assert_eq!(exit_code, 0);
                assert_eq!(stdout.trim(), "42");
            }
            RunOutcome::TimedOut { .. } => panic!("unexpected timeout"),
        }
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn kills_container_on_deadline() {
        let runner = DockerRunner::connect().expect("Docker daemon required");
        let config = python_config();
        let workspace =
            Workspace::create(&config, "import time\ntime.sleep(60)\nprint('late')").unwrap();

        let deadline = Duration::from_secs(5);
        let outcome = runner
            .run(&config, &workspace, None, deadline)
            .await
            .unwrap();

        match outcome {
            RunOutcome::TimedOut { elapsed } => assert!(elapsed >= deadline),
            RunOutcome::Exited { .. } => panic!("expected timeout"),
        }
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn deadline_bounds_startup_and_execution_combined() {
        let runner = DockerRunner::connect().expect("Docker daemon required");
        let config = python_config();
        let workspace =
            Workspace::create(&config, "import time\ntime.sleep(60)").unwrap();

        // A budget too small for container startup alone: the invocation
        // must still come back as a timeout in roughly the budget, not
        // after startup has run to completion on its own schedule.
        let deadline = Duration::from_millis(200);
        let wall = Instant::now();
        let outcome = runner
            .run(&config, &workspace, None, deadline)
            .await
            .unwrap();

        match outcome {
            RunOutcome::TimedOut { elapsed } => {
                assert!(elapsed >= deadline);
                assert!(wall.elapsed() < Duration::from_secs(30));
            }
            RunOutcome::Exited { .. } => panic!("expected timeout"),
        }
    }

    #[tokio::test]
    #[ignore] // Requires Docker
    async fn nonzero_exit_is_not_a_timeout() {
        let runner = DockerRunner::connect().expect("Docker daemon required");
        let config = python_config();
        let workspace = Workspace::create(&config, "import sys\nsys.exit(3)").unwrap();

        let outcome = runner
            .run(&config, &workspace, None, Duration::from_secs(30))
            .await
            .unwrap();

        match outcome {
            RunOutcome::Exited { exit_code, .. } => assert_eq!(exit_code, 3),
            RunOutcome::TimedOut { .. } => panic!("expected exit"),
        }
    }
}

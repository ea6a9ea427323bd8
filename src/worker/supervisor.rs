use std::path::PathBuf;
use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::WorkerConfig;
use crate::error::{FarmError, Result};

/// One partition's worker assignment: its files, pinned GPU and staging
/// directories.
#[derive(Debug, Clone)]
pub struct WorkerSpec {
    pub partition: usize,
    pub gpu_id: u32,
    /// Relative paths staged into `input_dir`. An empty list means no
    /// worker is spawned for this slot.
    pub files: Vec<PathBuf>,
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
}

#[derive(Debug)]
struct WorkerOutcome {
    partition: usize,
    exit_code: i32,
    success: bool,
}

/// Launches and joins the external worker processes for one job.
pub struct WorkerSupervisor {
    config: WorkerConfig,
    cancel: CancellationToken,
}

impl WorkerSupervisor {
    pub fn new(config: WorkerConfig, cancel: CancellationToken) -> Self {
        Self { config, cancel }
    }

    /// Run one worker per non-empty partition and join them all.
    ///
    /// Every launched worker is waited to a terminal exit status before
    /// the verdict is evaluated; siblings are never terminated early on a
    /// first failure, so no orphaned process can keep holding a GPU. The
    /// verdict is success iff every worker exited zero; otherwise the
    /// failure with the lowest partition index is surfaced as the primary
    /// cause and later failures are only logged.
    pub async fn run_partitions(
        &self,
        job_id: Uuid,
        model: &str,
        specs: &[WorkerSpec],
    ) -> Result<()> {
        let mut handles: Vec<(usize, JoinHandle<WorkerOutcome>)> = Vec::new();
        for spec in specs.iter().filter(|s| !s.files.is_empty()) {
            let config = self.config.clone();
            let cancel = self.cancel.clone();
            let spec = spec.clone();
            let model = model.to_string();
            let partition = spec.partition;
            let handle =
                tokio::spawn(async move { run_worker(config, job_id, model, spec, cancel).await });
            handles.push((partition, handle));
        }

        if handles.is_empty() {
            tracing::info!(job_id = %job_id, "All partitions empty, nothing to process");
            return Ok(());
        }

        // Wait-for-all join barrier.
        let mut outcomes = Vec::with_capacity(handles.len());
        for (partition, handle) in handles {
            match handle.await {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::error!(job_id = %job_id, partition, error = %e,
                        "Worker supervision task failed");
                    outcomes.push(WorkerOutcome {
                        partition,
                        exit_code: -1,
                        success: false,
                    });
                }
            }
        }

        outcomes.sort_by_key(|o| o.partition);
        for outcome in outcomes.iter().filter(|o| !o.success).skip(1) {
            tracing::warn!(job_id = %job_id, partition = outcome.partition,
                exit_code = outcome.exit_code, "Additional worker failure");
        }
        if let Some(first) = outcomes.iter().find(|o| !o.success) {
            return Err(FarmError::WorkerFailure {
                exit_code: first.exit_code,
                partition: first.partition,
            });
        }
        Ok(())
    }
}

/// Spawn one worker, stream its output, and wait it to a terminal status.
///
/// The argument list is fixed and structured; job-supplied values (the
/// model name in particular) are passed as discrete argv entries and are
/// never interpreted by a shell.
async fn run_worker(
    config: WorkerConfig,
    job_id: Uuid,
    model: String,
    spec: WorkerSpec,
    cancel: CancellationToken,
) -> WorkerOutcome {
    let mut cmd = Command::new(&config.program);
    if let Some(script) = &config.script {
        cmd.arg(script);
    }
    cmd.arg("-i")
        .arg(&spec.input_dir)
        .arg("-o")
        .arg(&spec.output_dir)
        .arg("-n")
        .arg(&model)
        .arg("-g")
        .arg(spec.gpu_id.to_string())
        .arg("-t")
        .arg(config.tile.to_string())
        .arg("--tile_pad")
        .arg(config.tile_pad.to_string());
    if let Some(dir) = &config.working_dir {
        cmd.current_dir(dir);
    }
    cmd.stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    tracing::info!(job_id = %job_id, partition = spec.partition, gpu = spec.gpu_id,
        files = spec.files.len(), "Launching worker");

    let mut child = match cmd.spawn() {
        Ok(child) => child,
        Err(e) => {
            tracing::error!(job_id = %job_id, partition = spec.partition, error = %e,
                "Failed to spawn worker");
            return WorkerOutcome {
                partition: spec.partition,
                exit_code: -1,
                success: false,
            };
        }
    };

    // Stream both halves of the combined output as they arrive rather
    // than buffering to completion.
    let stdout_task = child
        .stdout
        .take()
        .map(|s| tokio::spawn(stream_lines(s, job_id, spec.partition, "stdout")));
    let stderr_task = child
        .stderr
        .take()
        .map(|s| tokio::spawn(stream_lines(s, job_id, spec.partition, "stderr")));

    let status = tokio::select! {
        status = child.wait() => status,
        _ = cancel.cancelled() => {
            tracing::warn!(job_id = %job_id, partition = spec.partition,
                "Cancellation requested, terminating worker");
            let _ = child.start_kill();
            child.wait().await
        }
    };

    if let Some(task) = stdout_task {
        let _ = task.await;
    }
    if let Some(task) = stderr_task {
        let _ = task.await;
    }

    match status {
        Ok(status) => {
            // A signal exit has no code; report -1 rather than inventing one.
            let exit_code = status.code().unwrap_or(-1);
            tracing::info!(job_id = %job_id, partition = spec.partition, exit_code,
                "Worker exited");
            WorkerOutcome {
                partition: spec.partition,
                exit_code,
                success: status.success(),
            }
        }
        Err(e) => {
            tracing::error!(job_id = %job_id, partition = spec.partition, error = %e,
                "Failed to wait on worker");
            WorkerOutcome {
                partition: spec.partition,
                exit_code: -1,
                success: false,
            }
        }
    }
}

async fn stream_lines<R>(reader: R, job_id: Uuid, partition: usize, stream: &'static str)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        tracing::info!(job_id = %job_id, partition, stream, "worker: {}", line);
    }
}

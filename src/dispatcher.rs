//! Pipeline driver: one task per job, stages strictly in order.

use std::path::PathBuf;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::accel;
use crate::artifact;
use crate::config::ServerConfig;
use crate::error::{FarmError, Result};
use crate::partition::partition;
use crate::publish::{result_key, BlobStore};
use crate::registry::{JobRegistry, JobStatus};
use crate::staging::{enumerate_inputs, JobStaging};
use crate::worker::{WorkerSpec, WorkerSupervisor};

/// What a job was asked to do: which directory of images, which model.
#[derive(Debug, Clone)]
pub struct JobRequest {
    pub input_dir: PathBuf,
    pub model: String,
}

/// Drives accepted jobs through
/// staging -> partitioning -> processing -> packaging -> publishing,
/// updating the registry at every transition. The dispatcher is the sole
/// writer for a job while its pipeline runs.
pub struct Dispatcher {
    pub registry: Arc<dyn JobRegistry>,
    pub store: Arc<dyn BlobStore>,
    pub config: ServerConfig,
    pub shutdown: CancellationToken,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<dyn JobRegistry>,
        store: Arc<dyn BlobStore>,
        config: ServerConfig,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            registry,
            store,
            config,
            shutdown,
        }
    }

    /// Spawn the pipeline task for a freshly created job.
    pub fn spawn_job(self: &Arc<Self>, job_id: Uuid, request: JobRequest) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            this.execute(job_id, request).await;
        });
    }

    /// Run one job end to end and record the outcome in the registry.
    pub async fn execute(&self, job_id: Uuid, request: JobRequest) {
        tracing::info!(job_id = %job_id, model = %request.model,
            input_dir = %request.input_dir.display(), "Job started");

        match self.run_pipeline(job_id, &request).await {
            Ok(()) => {
                tracing::info!(job_id = %job_id, "Job completed");
            }
            Err(e) => {
                let stage = e.stage();
                tracing::error!(job_id = %job_id, stage = %stage, error = %e, "Job failed");
                if let Err(reg_err) = self.registry.set_error(job_id, stage, e.to_string()).await {
                    tracing::error!(job_id = %job_id, error = %reg_err,
                        "Failed to record job error");
                }
            }
        }
    }

    async fn run_pipeline(&self, job_id: Uuid, request: &JobRequest) -> Result<()> {
        // Staging: allocate the job-scoped arena and enumerate the input set.
        self.registry.transition(job_id, JobStatus::Staging).await?;
        let files = enumerate_inputs(&request.input_dir)?;
        let gpus = accel::probe_gpus().await;
        let staging = JobStaging::create(&self.config.staging_root, job_id, gpus.len()).await?;

        // The arena is released on every exit path from here on.
        let result = self.run_staged(job_id, request, files, &gpus, &staging).await;
        staging.cleanup().await;
        result
    }

    async fn run_staged(
        &self,
        job_id: Uuid,
        request: &JobRequest,
        files: Vec<PathBuf>,
        gpus: &[u32],
        staging: &JobStaging,
    ) -> Result<()> {
        // Partitioning: deterministic split, then materialize each group.
        self.registry
            .transition(job_id, JobStatus::Partitioning)
            .await?;
        if files.is_empty() {
            return Err(FarmError::Partition("input set is empty".to_string()));
        }
        let groups = partition(files, gpus.len());
        for (i, group) in groups.iter().enumerate() {
            staging.materialize(i, &request.input_dir, group).await?;
        }
        self.registry
            .set_partition_count(job_id, groups.len())
            .await?;

        // Processing: fan out one worker per non-empty partition, fan in.
        self.registry
            .transition(job_id, JobStatus::Processing)
            .await?;
        let specs: Vec<WorkerSpec> = groups
            .into_iter()
            .enumerate()
            .map(|(i, group)| {
                let dirs = staging.partition_dirs(i);
                WorkerSpec {
                    partition: i,
                    gpu_id: gpus[i],
                    files: group,
                    input_dir: dirs.input.clone(),
                    output_dir: dirs.output.clone(),
                }
            })
            .collect();
        let supervisor = WorkerSupervisor::new(self.config.worker.clone(), self.shutdown.clone());
        supervisor
            .run_partitions(job_id, &request.model, &specs)
            .await?;

        // Packaging: merge per-partition outputs, zip the merged tree.
        self.registry
            .transition(job_id, JobStatus::Packaging)
            .await?;
        staging.merge_outputs().await?;
        let archive = staging.archive_path();
        artifact::package(staging.merged_output(), &archive).await?;

        // Publishing: hand the archive to the blob store.
        self.registry
            .transition(job_id, JobStatus::Publishing)
            .await?;
        let locator = self.store.put(&archive, &result_key(job_id)).await?;
        self.registry.set_result(job_id, locator).await?;
        Ok(())
    }
}

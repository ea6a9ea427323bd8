//! Job records and the registry that tracks them.
//!
//! The registry is the single source of truth polled by the status API.
//! It hands out copy-on-read snapshots; the dispatcher task running a job
//! is the only writer for that job id. The trait keeps callers independent
//! of the backing store so a durable implementation can replace
//! [`InMemoryRegistry`] without touching the pipeline.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{FarmError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Staging,
    Partitioning,
    Processing,
    Packaging,
    Publishing,
    Completed,
    Error,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Error)
    }

    /// Next status along the pipeline, if any.
    pub fn successor(self) -> Option<JobStatus> {
        match self {
            JobStatus::Pending => Some(JobStatus::Staging),
            JobStatus::Staging => Some(JobStatus::Partitioning),
            JobStatus::Partitioning => Some(JobStatus::Processing),
            JobStatus::Processing => Some(JobStatus::Packaging),
            JobStatus::Packaging => Some(JobStatus::Publishing),
            JobStatus::Publishing => Some(JobStatus::Completed),
            JobStatus::Completed | JobStatus::Error => None,
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Staging => "staging",
            JobStatus::Partitioning => "partitioning",
            JobStatus::Processing => "processing",
            JobStatus::Packaging => "packaging",
            JobStatus::Publishing => "publishing",
            JobStatus::Completed => "completed",
            JobStatus::Error => "error",
        };
        write!(f, "{}", s)
    }
}

/// Pipeline stage recorded alongside an error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Staging,
    Partitioning,
    Processing,
    Packaging,
    Publishing,
    Internal,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Staging => "staging",
            Stage::Partitioning => "partitioning",
            Stage::Processing => "processing",
            Stage::Packaging => "packaging",
            Stage::Publishing => "publishing",
            Stage::Internal => "internal",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobError {
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub model: String,
    pub status: JobStatus,
    /// Number of accelerator slots used; fixed once partitioning completes.
    pub partition_count: Option<usize>,
    pub error: Option<JobError>,
    pub result_locator: Option<String>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn new(model: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            model,
            status: JobStatus::Pending,
            partition_count: None,
            error: None,
            result_locator: None,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

/// Storage-agnostic job registry.
///
/// Reads are safe under arbitrary concurrency and never observe a
/// partially written record. `set_result` is the only way into
/// `Completed`, which keeps the locator-iff-completed invariant local to
/// the registry.
#[async_trait]
pub trait JobRegistry: Send + Sync {
    /// Allocate a unique id and store the job as `pending`.
    async fn create_job(&self, model: String) -> Uuid;

    /// Copy-on-read snapshot of a job record.
    async fn snapshot(&self, id: Uuid) -> Result<Job>;

    /// Advance a job one step along the pipeline.
    async fn transition(&self, id: Uuid, next: JobStatus) -> Result<()>;

    /// Record the slot count once partitioning has fixed it.
    async fn set_partition_count(&self, id: Uuid, count: usize) -> Result<()>;

    /// Force a job to `error` with a stage-tagged cause. Idempotent when
    /// the job is already errored.
    async fn set_error(&self, id: Uuid, stage: Stage, message: String) -> Result<()>;

    /// Transition `publishing -> completed` and record the artifact locator.
    async fn set_result(&self, id: Uuid, locator: String) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct InMemoryRegistry {
    jobs: RwLock<HashMap<Uuid, Job>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRegistry for InMemoryRegistry {
    async fn create_job(&self, model: String) -> Uuid {
        let job = Job::new(model);
        let id = job.id;
        self.jobs.write().await.insert(id, job);
        id
    }

    async fn snapshot(&self, id: Uuid) -> Result<Job> {
        self.jobs
            .read()
            .await
            .get(&id)
            .cloned()
            .ok_or(FarmError::JobNotFound(id))
    }

    async fn transition(&self, id: Uuid, next: JobStatus) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(FarmError::JobNotFound(id))?;

        // Completed is only reachable through set_result, error only
        // through set_error; plain transitions step forward exactly once.
        let valid = next != JobStatus::Completed
            && next != JobStatus::Error
            && job.status.successor() == Some(next);
        if !valid {
            return Err(FarmError::InvalidTransition {
                from: job.status,
                to: next,
            });
        }

        job.status = next;
        Ok(())
    }

    async fn set_partition_count(&self, id: Uuid, count: usize) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(FarmError::JobNotFound(id))?;
        job.partition_count = Some(count);
        Ok(())
    }

    async fn set_error(&self, id: Uuid, stage: Stage, message: String) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(FarmError::JobNotFound(id))?;

        if job.status == JobStatus::Error {
            return Ok(());
        }
        if job.status == JobStatus::Completed {
            return Err(FarmError::InvalidTransition {
                from: job.status,
                to: JobStatus::Error,
            });
        }

        job.status = JobStatus::Error;
        job.error = Some(JobError { stage, message });
        job.completed_at = Some(Utc::now());
        Ok(())
    }

    async fn set_result(&self, id: Uuid, locator: String) -> Result<()> {
        let mut jobs = self.jobs.write().await;
        let job = jobs.get_mut(&id).ok_or(FarmError::JobNotFound(id))?;

        if job.status != JobStatus::Publishing {
            return Err(FarmError::InvalidTransition {
                from: job.status,
                to: JobStatus::Completed,
            });
        }

        job.status = JobStatus::Completed;
        job.result_locator = Some(locator);
        job.completed_at = Some(Utc::now());
        Ok(())
    }
}

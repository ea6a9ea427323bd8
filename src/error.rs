use thiserror::Error;
use uuid::Uuid;

use crate::registry::{JobStatus, Stage};

#[derive(Error, Debug)]
pub enum FarmError {
    #[error("Job not found: {0}")]
    JobNotFound(Uuid),

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: JobStatus, to: JobStatus },

    #[error("Staging failed: {0}")]
    Staging(String),

    #[error("Partitioning failed: {0}")]
    Partition(String),

    #[error("Worker for partition {partition} exited with status {exit_code}")]
    WorkerFailure { exit_code: i32, partition: usize },

    #[error("Packaging failed: {0}")]
    Packaging(String),

    #[error("Publish failed: {0}")]
    Publish(String),
}

impl FarmError {
    /// Pipeline stage a failure is attributed to in the job record.
    pub fn stage(&self) -> Stage {
        match self {
            FarmError::Staging(_) => Stage::Staging,
            FarmError::Partition(_) => Stage::Partitioning,
            FarmError::WorkerFailure { .. } => Stage::Processing,
            FarmError::Packaging(_) => Stage::Packaging,
            FarmError::Publish(_) => Stage::Publishing,
            FarmError::JobNotFound(_) | FarmError::InvalidTransition { .. } => Stage::Internal,
        }
    }
}

pub type Result<T> = std::result::Result<T, FarmError>;

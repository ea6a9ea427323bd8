//! Artifact publication to a blob store.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::{FarmError, Result};

/// Destination key for a job's packaged artifact.
pub fn result_key(job_id: Uuid) -> String {
    format!("jobs/{}_out.zip", job_id)
}

/// Remote store for packaged artifacts.
///
/// A cloud bucket client plugs in behind this trait; upload failures are
/// job-fatal and never retried here.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload the file at `local_path` under `key` and return a locator
    /// from which it can later be retrieved.
    async fn put(&self, local_path: &Path, key: &str) -> Result<String>;
}

/// Filesystem-backed store for local deployments and tests.
#[derive(Debug, Clone)]
pub struct FsBlobStore {
    root: PathBuf,
}

impl FsBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl BlobStore for FsBlobStore {
    async fn put(&self, local_path: &Path, key: &str) -> Result<String> {
        let dest = self.root.join(key);
        if let Some(parent) = dest.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| FarmError::Publish(format!("{}: {}", parent.display(), e)))?;
        }
        tokio::fs::copy(local_path, &dest)
            .await
            .map_err(|e| FarmError::Publish(format!("{}: {}", local_path.display(), e)))?;

        Ok(format!("file://{}", dest.display()))
    }
}

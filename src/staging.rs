//! Job-scoped staging arenas.
//!
//! Every job gets its own root under the configured staging directory,
//! keyed by job id, holding one `in`/`out` pair per partition plus the
//! merged output tree and the archive slot. Arenas are never shared
//! between jobs and are released on every pipeline exit path.

use std::path::{Path, PathBuf};

use uuid::Uuid;
use walkdir::WalkDir;

use crate::error::{FarmError, Result};

/// Enumerate the relative paths of all regular files under `root`.
///
/// Order is whatever the filesystem yields; the partitioner sorts before
/// assignment, so callers must not rely on it.
pub fn enumerate_inputs(root: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root) {
        let entry = entry.map_err(|e| FarmError::Staging(e.to_string()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| FarmError::Staging(e.to_string()))?;
        files.push(rel.to_path_buf());
    }
    Ok(files)
}

#[derive(Debug, Clone)]
pub struct PartitionDirs {
    pub input: PathBuf,
    pub output: PathBuf,
}

#[derive(Debug)]
pub struct JobStaging {
    job_id: Uuid,
    root: PathBuf,
    merged: PathBuf,
    partitions: Vec<PartitionDirs>,
}

impl JobStaging {
    /// Allocate the arena for one job: `<staging_root>/<job_id>` with a
    /// directory pair per partition and the merged output tree.
    pub async fn create(staging_root: &Path, job_id: Uuid, partition_count: usize) -> Result<Self> {
        let root = staging_root.join(job_id.to_string());
        let merged = root.join("out");

        let mut partitions = Vec::with_capacity(partition_count);
        for i in 0..partition_count {
            let base = root.join(format!("p{}", i));
            partitions.push(PartitionDirs {
                input: base.join("in"),
                output: base.join("out"),
            });
        }

        for dir in partitions
            .iter()
            .flat_map(|p| [&p.input, &p.output])
            .chain(std::iter::once(&merged))
        {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| FarmError::Staging(format!("{}: {}", dir.display(), e)))?;
        }

        Ok(Self {
            job_id,
            root,
            merged,
            partitions,
        })
    }

    pub fn partition_dirs(&self, index: usize) -> &PartitionDirs {
        &self.partitions[index]
    }

    pub fn merged_output(&self) -> &Path {
        &self.merged
    }

    /// Job-scoped location for the packaged archive.
    pub fn archive_path(&self) -> PathBuf {
        self.root.join(format!("{}_out.zip", self.job_id))
    }

    /// Copy one partition's files from the source tree into its staging
    /// input directory, preserving relative path structure.
    pub async fn materialize(&self, index: usize, source_root: &Path, files: &[PathBuf]) -> Result<()> {
        let dest_root = &self.partitions[index].input;
        for rel in files {
            let src = source_root.join(rel);
            let dest = dest_root.join(rel);
            if let Some(parent) = dest.parent() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| FarmError::Staging(format!("{}: {}", parent.display(), e)))?;
            }
            tokio::fs::copy(&src, &dest)
                .await
                .map_err(|e| FarmError::Staging(format!("{}: {}", src.display(), e)))?;
        }
        Ok(())
    }

    /// Collect every partition's output tree into the job-level merged
    /// tree. Partitions hold disjoint inputs, so their outputs cannot
    /// collide on relative path. Runs during the packaging stage, so
    /// failures are attributed there.
    pub async fn merge_outputs(&self) -> Result<()> {
        for dirs in &self.partitions {
            let mut produced = Vec::new();
            for entry in WalkDir::new(&dirs.output) {
                let entry = entry.map_err(|e| FarmError::Packaging(e.to_string()))?;
                if entry.file_type().is_file() {
                    let rel = entry
                        .path()
                        .strip_prefix(&dirs.output)
                        .map_err(|e| FarmError::Packaging(e.to_string()))?;
                    produced.push(rel.to_path_buf());
                }
            }
            for rel in produced {
                let src = dirs.output.join(&rel);
                let dest = self.merged.join(&rel);
                if let Some(parent) = dest.parent() {
                    tokio::fs::create_dir_all(parent)
                        .await
                        .map_err(|e| FarmError::Packaging(format!("{}: {}", parent.display(), e)))?;
                }
                tokio::fs::copy(&src, &dest)
                    .await
                    .map_err(|e| FarmError::Packaging(format!("{}: {}", src.display(), e)))?;
            }
        }
        Ok(())
    }

    /// Release the arena. Called on both success and failure exits; a
    /// failure to remove is logged, not propagated, since the job outcome
    /// is already decided by this point.
    pub async fn cleanup(self) {
        if let Err(e) = tokio::fs::remove_dir_all(&self.root).await {
            tracing::warn!(job_id = %self.job_id, path = %self.root.display(), error = %e,
                "Failed to release staging arena");
        }
    }
}

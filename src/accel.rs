//! GPU inventory probing.
//!
//! Asks `nvidia-smi` for the set of usable device indices. Probing is
//! fail-open: an absent tool, a non-zero exit, malformed output or an
//! empty device list all degrade to a single slot (device 0) so the
//! pipeline can always run, just without parallelism.

use std::io;

use tokio::process::Command;

const NVIDIA_SMI: &str = "nvidia-smi";

/// Usable GPU device ids, in index order. Never empty.
pub async fn probe_gpus() -> Vec<u32> {
    probe_gpus_with(NVIDIA_SMI).await
}

/// Same as [`probe_gpus`] but with the inventory tool made explicit.
pub async fn probe_gpus_with(program: &str) -> Vec<u32> {
    match query_gpu_indices(program).await {
        Ok(ids) if !ids.is_empty() => {
            tracing::debug!(count = ids.len(), "GPU probe succeeded");
            ids
        }
        Ok(_) => {
            tracing::warn!("GPU probe reported zero devices, falling back to a single slot");
            vec![0]
        }
        Err(e) => {
            tracing::warn!(error = %e, "GPU probe failed, falling back to a single slot");
            vec![0]
        }
    }
}

async fn query_gpu_indices(program: &str) -> io::Result<Vec<u32>> {
    let output = Command::new(program)
        .args(["--query-gpu=index", "--format=csv,noheader"])
        .output()
        .await?;

    if !output.status.success() {
        return Err(io::Error::other(format!(
            "{} exited with status {}",
            program, output.status
        )));
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let mut ids = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let id = line
            .parse::<u32>()
            .map_err(|_| io::Error::other(format!("unparseable GPU index: {:?}", line)))?;
        ids.push(id);
    }
    Ok(ids)
}

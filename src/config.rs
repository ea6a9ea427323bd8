use std::net::SocketAddr;
use std::path::PathBuf;

/// Largest request body the transport will ever accept (1 GiB). The job
/// API currently takes a directory reference rather than an upload, so
/// this only matters if a body-accepting route is added.
pub const MAX_REQUEST_BYTES: usize = 1024 * 1024 * 1024;

/// How the external inference worker is invoked.
///
/// The worker is addressed by an explicit argument list, never through a
/// shell, so job-supplied values like the model name cannot be
/// interpreted as command syntax.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Worker executable (e.g. a Python interpreter).
    pub program: PathBuf,
    /// Optional script passed as the first argument.
    pub script: Option<PathBuf>,
    /// Working directory for the worker process.
    pub working_dir: Option<PathBuf>,
    /// Tile size forwarded to the worker (`-t`).
    pub tile: u32,
    /// Tile padding forwarded to the worker (`--tile_pad`).
    pub tile_pad: u32,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("python3"),
            script: Some(PathBuf::from("inference_realesrgan.py")),
            working_dir: None,
            tile: 1000,
            tile_pad: 0,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub listen_addr: SocketAddr,
    /// Root under which per-job staging arenas are allocated.
    pub staging_root: PathBuf,
    /// Root for the filesystem blob store backend.
    pub store_root: PathBuf,
    pub worker: WorkerConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            // SAFETY: This is a hardcoded valid address that will always parse
            listen_addr: "127.0.0.1:5000"
                .parse()
                .expect("default listen address is valid"),
            staging_root: std::env::temp_dir().join("upscale-farm").join("jobs"),
            store_root: std::env::temp_dir().join("upscale-farm").join("store"),
            worker: WorkerConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(listen_addr: SocketAddr) -> Self {
        Self {
            listen_addr,
            ..Default::default()
        }
    }
}

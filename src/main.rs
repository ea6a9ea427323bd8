use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use upscale_farm::api::{run_api, ApiState};
use upscale_farm::config::{ServerConfig, WorkerConfig};
use upscale_farm::dispatcher::Dispatcher;
use upscale_farm::publish::FsBlobStore;
use upscale_farm::registry::InMemoryRegistry;
use upscale_farm::shutdown::install_shutdown_handler;

#[derive(Parser, Debug)]
#[command(name = "upscale-farm")]
#[command(version)]
#[command(about = "Batch image upscaling job server that fans work out across local GPUs")]
#[command(propagate_version = true)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Start the job server
    Serve(ServeArgs),

    /// Probe and print the usable GPU inventory
    Gpus,
}

#[derive(Parser, Debug)]
struct ServeArgs {
    /// Address to listen on
    #[arg(long, default_value = "127.0.0.1:5000")]
    listen: SocketAddr,

    /// Root directory for per-job staging arenas
    #[arg(long)]
    staging_root: Option<PathBuf>,

    /// Root directory for the filesystem blob store
    #[arg(long)]
    store_root: Option<PathBuf>,

    /// Worker executable
    #[arg(long, default_value = "python3")]
    worker_bin: PathBuf,

    /// Script passed as the worker's first argument
    #[arg(long, default_value = "inference_realesrgan.py")]
    worker_script: PathBuf,

    /// Working directory for worker processes
    #[arg(long)]
    worker_dir: Option<PathBuf>,

    /// Tile size forwarded to the worker
    #[arg(long, default_value = "1000")]
    tile: u32,

    /// Tile padding forwarded to the worker
    #[arg(long, default_value = "0")]
    tile_pad: u32,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();
}

async fn run_serve(args: ServeArgs) {
    let defaults = ServerConfig::default();
    let config = ServerConfig {
        listen_addr: args.listen,
        staging_root: args.staging_root.unwrap_or(defaults.staging_root),
        store_root: args.store_root.unwrap_or(defaults.store_root),
        worker: WorkerConfig {
            program: args.worker_bin,
            script: Some(args.worker_script),
            working_dir: args.worker_dir,
            tile: args.tile,
            tile_pad: args.tile_pad,
        },
    };

    let shutdown = install_shutdown_handler();
    let registry = Arc::new(InMemoryRegistry::new());
    let store = Arc::new(FsBlobStore::new(config.store_root.clone()));
    let dispatcher = Arc::new(Dispatcher::new(
        registry,
        store,
        config.clone(),
        shutdown.clone(),
    ));

    run_api(config.listen_addr, ApiState { dispatcher }, shutdown).await;
}

#[tokio::main]
async fn main() {
    init_tracing();

    let args = Args::parse();
    match args.command {
        Commands::Serve(serve_args) => {
            run_serve(serve_args).await;
        }
        Commands::Gpus => {
            let gpus = upscale_farm::accel::probe_gpus().await;
            for id in gpus {
                println!("{}", id);
            }
        }
    }
}

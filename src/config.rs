//! CLI flags and environment configuration for the two binaries.
//!
//! Secrets come from the environment, never from flags: the admin boot key
//! via `DELTADB_ADMIN_KEY` and the (optional) master key via
//! `DELTADB_MASTER_KEY` as 64 hex chars. A missing master key is generated
//! from the OS CSPRNG at startup.

use std::path::PathBuf;

use clap::Parser;

/// Environment variable carrying the admin boot secret.
pub const ADMIN_KEY_ENV: &str = "DELTADB_ADMIN_KEY";

/// Environment variable carrying the hex-encoded 32-byte master key.
pub const MASTER_KEY_ENV: &str = "DELTADB_MASTER_KEY";

/// Main worker flags.
#[derive(Parser, Debug)]
#[command(name = "main-worker", version, about = "DeltaDatabase main worker")]
pub struct MainWorkerArgs {
    /// RPC listen address (Subscribe + Process).
    #[arg(long = "grpc-addr", default_value = "127.0.0.1:50051")]
    pub grpc_addr: String,

    /// REST listen address.
    #[arg(long = "rest-addr", default_value = "127.0.0.1:8080")]
    pub rest_addr: String,

    /// Shared filesystem root (holds `files/` and `templates/`).
    #[arg(long = "shared-fs")]
    pub shared_fs: PathBuf,

    /// Seconds without contact before a worker is considered gone.
    #[arg(long = "worker-ttl", default_value_t = 60)]
    pub worker_ttl_secs: u64,

    /// Upper bound on concurrent worker subscriptions.
    #[arg(long = "max-workers", default_value_t = 64)]
    pub max_workers: usize,

    /// Session token lifetime in seconds.
    #[arg(long = "session-ttl", default_value_t = 3600)]
    pub session_ttl_secs: u64,

    /// Disable the colocated processing capability; with no subscribed
    /// workers, entity requests then fail with 503.
    #[arg(long = "no-local-worker", default_value_t = false)]
    pub no_local_worker: bool,

    /// Plaintext cache capacity of the colocated worker.
    #[arg(long = "cache-capacity", default_value_t = 1024)]
    pub cache_capacity: usize,
}

/// Processing worker flags.
#[derive(Parser, Debug)]
#[command(name = "proc-worker", version, about = "DeltaDatabase processing worker")]
pub struct ProcWorkerArgs {
    /// Main worker RPC address to subscribe to.
    #[arg(long = "main-addr")]
    pub main_addr: String,

    /// Stable identifier of this worker.
    #[arg(long = "worker-id")]
    pub worker_id: String,

    /// RPC listen address this worker serves `Process` on.
    #[arg(long = "grpc-addr", default_value = "127.0.0.1:50052")]
    pub grpc_addr: String,

    /// Shared filesystem root (holds `files/` and `templates/`).
    #[arg(long = "shared-fs")]
    pub shared_fs: PathBuf,

    /// Plaintext cache capacity.
    #[arg(long = "cache-capacity", default_value_t = 1024)]
    pub cache_capacity: usize,
}

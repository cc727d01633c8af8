//! DeltaDatabase processing worker.
//!
//! Back tier: subscribes to the main worker, recovers the master key from
//! the wrapped blob, and serves `Process(GET|PUT)` against the shared
//! filesystem. Re-subscribes on a heartbeat so the main worker's registry
//! record stays fresh through idle periods.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use deltadb::config::ProcWorkerArgs;
use deltadb::rpc::RpcClient;
use deltadb::worker::{process_router, subscribe_to_main, ProcWorker};

/// How often to refresh the subscription; half the default worker TTL.
const HEARTBEAT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = ProcWorkerArgs::parse();
    tracing::info!(
        version = deltadb::VERSION,
        worker_id = %args.worker_id,
        main_addr = %args.main_addr,
        grpc_addr = %args.grpc_addr,
        shared_fs = %args.shared_fs.display(),
        "starting processing worker"
    );

    let client = RpcClient::new(&args.main_addr)
        .map_err(|e| anyhow::anyhow!("rpc client setup failed: {e}"))?;
    let subscription = subscribe_to_main(&client, &args.worker_id, &args.grpc_addr)
        .await
        .map_err(|e| anyhow::anyhow!("subscribe handshake failed: {e}"))?;

    let worker = Arc::new(
        ProcWorker::new(
            &args.worker_id,
            &args.shared_fs,
            &subscription.master,
            args.cache_capacity,
        )
        .map_err(|e| anyhow::anyhow!("worker setup failed: {e}"))?,
    );

    // Heartbeat: re-subscribe so the registry record (and token) stay live.
    {
        let client = client.clone();
        let worker_id = args.worker_id.clone();
        let advertise = args.grpc_addr.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(HEARTBEAT);
            ticker.tick().await; // immediate first tick; already subscribed
            loop {
                ticker.tick().await;
                if let Err(err) = subscribe_to_main(&client, &worker_id, &advertise).await {
                    tracing::warn!(error = %err, "heartbeat resubscribe failed");
                }
            }
        });
    }

    let listener = tokio::net::TcpListener::bind(&args.grpc_addr)
        .await
        .with_context(|| format!("cannot bind RPC address {}", args.grpc_addr))?;

    tracing::info!(worker_id = %args.worker_id, "processing worker listening");
    axum::serve(listener, process_router(worker))
        .await
        .context("RPC listener failed")?;
    Ok(())
}

//! DeltaDatabase main worker.
//!
//! Front tier: REST for clients and operators, RPC for worker subscriptions
//! and direct `Process` calls. Entity traffic is routed round-robin over
//! subscribed processing workers, with a colocated fallback capability.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use deltadb::api::{rest_router, rpc_router, MainState};
use deltadb::auth::{AuthStore, SessionStore};
use deltadb::config::{MainWorkerArgs, ADMIN_KEY_ENV, MASTER_KEY_ENV};
use deltadb::crypto::MasterKey;
use deltadb::registry::WorkerRegistry;
use deltadb::schema::SchemaRegistry;
use deltadb::worker::ProcWorker;

/// Cadence of the background registry/session sweeper.
const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = MainWorkerArgs::parse();
    tracing::info!(
        version = deltadb::VERSION,
        rest_addr = %args.rest_addr,
        grpc_addr = %args.grpc_addr,
        shared_fs = %args.shared_fs.display(),
        "starting main worker"
    );

    let master = match std::env::var(MASTER_KEY_ENV) {
        Ok(encoded) => MasterKey::from_hex(&encoded).context("invalid DELTADB_MASTER_KEY")?,
        Err(_) => {
            let generated = MasterKey::generate();
            tracing::info!(key_id = generated.key_id(), "generated master key");
            generated
        }
    };

    let admin_key = std::env::var(ADMIN_KEY_ENV).ok();
    if admin_key.is_none() {
        tracing::warn!("{ADMIN_KEY_ENV} not set; only created keys can authenticate");
    }
    let auth = AuthStore::new(admin_key.as_deref())
        .map_err(|e| anyhow::anyhow!("auth store setup failed: {e}"))?;

    let sessions = SessionStore::new(Duration::from_secs(args.session_ttl_secs));
    let registry = WorkerRegistry::new(
        Duration::from_secs(args.worker_ttl_secs),
        args.max_workers,
    );
    let schemas =
        SchemaRegistry::open(&args.shared_fs).context("cannot open templates directory")?;

    let local_worker = if args.no_local_worker {
        None
    } else {
        let worker = ProcWorker::new(
            "main-local",
            &args.shared_fs,
            &master,
            args.cache_capacity,
        )
        .map_err(|e| anyhow::anyhow!("local worker setup failed: {e}"))?;
        Some(Arc::new(worker))
    };

    let state = Arc::new(MainState::new(
        auth,
        sessions,
        registry,
        schemas,
        master,
        local_worker,
    ));

    // Background sweeper: expire stale workers and dead sessions.
    {
        let state = Arc::clone(&state);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(SWEEP_INTERVAL);
            loop {
                ticker.tick().await;
                state.registry.sweep();
                state.sessions.purge_expired();
            }
        });
    }

    let rest_listener = tokio::net::TcpListener::bind(&args.rest_addr)
        .await
        .with_context(|| format!("cannot bind REST address {}", args.rest_addr))?;
    let rpc_listener = tokio::net::TcpListener::bind(&args.grpc_addr)
        .await
        .with_context(|| format!("cannot bind RPC address {}", args.grpc_addr))?;

    let rest = axum::serve(rest_listener, rest_router(Arc::clone(&state)));
    let rpc = axum::serve(rpc_listener, rpc_router(state));

    tracing::info!("main worker listening");
    tokio::try_join!(
        async { rest.await.context("REST listener failed") },
        async { rpc.await.context("RPC listener failed") },
    )?;
    Ok(())
}

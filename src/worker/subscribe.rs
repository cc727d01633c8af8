//! The Subscribe handshake, worker side.

use std::time::Duration;

use crate::crypto::{MasterKey, WorkerKeyPair};
use crate::error::{DbError, DbResult};
use crate::rpc::codec::SubscribeRequest;
use crate::rpc::RpcClient;

/// How many times to retry the handshake before giving up. The main worker
/// usually comes up first, but startup order is not guaranteed.
const SUBSCRIBE_ATTEMPTS: u32 = 20;
const SUBSCRIBE_RETRY: Duration = Duration::from_millis(500);

/// Outcome of a successful handshake.
pub struct Subscription {
    /// Token scoped to the `Process` RPC.
    pub token: String,
    /// The unwrapped master key.
    pub master: MasterKey,
}

/// Generate an in-memory keypair, subscribe, and unwrap the master key.
///
/// `advertise_addr` is the RPC address this worker serves `Process` on; the
/// main worker routes entity traffic to it.
pub async fn subscribe_to_main(
    client: &RpcClient,
    worker_id: &str,
    advertise_addr: &str,
) -> DbResult<Subscription> {
    // RSA keygen takes long enough to matter; keep it off the runtime.
    let keypair = tokio::task::spawn_blocking(WorkerKeyPair::generate)
        .await
        .map_err(|_| DbError::internal("keypair generation failed"))?
        .map_err(|_| DbError::internal("keypair generation failed"))?;

    let request = SubscribeRequest {
        worker_id: worker_id.to_string(),
        pubkey: keypair.public_pem().as_bytes().to_vec(),
        addr: advertise_addr.to_string(),
    };

    let mut last_err = DbError::unavailable("main worker unreachable");
    for attempt in 1..=SUBSCRIBE_ATTEMPTS {
        match client.subscribe(&request).await {
            Ok(response) => {
                let master = keypair
                    .unwrap_master(&response.wrapped_key)
                    .map_err(|_| DbError::internal("master key unwrap failed"))?;
                if response.key_id != master.key_id() {
                    tracing::warn!(
                        advertised = %response.key_id,
                        derived = %master.key_id(),
                        "key_id mismatch in subscribe response"
                    );
                }
                tracing::info!(worker_id, key_id = %master.key_id(), "subscribed to main worker");
                return Ok(Subscription {
                    token: response.token,
                    master,
                });
            }
            Err(err) if err.kind() == crate::error::ErrorKind::Unavailable => {
                tracing::debug!(worker_id, attempt, "main worker not ready, retrying");
                last_err = err;
                tokio::time::sleep(SUBSCRIBE_RETRY).await;
            }
            Err(err) => return Err(err),
        }
    }
    Err(last_err)
}

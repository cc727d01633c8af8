//! Caller side of the RPC channel.
//!
//! Used by processing workers for the Subscribe handshake and by the main
//! worker to forward `Process` calls. Every call carries a deadline; a
//! transport-level timeout surfaces as `DEADLINE_EXCEEDED`, and a refused
//! connection as `UNAVAILABLE` so routing can try the next worker.

use std::time::Duration;

use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::codec::{ProcessRequest, ProcessResponse, SubscribeRequest, SubscribeResponse};
use super::envelope::RpcStatus;
use super::{PROCESS_PATH, SUBSCRIBE_PATH};
use crate::error::{DbError, DbResult};

/// Default per-call deadline, matching the REST layer's.
pub const DEFAULT_RPC_DEADLINE: Duration = Duration::from_secs(10);

/// JSON-over-HTTP client for one `deltadb.MainWorker` endpoint.
#[derive(Debug, Clone)]
pub struct RpcClient {
    http: reqwest::Client,
    base: String,
}

impl RpcClient {
    /// Client for `host:port` (scheme optional).
    pub fn new(addr: &str) -> DbResult<Self> {
        let base = if addr.starts_with("http://") || addr.starts_with("https://") {
            addr.trim_end_matches('/').to_string()
        } else {
            format!("http://{addr}")
        };
        let http = reqwest::Client::builder()
            .build()
            .map_err(|_| DbError::internal("rpc client setup failed"))?;
        Ok(Self { http, base })
    }

    /// `Subscribe(worker_id, pubkey, addr)` handshake.
    pub async fn subscribe(&self, request: &SubscribeRequest) -> DbResult<SubscribeResponse> {
        self.call(SUBSCRIBE_PATH, request, DEFAULT_RPC_DEADLINE).await
    }

    /// `Process(GET|PUT)` with an explicit deadline.
    pub async fn process(
        &self,
        request: &ProcessRequest,
        deadline: Duration,
    ) -> DbResult<ProcessResponse> {
        self.call(PROCESS_PATH, request, deadline).await
    }

    async fn call<Req, Resp>(&self, path: &str, request: &Req, deadline: Duration) -> DbResult<Resp>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let url = format!("{}{path}", self.base);
        let response = self
            .http
            .post(&url)
            .timeout(deadline)
            .json(request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DbError::deadline_exceeded()
                } else {
                    DbError::unavailable("worker unreachable")
                }
            })?;

        if response.status() == StatusCode::OK {
            return response
                .json::<Resp>()
                .await
                .map_err(|_| DbError::internal("malformed rpc response"));
        }

        match response.json::<RpcStatus>().await {
            Ok(status) => Err(status.into_error()),
            Err(_) => Err(DbError::internal("rpc call failed")),
        }
    }
}

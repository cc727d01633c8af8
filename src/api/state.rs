//! Shared state of the main worker: credential stores, the worker
//! registry, schema registry, the colocated processing capability, and the
//! entity-routing fabric.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tokio::time::timeout;

use crate::auth::{AuthContext, AuthStore, Permission, SessionStore};
use crate::crypto::MasterKey;
use crate::error::{DbError, DbResult, ErrorKind};
use crate::registry::WorkerRegistry;
use crate::rpc::codec::{ProcessRequest, ProcessResponse};
use crate::rpc::RpcClient;
use crate::schema::SchemaRegistry;
use crate::worker::ProcWorker;

/// Deadline applied to entity operations, REST-inbound and forwarded alike.
pub const DEFAULT_REQUEST_DEADLINE: Duration = Duration::from_secs(10);

/// Everything the REST and RPC handlers share.
pub struct MainState {
    pub auth: AuthStore,
    pub sessions: SessionStore,
    pub registry: WorkerRegistry,
    pub schemas: SchemaRegistry,
    pub master: MasterKey,
    /// Colocated processing capability; serves entity traffic when the
    /// registry has no routable worker.
    pub local_worker: Option<Arc<ProcWorker>>,
    pub deadline: Duration,
    clients: DashMap<String, RpcClient>,
}

pub type SharedState = Arc<MainState>;

impl MainState {
    pub fn new(
        auth: AuthStore,
        sessions: SessionStore,
        registry: WorkerRegistry,
        schemas: SchemaRegistry,
        master: MasterKey,
        local_worker: Option<Arc<ProcWorker>>,
    ) -> Self {
        Self {
            auth,
            sessions,
            registry,
            schemas,
            master,
            local_worker,
            deadline: DEFAULT_REQUEST_DEADLINE,
            clients: DashMap::new(),
        }
    }

    // ------------------------------------------------------------------
    // Credential resolution
    // ------------------------------------------------------------------

    /// Resolve a REST bearer token: boot key, AuthKey secret, or session.
    /// Worker tokens are *not* accepted here.
    pub fn resolve_rest_token(&self, token: &str) -> Option<AuthContext> {
        self.auth
            .verify_secret(token)
            .or_else(|| self.sessions.resolve(token))
    }

    /// Resolve a `Process` RPC token: everything REST accepts, plus
    /// Subscribe-issued worker tokens (scoped to this RPC only).
    pub fn resolve_process_token(&self, token: &str) -> Option<AuthContext> {
        if let Some(ctx) = self.resolve_rest_token(token) {
            return Some(ctx);
        }
        self.registry.verify_worker_token(token).map(|worker_id| {
            let permissions: HashSet<Permission> =
                [Permission::Read, Permission::Write].into_iter().collect();
            AuthContext {
                key_id: format!("worker:{worker_id}"),
                permissions,
            }
        })
    }

    // ------------------------------------------------------------------
    // Entity routing
    // ------------------------------------------------------------------

    fn client_for(&self, addr: &str) -> DbResult<RpcClient> {
        if let Some(client) = self.clients.get(addr) {
            return Ok(client.clone());
        }
        let client = RpcClient::new(addr)?;
        self.clients.insert(addr.to_string(), client.clone());
        Ok(client)
    }

    /// Route a `Process` call: round-robin over routable workers, falling
    /// back to the colocated capability, else `UNAVAILABLE`. Transport
    /// failures degrade the worker and move on to the next candidate.
    pub async fn route_process(&self, request: &ProcessRequest) -> DbResult<ProcessResponse> {
        let attempts = self.registry.len().max(1);
        for _ in 0..attempts {
            let Some(worker) = self.registry.select() else {
                break;
            };
            let client = self.client_for(&worker.addr)?;
            match timeout(self.deadline, client.process(request, self.deadline)).await {
                Ok(Ok(response)) => {
                    self.registry.touch(&worker.worker_id);
                    return Ok(response);
                }
                Ok(Err(err)) if err.kind() == ErrorKind::Unavailable => {
                    tracing::warn!(worker_id = %worker.worker_id, "worker unreachable, degrading");
                    self.registry.mark_degraded(&worker.worker_id);
                }
                Ok(Err(err)) => return Err(err),
                Err(_) => return Err(DbError::deadline_exceeded()),
            }
        }

        if let Some(local) = &self.local_worker {
            return match timeout(self.deadline, local.process(request)).await {
                Ok(result) => result,
                Err(_) => Err(DbError::deadline_exceeded()),
            };
        }

        Err(DbError::unavailable("no available worker"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn state_with_local() -> (TempDir, MainState) {
        let dir = TempDir::new().unwrap();
        let master = MasterKey::generate();
        let local = ProcWorker::new("main-local", dir.path(), &master, 64).unwrap();
        let state = MainState::new(
            AuthStore::new(Some("boot-secret")).unwrap(),
            SessionStore::default(),
            WorkerRegistry::default(),
            SchemaRegistry::open(dir.path()).unwrap(),
            master,
            Some(Arc::new(local)),
        );
        (dir, state)
    }

    #[tokio::test]
    async fn test_empty_registry_falls_back_to_local() {
        let (_dir, state) = state_with_local();
        let request = ProcessRequest {
            database_name: "chatdb".to_string(),
            entity_key: "K".to_string(),
            operation: "PUT".to_string(),
            payload: br#"{"v":1}"#.to_vec(),
            ..Default::default()
        };
        let response = state.route_process(&request).await.unwrap();
        assert_eq!(response.status, "OK");
        assert_eq!(response.version, 1);
    }

    #[tokio::test]
    async fn test_no_worker_no_local_is_unavailable() {
        let dir = TempDir::new().unwrap();
        let state = MainState::new(
            AuthStore::new(None).unwrap(),
            SessionStore::default(),
            WorkerRegistry::default(),
            SchemaRegistry::open(dir.path()).unwrap(),
            MasterKey::generate(),
            None,
        );
        let request = ProcessRequest {
            database_name: "chatdb".to_string(),
            entity_key: "K".to_string(),
            operation: "GET".to_string(),
            ..Default::default()
        };
        let err = state.route_process(&request).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unavailable);
    }

    #[tokio::test]
    async fn test_unreachable_worker_degrades_then_falls_back() {
        let (_dir, state) = state_with_local();
        // Nothing listens on port 9; the forward fails and routing falls
        // back to the colocated worker.
        state
            .registry
            .register("proc-dead", "127.0.0.1:9", "key-x", "fp")
            .unwrap();

        let request = ProcessRequest {
            database_name: "chatdb".to_string(),
            entity_key: "F".to_string(),
            operation: "PUT".to_string(),
            payload: br#"{"v":1}"#.to_vec(),
            ..Default::default()
        };
        let response = state.route_process(&request).await.unwrap();
        assert_eq!(response.status, "OK");
        assert!(state.registry.select().is_none(), "dead worker must be degraded");
    }

    #[test]
    fn test_worker_token_scoped_to_process() {
        let (_dir, state) = state_with_local();
        let token = state
            .registry
            .register("proc-1", "127.0.0.1:1", "key-x", "fp")
            .unwrap();

        assert!(state.resolve_rest_token(&token).is_none(), "worker token on REST");
        let ctx = state.resolve_process_token(&token).unwrap();
        assert!(ctx.has(Permission::Read) && ctx.has(Permission::Write));
        assert!(!ctx.has(Permission::Admin));
    }

    #[test]
    fn test_rest_token_resolution_order() {
        let (_dir, state) = state_with_local();
        let boot = state.resolve_rest_token("boot-secret").unwrap();
        assert!(boot.has(Permission::Admin));

        let created = state
            .auth
            .create("k", [Permission::Read].into_iter().collect(), None)
            .unwrap();
        assert!(state.resolve_rest_token(&created.secret).is_some());

        let (session, _) = state
            .sessions
            .issue("k-id", [Permission::Read].into_iter().collect());
        assert!(state.resolve_rest_token(&session).is_some());
        assert!(state.resolve_rest_token("bogus").is_none());
    }
}

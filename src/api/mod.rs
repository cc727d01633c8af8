//! # Main Worker Surfaces
//!
//! The main worker runs two listeners over one [`state::MainState`]:
//!
//! - **REST** ([`rest_router`]): client and operator endpoints: health,
//!   login, RBAC key management, worker/schema administration, and the
//!   entity read/write API.
//! - **RPC** ([`rpc_router`]): the `deltadb.MainWorker` service, carrying
//!   the worker Subscribe handshake and direct `Process` calls.
//!
//! Entity traffic on either surface flows through the same routing fabric:
//! round-robin over subscribed processing workers with a colocated fallback.

pub mod body;
pub mod handlers;
pub mod middleware;
pub mod responses;
pub mod routes;
pub mod rpc;
pub mod state;

pub use responses::ApiError;
pub use routes::{rest_router, MAX_REST_BODY};
pub use rpc::rpc_router;
pub use state::{MainState, SharedState, DEFAULT_REQUEST_DEADLINE};

//! # RPC Channel
//!
//! The `deltadb.MainWorker` service has exactly two methods, `Subscribe`
//! and `Process`, addressed by gRPC-style paths on a dedicated listener:
//!
//! ```text
//! POST /deltadb.MainWorker/Subscribe
//! POST /deltadb.MainWorker/Process
//! ```
//!
//! Messages travel as JSON ([`codec`]): bytes fields are base64 strings and
//! empty fields are omitted, so clients in any language interoperate without
//! a schema compiler. Errors travel as a `{code, message}` envelope carrying
//! the gRPC code string on the mapped HTTP status.
//!
//! The main worker serves both methods; a processing worker serves only
//! `Process`. [`RpcClient`] is the caller side used for the Subscribe
//! handshake and for entity forwarding, with the inbound deadline propagated
//! onto every forward.

pub mod codec;

mod client;
mod envelope;

pub use client::RpcClient;
pub use envelope::{rpc_error_response, RpcStatus};

/// Path of the `Subscribe` method.
pub const SUBSCRIBE_PATH: &str = "/deltadb.MainWorker/Subscribe";
/// Path of the `Process` method.
pub const PROCESS_PATH: &str = "/deltadb.MainWorker/Process";

/// RPC message size bound: the REST body limit plus envelope overhead.
pub const MAX_RPC_BODY: usize = 1024 * 1024 + 16 * 1024;

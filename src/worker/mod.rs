//! # Processing Worker
//!
//! A processing worker owns the encrypted persistence path: it holds the
//! master key in memory, validates payloads against registered schemas,
//! seals and opens entity blobs, and keeps a write-through plaintext cache.
//! It serves a single RPC surface, `Process(GET|PUT)`.
//!
//! The worker obtains the master key through the Subscribe handshake: an
//! in-memory RSA keypair is generated at startup, the public half goes to
//! the main worker, and the wrapped key comes back. The private key and the
//! unwrapped master key never leave the process.

mod proc;
mod rpc_service;
mod subscribe;

pub use proc::ProcWorker;
pub use rpc_service::process_router;
pub use subscribe::{subscribe_to_main, Subscription};

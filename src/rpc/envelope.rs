//! The RPC error envelope: `{code, message}` with a gRPC code string,
//! carried on the HTTP status the error kind maps to.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};

use crate::error::{DbError, ErrorKind};

/// Error body of a failed RPC call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcStatus {
    /// gRPC-style code string, e.g. `INVALID_ARGUMENT`.
    pub code: String,
    /// Short generic message; never carries paths, tokens, or plaintext.
    pub message: String,
}

impl RpcStatus {
    pub fn from_error(err: &DbError) -> Self {
        Self {
            code: err.kind().rpc_code().to_string(),
            message: err.message().to_string(),
        }
    }

    /// Reconstruct the error on the client side of the channel.
    pub fn into_error(self) -> DbError {
        DbError::new(ErrorKind::from_rpc_code(&self.code), self.message)
    }
}

/// Render a [`DbError`] as an RPC error response.
pub fn rpc_error_response(err: &DbError) -> Response {
    let status = err.kind().http_status();
    // MethodNotAllowed has no RPC equivalent; it cannot be produced here
    // because unknown methods 404 at the router.
    let status = if status == StatusCode::METHOD_NOT_ALLOWED {
        StatusCode::BAD_REQUEST
    } else {
        status
    };
    (status, Json(RpcStatus::from_error(err))).into_response()
}

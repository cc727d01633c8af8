//! # Cross-Cutting Error Model
//!
//! Every subsystem error converges into [`DbError`], which carries one of the
//! ten [`ErrorKind`]s shared by the REST and RPC surfaces. The kind decides
//! both the HTTP status and the RPC code string, so the two listeners can
//! never disagree about how a failure is classified.
//!
//! Responses built from these errors carry a short generic message only.
//! Stack traces, filesystem paths, token material, and plaintext fragments
//! must never reach a response body; callers construct messages accordingly.

use axum::http::StatusCode;
use thiserror::Error;

// ============================================================================
// Error Kinds
// ============================================================================

/// Classification shared by REST and RPC error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed JSON, invalid names, depth bombs, schema failures.
    BadInput,
    /// Missing or invalid bearer token.
    Unauthorized,
    /// Valid token without the required permission.
    Forbidden,
    /// Entity, schema, or key record does not exist.
    NotFound,
    /// HTTP method not recognized for the endpoint.
    MethodNotAllowed,
    /// Request body exceeds the configured limit.
    PayloadTooLarge,
    /// Reserved; no current producer.
    Conflict,
    /// Crypto auth failure, I/O failure, anything unexpected.
    Internal,
    /// No Available worker to route to.
    Unavailable,
    /// Propagated deadline expired.
    DeadlineExceeded,
}

impl ErrorKind {
    /// HTTP status for the REST surface.
    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorKind::BadInput => StatusCode::BAD_REQUEST,
            ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorKind::Forbidden => StatusCode::FORBIDDEN,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            ErrorKind::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorKind::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorKind::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        }
    }

    /// Code string for the RPC surface.
    pub fn rpc_code(&self) -> &'static str {
        match self {
            ErrorKind::BadInput => "INVALID_ARGUMENT",
            ErrorKind::Unauthorized => "UNAUTHENTICATED",
            ErrorKind::Forbidden => "PERMISSION_DENIED",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::MethodNotAllowed => "INVALID_ARGUMENT",
            ErrorKind::PayloadTooLarge => "RESOURCE_EXHAUSTED",
            ErrorKind::Conflict => "ABORTED",
            ErrorKind::Internal => "INTERNAL",
            ErrorKind::Unavailable => "UNAVAILABLE",
            ErrorKind::DeadlineExceeded => "DEADLINE_EXCEEDED",
        }
    }

    /// Reverse mapping used by the RPC client when decoding error envelopes.
    /// Unknown codes collapse to `Internal`.
    pub fn from_rpc_code(code: &str) -> Self {
        match code {
            "INVALID_ARGUMENT" => ErrorKind::BadInput,
            "UNAUTHENTICATED" => ErrorKind::Unauthorized,
            "PERMISSION_DENIED" => ErrorKind::Forbidden,
            "NOT_FOUND" => ErrorKind::NotFound,
            "RESOURCE_EXHAUSTED" => ErrorKind::PayloadTooLarge,
            "ABORTED" => ErrorKind::Conflict,
            "UNAVAILABLE" => ErrorKind::Unavailable,
            "DEADLINE_EXCEEDED" => ErrorKind::DeadlineExceeded,
            _ => ErrorKind::Internal,
        }
    }
}

// ============================================================================
// DbError
// ============================================================================

/// The crate-wide error type.
#[derive(Error, Debug, Clone)]
#[error("{message}")]
pub struct DbError {
    kind: ErrorKind,
    message: String,
}

pub type DbResult<T> = Result<T, DbError>;

impl DbError {
    /// Create an error with an explicit kind and message.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Malformed input (names, JSON shape, schema failures).
    pub fn bad_input(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::BadInput, message)
    }

    /// Missing or unusable credentials.
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unauthorized, message)
    }

    /// Authenticated but lacking the required permission.
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Forbidden, message)
    }

    /// Missing entity, schema, or key record.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    /// Generic internal failure. The message must stay generic; the real
    /// cause belongs in a log line, not a response.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    /// No worker available to service the request.
    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unavailable, message)
    }

    /// Propagated deadline expired.
    pub fn deadline_exceeded() -> Self {
        Self::new(ErrorKind::DeadlineExceeded, "deadline exceeded")
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

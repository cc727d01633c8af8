//! Typed REST error responses.
//!
//! Every handler failure renders as `{"error": "<short message>"}` on the
//! status its kind maps to. Messages stay generic: no paths, no tokens, no
//! payload fragments, no internal detail.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::Serialize;

use crate::error::{DbError, ErrorKind};

/// REST-facing error wrapper around [`DbError`].
#[derive(Debug, Clone)]
pub struct ApiError(DbError);

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self(DbError::bad_input(message))
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self(DbError::unauthorized(message))
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self(DbError::forbidden(message))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self(DbError::not_found(message))
    }

    pub fn kind(&self) -> ErrorKind {
        self.0.kind()
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.0.kind().http_status();
        // Internal causes are for logs, not clients.
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            "internal error"
        } else {
            self.0.message()
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

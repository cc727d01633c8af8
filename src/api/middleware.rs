//! REST middleware: bearer authentication and request logging.

use std::time::Instant;

use axum::extract::{Request, State};
use axum::http::Method;
use axum::middleware::Next;
use axum::response::Response;

use super::responses::ApiError;
use super::state::SharedState;
use crate::auth::extract_bearer;

/// Endpoints that skip authentication. Everything else requires a
/// resolvable bearer token before its handler runs, so an unauthenticated
/// request never reaches the filesystem.
///
/// Single-method public paths are excluded by path alone: a wrong-method
/// request there should surface the router's 405, not a 401. `/schema/{id}`
/// stays method-aware because GET is public while PUT is admin-gated.
fn is_public(method: &Method, path: &str) -> bool {
    if path == "/health" || path == "/admin/schemas" || path == "/api/login" {
        return true;
    }
    *method == Method::GET && path.starts_with("/schema/")
}

/// Authenticate the request and stash the resolved [`crate::auth::AuthContext`]
/// in extensions. Per-endpoint permission checks happen in the handlers.
pub async fn auth_middleware(
    State(state): State<SharedState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if is_public(request.method(), request.uri().path()) {
        return Ok(next.run(request).await);
    }

    let token = extract_bearer(request.headers()).map_err(ApiError::from)?;
    let context = state
        .resolve_rest_token(&token)
        .ok_or_else(|| ApiError::unauthorized("invalid token"))?;

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}

/// Structured request/response logging.
pub async fn request_logging_middleware(request: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let response = next.run(request).await;

    tracing::info!(
        method = %method,
        path = %path,
        status = response.status().as_u16(),
        duration_ms = start.elapsed().as_millis() as u64,
        "request completed"
    );
    response
}

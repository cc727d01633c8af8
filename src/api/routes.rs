//! REST router assembly.

use axum::extract::DefaultBodyLimit;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::routing::{delete, get, post};
use axum::Router;

use super::handlers;
use super::middleware::{auth_middleware, request_logging_middleware};
use super::state::SharedState;

/// REST request body limit: 1 MiB, enforced before handlers run; exceeding
/// it is a 413.
pub const MAX_REST_BODY: usize = 1024 * 1024;

/// Build the REST router. Method policy falls out of the route table:
/// a known path with the wrong method is a 405, an unknown path a 404.
pub fn rest_router(state: SharedState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/login", post(handlers::login))
        .route(
            "/api/keys",
            get(handlers::list_keys).post(handlers::create_key),
        )
        .route("/api/keys/:id", delete(handlers::delete_key))
        .route("/admin/workers", get(handlers::admin_workers))
        .route("/admin/schemas", get(handlers::admin_schemas))
        .route(
            "/schema/:id",
            get(handlers::get_schema).put(handlers::put_schema),
        )
        .route(
            "/entity/:db",
            get(handlers::get_entity).put(handlers::put_entity),
        )
        // route_layer: unmatched paths stay a plain 404 instead of a 401.
        .route_layer(from_fn_with_state(state.clone(), auth_middleware))
        .layer(from_fn(request_logging_middleware))
        .layer(DefaultBodyLimit::max(MAX_REST_BODY))
        .with_state(state)
}

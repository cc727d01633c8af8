//! The main worker's RPC surface: `Subscribe` and `Process`.
//!
//! `Subscribe` is how a processing worker joins the fleet and receives the
//! wrapped master key. `Process` is the entity operation entry point for
//! RPC clients; it runs the same authorization as REST (plus worker tokens)
//! and then the same routing fabric.

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;

use super::state::SharedState;
use crate::auth::Permission;
use crate::crypto::{wrap_for_worker, wrapped_key_fingerprint, CryptoError};
use crate::error::DbError;
use crate::rpc::codec::{ProcessRequest, SubscribeRequest, SubscribeResponse};
use crate::rpc::{rpc_error_response, MAX_RPC_BODY, PROCESS_PATH, SUBSCRIBE_PATH};

/// Router for the main worker's RPC listener.
pub fn rpc_router(state: SharedState) -> Router {
    Router::new()
        .route(SUBSCRIBE_PATH, post(handle_subscribe))
        .route(PROCESS_PATH, post(handle_process))
        .layer(DefaultBodyLimit::max(MAX_RPC_BODY))
        .with_state(state)
}

async fn handle_subscribe(
    State(state): State<SharedState>,
    body: Result<Json<SubscribeRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(_) => return rpc_error_response(&DbError::bad_input("malformed request body")),
    };
    match subscribe(&state, request) {
        Ok(response) => Json(response).into_response(),
        Err(err) => rpc_error_response(&err),
    }
}

fn subscribe(
    state: &SharedState,
    request: SubscribeRequest,
) -> Result<SubscribeResponse, DbError> {
    if request.worker_id.is_empty() {
        return Err(DbError::bad_input("worker_id must not be empty"));
    }

    let pub_pem = String::from_utf8(request.pubkey)
        .map_err(|_| DbError::bad_input("invalid public key"))?;
    let wrapped_key = wrap_for_worker(&state.master, &pub_pem).map_err(|err| match err {
        CryptoError::InvalidPublicKey(_) => DbError::bad_input("invalid public key"),
        _ => DbError::internal("key wrapping failed"),
    })?;

    let fingerprint = wrapped_key_fingerprint(&wrapped_key);
    let token = state.registry.register(
        &request.worker_id,
        &request.addr,
        state.master.key_id(),
        &fingerprint,
    )?;

    tracing::info!(
        worker_id = %request.worker_id,
        key_fingerprint = %fingerprint,
        "worker subscribed"
    );

    Ok(SubscribeResponse {
        token,
        wrapped_key,
        key_id: state.master.key_id().to_string(),
    })
}

async fn handle_process(
    State(state): State<SharedState>,
    body: Result<Json<ProcessRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(_) => return rpc_error_response(&DbError::bad_input("malformed request body")),
    };

    let required = match request.operation.as_str() {
        "GET" => Permission::Read,
        "PUT" => Permission::Write,
        other => {
            return rpc_error_response(&DbError::bad_input(format!(
                "unsupported operation: {other:.16}"
            )))
        }
    };

    if request.token.is_empty() {
        return rpc_error_response(&DbError::unauthorized("missing token"));
    }
    let Some(ctx) = state.resolve_process_token(&request.token) else {
        return rpc_error_response(&DbError::unauthorized("invalid token"));
    };
    if !ctx.has(required) {
        return rpc_error_response(&DbError::forbidden("insufficient permissions"));
    }

    match state.route_process(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => rpc_error_response(&err),
    }
}

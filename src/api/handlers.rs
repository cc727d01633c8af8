//! REST endpoint handlers.
//!
//! Authentication ran in the middleware; each handler enforces its own
//! permission gate and re-validates any name that came in over the URL
//! before it can reach a path.

use std::collections::{HashMap, HashSet};

use axum::body::Bytes;
use axum::extract::{Extension, Path, Query, State};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Json, Response};
use serde::Deserialize;
use serde_json::json;

use super::body::parse_json_body;
use super::responses::ApiError;
use super::state::SharedState;
use crate::auth::{parse_duration_spec, AuthContext, Permission};
use crate::naming::validate_name;
use crate::rpc::codec::ProcessRequest;

type ApiResult<T> = Result<T, ApiError>;

fn require(ctx: &AuthContext, permission: Permission) -> ApiResult<()> {
    if ctx.has(permission) {
        Ok(())
    } else {
        Err(ApiError::forbidden("insufficient permissions"))
    }
}

fn sorted_permissions(ctx: &AuthContext) -> Vec<Permission> {
    let mut permissions: Vec<Permission> = ctx.permissions.iter().copied().collect();
    permissions.sort_by_key(|p| format!("{p:?}"));
    permissions
}

// ============================================================================
// Health
// ============================================================================

/// `GET /health`: exactly `{"status":"ok"}`.
pub async fn health() -> Json<serde_json::Value> {
    Json(json!({"status": "ok"}))
}

// ============================================================================
// Login & key management
// ============================================================================

#[derive(Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    key: String,
}

/// `POST /api/login`: exchange a key secret for a session token.
pub async fn login(
    State(state): State<SharedState>,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let value = parse_json_body(&body).map_err(ApiError::from)?;
    let request: LoginRequest =
        serde_json::from_value(value).map_err(|_| ApiError::bad_request("invalid JSON body"))?;
    if request.key.is_empty() {
        return Err(ApiError::bad_request("key is required"));
    }

    let ctx = state
        .auth
        .verify_secret(&request.key)
        .ok_or_else(|| ApiError::unauthorized("unknown key"))?;

    let (token, _expires_at) = state.sessions.issue(&ctx.key_id, ctx.permissions.clone());
    tracing::info!(key_id = %ctx.key_id, "session issued");

    Ok(Json(json!({
        "token": token,
        "permissions": sorted_permissions(&ctx),
    })))
}

#[derive(Deserialize)]
pub struct CreateKeyRequest {
    #[serde(default)]
    name: String,
    #[serde(default)]
    permissions: Vec<Permission>,
    #[serde(default)]
    expires_in: Option<serde_json::Value>,
}

/// `POST /api/keys`: create an RBAC key; the secret appears only here.
pub async fn create_key(
    State(state): State<SharedState>,
    Extension(ctx): Extension<AuthContext>,
    body: Bytes,
) -> ApiResult<Response> {
    require(&ctx, Permission::Admin)?;

    let value = parse_json_body(&body).map_err(ApiError::from)?;
    let request: CreateKeyRequest =
        serde_json::from_value(value).map_err(|_| ApiError::bad_request("invalid JSON body"))?;

    let expires_in = match &request.expires_in {
        None | Some(serde_json::Value::Null) => None,
        Some(serde_json::Value::String(spec)) => Some(
            parse_duration_spec(spec)
                .ok_or_else(|| ApiError::bad_request("invalid expires_in"))?,
        ),
        Some(serde_json::Value::Number(n)) => {
            let seconds = n
                .as_u64()
                .ok_or_else(|| ApiError::bad_request("invalid expires_in"))?;
            Some(std::time::Duration::from_secs(seconds))
        }
        Some(_) => return Err(ApiError::bad_request("invalid expires_in")),
    };

    let permissions: HashSet<Permission> = request.permissions.into_iter().collect();
    let created = state
        .auth
        .create(&request.name, permissions, expires_in)
        .map_err(ApiError::from)?;

    tracing::info!(key_id = %created.id, "api key created");
    Ok((StatusCode::CREATED, Json(created)).into_response())
}

/// `GET /api/keys`: list key records, secrets excluded.
pub async fn list_keys(
    State(state): State<SharedState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<serde_json::Value>> {
    require(&ctx, Permission::Admin)?;
    Ok(Json(serde_json::to_value(state.auth.list()).unwrap_or_default()))
}

/// `DELETE /api/keys/{id}`: revoke a key and its sessions.
pub async fn delete_key(
    State(state): State<SharedState>,
    Extension(ctx): Extension<AuthContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    require(&ctx, Permission::Admin)?;
    if !state.auth.delete(&id) {
        return Err(ApiError::not_found("key not found"));
    }
    state.sessions.revoke_for_key(&id);
    tracing::info!(key_id = %id, "api key revoked");
    Ok(Json(json!({"status": "ok"})))
}

// ============================================================================
// Admin
// ============================================================================

/// `GET /admin/workers`: subscribed worker listing.
pub async fn admin_workers(
    State(state): State<SharedState>,
    Extension(ctx): Extension<AuthContext>,
) -> ApiResult<Json<serde_json::Value>> {
    if !ctx.has_any(&[Permission::Read, Permission::Admin]) {
        return Err(ApiError::forbidden("insufficient permissions"));
    }
    Ok(Json(serde_json::to_value(state.registry.list()).unwrap_or_default()))
}

/// `GET /admin/schemas`: schema id listing, unauthenticated.
pub async fn admin_schemas(
    State(state): State<SharedState>,
) -> ApiResult<Json<Vec<String>>> {
    Ok(Json(state.schemas.list().map_err(ApiError::from)?))
}

// ============================================================================
// Schemas
// ============================================================================

/// `GET /schema/{id}`: raw schema JSON, unauthenticated.
pub async fn get_schema(
    State(state): State<SharedState>,
    Path(schema_id): Path<String>,
) -> ApiResult<Json<serde_json::Value>> {
    Ok(Json(state.schemas.get(&schema_id).map_err(ApiError::from)?))
}

/// `PUT /schema/{id}`: store a schema.
pub async fn put_schema(
    State(state): State<SharedState>,
    Extension(ctx): Extension<AuthContext>,
    Path(schema_id): Path<String>,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    require(&ctx, Permission::Admin)?;
    let schema = parse_json_body(&body).map_err(ApiError::from)?;
    state
        .schemas
        .put(&schema_id, &schema)
        .map_err(ApiError::from)?;
    tracing::info!(schema_id = %schema_id, "schema stored");
    Ok(Json(json!({"status": "ok"})))
}

// ============================================================================
// Entities
// ============================================================================

/// `GET /entity/{db}?key=K`: decrypted entity value.
pub async fn get_entity(
    State(state): State<SharedState>,
    Extension(ctx): Extension<AuthContext>,
    Path(database): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> ApiResult<Response> {
    require(&ctx, Permission::Read)?;
    let entity_key = params
        .get("key")
        .ok_or_else(|| ApiError::bad_request("missing key parameter"))?;
    validate_name("database", &database).map_err(ApiError::from)?;
    validate_name("entity_key", entity_key).map_err(ApiError::from)?;

    let request = ProcessRequest {
        database_name: database,
        entity_key: entity_key.clone(),
        operation: "GET".to_string(),
        ..Default::default()
    };
    let response = state.route_process(&request).await.map_err(ApiError::from)?;

    let mut http = Response::new(response.result.into());
    http.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if let Ok(value) = HeaderValue::from_str(&response.cache) {
        if !response.cache.is_empty() {
            http.headers_mut().insert("X-Cache", value);
        }
    }
    Ok(http)
}

/// `PUT /entity/{db}`: body is a single-key object `{key: value}`.
pub async fn put_entity(
    State(state): State<SharedState>,
    Extension(ctx): Extension<AuthContext>,
    Path(database): Path<String>,
    Query(params): Query<HashMap<String, String>>,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    require(&ctx, Permission::Write)?;
    validate_name("database", &database).map_err(ApiError::from)?;

    let value = parse_json_body(&body).map_err(ApiError::from)?;
    let object = value
        .as_object()
        .ok_or_else(|| ApiError::bad_request("body must be a JSON object"))?;
    let mut entries = object.iter();
    let (entity_key, payload) = match (entries.next(), entries.next()) {
        (Some(entry), None) => entry,
        _ => return Err(ApiError::bad_request("body must contain exactly one key")),
    };
    validate_name("entity_key", entity_key).map_err(ApiError::from)?;

    let schema_id = params.get("schema").cloned().unwrap_or_default();
    let request = ProcessRequest {
        database_name: database,
        entity_key: entity_key.clone(),
        schema_id,
        operation: "PUT".to_string(),
        payload: serde_json::to_vec(payload)
            .map_err(|_| ApiError::bad_request("invalid JSON body"))?,
        ..Default::default()
    };
    state.route_process(&request).await.map_err(ApiError::from)?;

    Ok(Json(json!({"status": "ok"})))
}

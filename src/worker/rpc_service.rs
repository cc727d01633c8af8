//! The processing worker's RPC listener: `Process` only.
//!
//! A proc worker sits on a trusted subnet behind the main worker, which has
//! already authenticated and authorized the caller; name validation and
//! everything after it still run here because direct callers exist in test
//! deployments.

use std::sync::Arc;

use axum::extract::rejection::JsonRejection;
use axum::extract::{DefaultBodyLimit, State};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::post;
use axum::Router;

use super::ProcWorker;
use crate::error::DbError;
use crate::rpc::codec::ProcessRequest;
use crate::rpc::{rpc_error_response, MAX_RPC_BODY, PROCESS_PATH};

/// Router serving `POST /deltadb.MainWorker/Process`.
pub fn process_router(worker: Arc<ProcWorker>) -> Router {
    Router::new()
        .route(PROCESS_PATH, post(handle_process))
        .layer(DefaultBodyLimit::max(MAX_RPC_BODY))
        .with_state(worker)
}

async fn handle_process(
    State(worker): State<Arc<ProcWorker>>,
    body: Result<Json<ProcessRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match body {
        Ok(body) => body,
        Err(_) => {
            return rpc_error_response(&DbError::bad_input("malformed request body"));
        }
    };

    match worker.process(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(err) => {
            tracing::warn!(
                operation = %request.operation,
                code = err.kind().rpc_code(),
                "process rpc failed"
            );
            rpc_error_response(&err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::MasterKey;
    use crate::rpc::codec::ProcessResponse;
    use crate::rpc::RpcStatus;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tempfile::TempDir;
    use tower::ServiceExt;

    fn test_router() -> (TempDir, Router) {
        let dir = TempDir::new().unwrap();
        let worker = Arc::new(
            ProcWorker::new("proc-rpc-test", dir.path(), &MasterKey::generate(), 64).unwrap(),
        );
        (dir, process_router(worker))
    }

    fn rpc_request(body: &serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(PROCESS_PATH)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn test_put_then_get_over_rpc() {
        let (_dir, router) = test_router();
        let payload = base64::Engine::encode(
            &base64::engine::general_purpose::STANDARD,
            br#"{"chat":[]}"#,
        );

        let put = router
            .clone()
            .oneshot(rpc_request(&serde_json::json!({
                "database_name": "chatdb",
                "entity_key": "Chat_id",
                "operation": "PUT",
                "payload": payload,
            })))
            .await
            .unwrap();
        assert_eq!(put.status(), StatusCode::OK);
        let put_body: ProcessResponse = body_json(put).await;
        assert_eq!(put_body.status, "OK");
        assert_eq!(put_body.version, 1);

        let get = router
            .oneshot(rpc_request(&serde_json::json!({
                "database_name": "chatdb",
                "entity_key": "Chat_id",
                "operation": "GET",
            })))
            .await
            .unwrap();
        assert_eq!(get.status(), StatusCode::OK);
        let get_body: ProcessResponse = body_json(get).await;
        assert_eq!(get_body.result, br#"{"chat":[]}"#.to_vec());
    }

    #[tokio::test]
    async fn test_invalid_operation_maps_to_invalid_argument() {
        let (_dir, router) = test_router();
        let response = router
            .oneshot(rpc_request(&serde_json::json!({
                "database_name": "chatdb",
                "entity_key": "Chat_id",
                "operation": "BAD",
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let status: RpcStatus = body_json(response).await;
        assert_eq!(status.code, "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_traversal_key_maps_to_invalid_argument() {
        let (_dir, router) = test_router();
        let response = router
            .oneshot(rpc_request(&serde_json::json!({
                "database_name": "chatdb",
                "entity_key": "foo/../../../etc/passwd",
                "operation": "GET",
            })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let status: RpcStatus = body_json(response).await;
        assert_eq!(status.code, "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_malformed_body_is_invalid_argument() {
        let (_dir, router) = test_router();
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(PROCESS_PATH)
                    .header("content-type", "application/json")
                    .body(Body::from("{not-json"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let status: RpcStatus = body_json(response).await;
        assert_eq!(status.code, "INVALID_ARGUMENT");
    }

    #[tokio::test]
    async fn test_subscribe_not_served_here() {
        let (_dir, router) = test_router();
        let response = router
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri(crate::rpc::SUBSCRIBE_PATH)
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

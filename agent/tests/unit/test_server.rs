//! Local HTTP API routes

use std::sync::Arc;

use axum::body::{to_bytes, Body};
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use camsync::models::flow::FlowDocument;
use camsync::server::serve::router;
use camsync::server::state::ServerState;

use crate::fakes::{cloud_app, workspace, Fakes, FLOW_A, FLOW_B};

async fn app_router(fakes: &Arc<Fakes>, bound: bool) -> Router {
    let door = cloud_app("1", "door", FLOW_B, None);
    {
        let mut state = fakes.state();
        state.flow = FlowDocument::new(FLOW_A);
        state.apps.push(door.clone());
        state.apps.push(cloud_app("2", "porch", FLOW_B, None));
    }
    let ws = workspace(fakes, bound.then_some(door)).await;
    router(Arc::new(ServerState::new(ws, fakes.clone())))
}

async fn call(router: Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(value) => {
            request = request.header(header::CONTENT_TYPE, "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };
    let response = router.oneshot(request.body(body).unwrap()).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

#[tokio::test]
async fn test_health() {
    let fakes = Fakes::new();
    let router = app_router(&fakes, true).await;

    let (status, body) = call(router, Method::GET, "/health", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "camsync");
}

#[tokio::test]
async fn test_device_and_workspace() {
    let fakes = Fakes::new();
    let router = app_router(&fakes, true).await;

    let (status, body) = call(router.clone(), Method::GET, "/device", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["osVersion"], "0.1.4");

    let (status, body) = call(router, Method::GET, "/workspace", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["app_id"], "1");
    assert_eq!(body["signed_in"], true);
}

#[tokio::test]
async fn test_list_apps() {
    let fakes = Fakes::new();
    let router = app_router(&fakes, true).await;

    let (status, body) = call(router, Method::GET, "/workspace/apps", None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["total"], 2);
    assert_eq!(body["active_app_id"], "1");
    assert_eq!(body["apps"][1]["app_name"], "porch");
}

#[tokio::test]
async fn test_sync_reports_until_told() {
    let fakes = Fakes::new();
    let router = app_router(&fakes, true).await;

    let (status, body) =
        call(router.clone(), Method::POST, "/workspace/sync", Some(json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "needs_decision");
    assert_eq!(body["decision"], "local_newer");
    assert!(fakes.state().updates.is_empty());

    let (status, body) = call(
        router,
        Method::POST,
        "/workspace/sync",
        Some(json!({"prefer": "local"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "saved_to_cloud");
    assert_eq!(fakes.app("1").unwrap().flow_data.as_str(), FLOW_A);
}

#[tokio::test]
async fn test_load_unknown_app_is_bad_gateway() {
    let fakes = Fakes::new();
    let router = app_router(&fakes, true).await;

    let (status, body) = call(router, Method::POST, "/workspace/apps/9/load", None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["error"], "rejected_by_server");
}

#[tokio::test]
async fn test_save_without_binding_is_not_found() {
    let fakes = Fakes::new();
    let router = app_router(&fakes, false).await;

    let (status, body) = call(router, Method::POST, "/workspace/save", None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"], "not_found");
}

#[tokio::test]
async fn test_actions() {
    let fakes = Fakes::new();
    let router = app_router(&fakes, true).await;

    let (status, _) = call(
        router.clone(),
        Method::POST,
        "/workspace/action",
        Some(json!({"action": "clone"})),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = call(
        router,
        Method::POST,
        "/workspace/action",
        Some(json!({"action": "clone", "app_id": "2", "save_current": true})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], "created");
    assert_eq!(body["app_id"], "101");

    // the device flow was saved into the bound app before switching
    assert_eq!(fakes.app("1").unwrap().flow_data.as_str(), FLOW_A);
    assert_eq!(fakes.app("101").unwrap().app_name, "porch_clone");
    assert_eq!(fakes.state().flow.as_str(), FLOW_B);
}

mod common;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use common::{fast_config, CallCounter, KEY_HEADER};
use idempotency_gate::api::responses::{ApiResponse, ErrorResponse};
use idempotency_gate::api::{business_router, create_router, AppState};
use idempotency_gate::idempotency::{IdempotencyGate, InMemoryStore};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn app_with(business: Router) -> (Router, Arc<IdempotencyGate>, InMemoryStore) {
    let store = InMemoryStore::new();
    let gate = Arc::new(IdempotencyGate::new(Arc::new(store.clone()), fast_config()));
    let state = AppState::new(Arc::new(store.clone()), Arc::clone(&gate));
    (create_router(state, business), gate, store)
}

fn post_json(uri: &str, key: Option<&str>, body: &Value) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json");
    if let Some(key) = key {
        builder = builder.header(KEY_HEADER, key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[test]
fn test_api_response_success_serialization() {
    let response: ApiResponse<String> = ApiResponse::success("test data".to_string());
    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"success\":true"));
    assert!(json.contains("\"data\":\"test data\""));
}

#[test]
fn test_api_response_error_serialization() {
    let error = ErrorResponse::new("STORE_UNAVAILABLE", "Idempotency store is unavailable");
    let response: ApiResponse<()> = ApiResponse::<()>::error(error);
    let json = serde_json::to_string(&response).unwrap();
    assert!(json.contains("\"success\":false"));
    assert!(json.contains("\"code\":\"STORE_UNAVAILABLE\""));
}

#[tokio::test]
async fn test_echo_replays_first_response() {
    let (app, gate, _store) = app_with(business_router());
    let payload = json!({ "patient": "p-17", "slot": "09:30" });

    let first = app
        .clone()
        .oneshot(post_json("/v1/echo", Some("visit-1"), &payload))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::CREATED);
    let first = body_json(first).await;

    let second = app
        .oneshot(post_json("/v1/echo", Some("visit-1"), &json!({ "patient": "someone-else" })))
        .await
        .unwrap();
    assert_eq!(second.status(), StatusCode::CREATED);
    let second = body_json(second).await;

    assert_eq!(first, second);
    assert_eq!(first["data"]["received"], payload);
    assert_eq!(gate.stats().snapshot().replays, 1);
}

#[tokio::test]
async fn test_echo_without_key_executes_each_time() {
    let (app, _gate, store) = app_with(business_router());
    let payload = json!({ "patient": "p-17" });

    let first = body_json(app.clone().oneshot(post_json("/v1/echo", None, &payload)).await.unwrap()).await;
    let second = body_json(app.oneshot(post_json("/v1/echo", None, &payload)).await.unwrap()).await;

    assert_ne!(first["data"]["id"], second["data"]["id"]);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_server_errors_are_not_cached() {
    let counter = CallCounter::new();
    let handler_counter = counter.clone();
    let business = Router::new().route(
        "/v1/fail",
        post(move || {
            let counter = handler_counter.clone();
            async move {
                counter.hit();
                (StatusCode::INTERNAL_SERVER_ERROR, "scheduler offline")
            }
        }),
    );
    let (app, gate, store) = app_with(business);

    for _ in 0..2 {
        let response = app
            .clone()
            .oneshot(post_json("/v1/fail", Some("retry-me"), &json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"scheduler offline");
    }

    assert_eq!(counter.count(), 2);
    assert!(store.is_empty());
    assert_eq!(gate.stats().snapshot().downstream_failures, 2);
}

#[tokio::test]
async fn test_client_errors_are_cached() {
    let counter = CallCounter::new();
    let handler_counter = counter.clone();
    let business = Router::new().route(
        "/v1/slots",
        post(move || {
            let counter = handler_counter.clone();
            async move {
                counter.hit();
                (StatusCode::CONFLICT, "slot already taken")
            }
        }),
    );
    let (app, _gate, _store) = app_with(business);

    for _ in 0..3 {
        let response = app
            .clone()
            .oneshot(post_json("/v1/slots", Some("slot-9"), &json!({})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    assert_eq!(counter.count(), 1);
}

#[tokio::test]
async fn test_get_routes_bypass_the_gate() {
    let counter = CallCounter::new();
    let handler_counter = counter.clone();
    let business = Router::new().route(
        "/v1/slots",
        get(move || {
            let counter = handler_counter.clone();
            async move {
                counter.hit();
                "[]"
            }
        }),
    );
    let (app, gate, store) = app_with(business);

    for _ in 0..2 {
        let request = Request::builder()
            .uri("/v1/slots")
            .header(KEY_HEADER, "ignored")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    assert_eq!(counter.count(), 2);
    assert!(store.is_empty());
    assert_eq!(gate.stats().snapshot().bypassed_requests, 2);
}

#[tokio::test]
async fn test_health_endpoints() {
    let (app, _gate, _store) = app_with(business_router());

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["store"]["name"], "store");

    for uri in ["/live", "/ready", "/health/detailed"] {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK, "{}", uri);
    }
}

#[tokio::test]
async fn test_metrics_endpoint_without_exporter() {
    let (app, _gate, _store) = app_with(business_router());

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let (app, _gate, _store) = app_with(business_router());

    let response = app
        .oneshot(Request::builder().uri("/live").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

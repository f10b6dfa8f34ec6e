mod common;

use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use beacon_gateway::hub::Transport;
use serde_json::{json, Value};
use tower::ServiceExt;

use common::{identity, router, state, PUBLISH_TOKEN};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn publish(token: Option<&str>, body: Value) -> Request<Body> {
    let mut req = Request::builder()
        .method("POST")
        .uri("/broadcast")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    req.body(Body::from(body.to_string())).unwrap()
}

#[tokio::test]
async fn health_reports_connection_count() {
    let state = state(None);
    let (transport, _rx) = Transport::channel(8);
    state
        .manager
        .register(identity("u-1", "alice", &[]), transport)
        .unwrap();

    let response = router(&state).oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 1);
    // registered directly, no socket session behind it
    assert_eq!(body["sockets"], 0);
    assert!(body["version"].is_string());
}

#[tokio::test]
async fn stats_are_camel_case() {
    let state = state(None);
    let (transport, _rx) = Transport::channel(8);
    let id = state
        .manager
        .register(identity("u-1", "alice", &[]), transport)
        .unwrap();
    state
        .manager
        .subscribe(&id, "inventory.changes", json!({"lotId": 5}));

    let response = router(&state).oneshot(get("/stats")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body["totalConnections"], 1);
    assert_eq!(body["totalSubscriptions"], 1);
    assert_eq!(body["channels"], json!(["inventory.changes"]));
    assert_eq!(body["perPrincipalConnectionCounts"]["u-1"], 1);

    let response = router(&state).oneshot(get("/stats/registry")).await.unwrap();
    let body = body_json(response).await;
    assert_eq!(body[0]["channel"], "inventory.changes");
    assert_eq!(body[0]["members"][0], id.as_str());
}

#[tokio::test]
async fn ws_rejects_bad_token_before_upgrade() {
    let state = state(None);

    let response = router(&state).oneshot(get("/ws?token=nope")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let body = body_json(response).await;
    assert!(body["error"].as_str().unwrap().contains("authentication failed"));

    let response = router(&state).oneshot(get("/ws")).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(body_json(response).await["error"], "missing credential");

    assert_eq!(state.manager.connection_count(), 0);
}

#[tokio::test]
async fn ws_refuses_after_shutdown() {
    let state = state(None);
    state.manager.shutdown();
    let response = router(&state)
        .oneshot(get("/ws?token=alice-token"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn publish_is_hidden_without_token() {
    let state = state(None);
    let response = router(&state)
        .oneshot(publish(Some("anything"), json!({"channel": "a", "data": {}})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn publish_requires_bearer() {
    let state = state(Some(PUBLISH_TOKEN));
    for token in [None, Some("wrong")] {
        let response = router(&state)
            .oneshot(publish(token, json!({"channel": "a", "data": {}})))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

#[tokio::test]
async fn publish_fans_out_to_subscribers() {
    let state = state(Some(PUBLISH_TOKEN));
    let (transport, mut rx) = Transport::channel(8);
    let id = state
        .manager
        .register(identity("u-1", "alice", &[]), transport)
        .unwrap();
    state
        .manager
        .subscribe(&id, "inventory.changes", json!({"lotId": 5}));
    while rx.try_recv().is_ok() {}

    let response = router(&state)
        .oneshot(publish(
            Some(PUBLISH_TOKEN),
            json!({"channel": "inventory.changes", "data": {"qty": 3}, "filters": {"lotId": 5}}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let body = body_json(response).await;
    assert_eq!(body["recipients"], 1);
    assert_eq!(body["matched"], "exact");
    assert!(rx.try_recv().is_ok());
}

#[tokio::test]
async fn publish_rejects_empty_channel() {
    let state = state(Some(PUBLISH_TOKEN));
    let response = router(&state)
        .oneshot(publish(Some(PUBLISH_TOKEN), json!({"channel": "  ", "data": {}})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

use crate::{api, state::AppState};

fn setup_app(capacity: usize) -> (axum::Router, Arc<AppState>) {
    let state = Arc::new(AppState::new(capacity));
    let app = api::routes().with_state(state.clone());
    (app, state)
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse json")
}

fn access_request(port: u16) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/access/request")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({
                "vehicle": { "host": "10.0.0.1", "port": port },
                "entry": "E1",
                "exit": "X3",
                "eta_ms": 1_000,
                "cross_duration_ms": 2_000
            })
            .to_string(),
        ))
        .unwrap()
}

fn status_request(port: u16) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(format!("/v1/access/status?host=10.0.0.1&port={port}"))
        .body(Body::empty())
        .unwrap()
}

fn exiting_request(port: u16) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/v1/access/exiting")
        .header("content-type", "application/json")
        .body(Body::from(
            json!({ "vehicle": { "host": "10.0.0.1", "port": port } }).to_string(),
        ))
        .unwrap()
}

#[tokio::test]
async fn request_is_queued_and_granted_after_the_loop_runs() {
    let (app, state) = setup_app(8);

    let res = app.clone().oneshot(access_request(9000)).await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body = read_json(res).await;
    assert_eq!(body["position"], json!(0));

    // Not granted until the grant loop has ticked.
    let res = app.clone().oneshot(status_request(9000)).await.unwrap();
    let body = read_json(res).await;
    assert_eq!(body["granted"], Value::Bool(false));

    state.grant_next();

    let res = app.clone().oneshot(status_request(9000)).await.unwrap();
    let body = read_json(res).await;
    assert_eq!(body["granted"], Value::Bool(true));
}

#[tokio::test]
async fn two_competing_vehicles_are_serialized_fcfs() {
    let (app, state) = setup_app(8);

    // Both vehicles request within the same tick; arrival order decides.
    let res = app.clone().oneshot(access_request(9000)).await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let res = app.clone().oneshot(access_request(9001)).await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);

    state.grant_next();

    let body = read_json(app.clone().oneshot(status_request(9000)).await.unwrap()).await;
    assert_eq!(body["granted"], Value::Bool(true));
    let body = read_json(app.clone().oneshot(status_request(9001)).await.unwrap()).await;
    assert_eq!(body["granted"], Value::Bool(false));

    // No second grant while the first is outstanding.
    state.grant_next();
    let body = read_json(app.clone().oneshot(status_request(9001)).await.unwrap()).await;
    assert_eq!(body["granted"], Value::Bool(false));

    // First vehicle completes the Exiting handshake; second gets its turn.
    let res = app.clone().oneshot(exiting_request(9000)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let ack = read_json(res).await;
    assert_eq!(ack["vehicle"]["port"], json!(9000));

    state.grant_next();
    let body = read_json(app.clone().oneshot(status_request(9001)).await.unwrap()).await;
    assert_eq!(body["granted"], Value::Bool(true));
}

#[tokio::test]
async fn duplicate_request_keeps_one_entry() {
    let (app, _state) = setup_app(8);

    let res = app.clone().oneshot(access_request(9000)).await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let res = app.clone().oneshot(access_request(9000)).await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let body = read_json(res).await;
    assert_eq!(body["position"], json!(0));

    let queue_req = Request::builder()
        .method("GET")
        .uri("/v1/queue")
        .body(Body::empty())
        .unwrap();
    let queue = read_json(app.clone().oneshot(queue_req).await.unwrap()).await;
    assert_eq!(queue.as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn full_queue_rejects_with_service_unavailable() {
    let (app, _state) = setup_app(1);

    let res = app.clone().oneshot(access_request(9000)).await.unwrap();
    assert_eq!(res.status(), StatusCode::ACCEPTED);
    let res = app.clone().oneshot(access_request(9001)).await.unwrap();
    assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn exit_from_unknown_vehicle_is_still_acknowledged() {
    let (app, _state) = setup_app(8);

    let res = app.clone().oneshot(exiting_request(9999)).await.unwrap();
    assert_eq!(res.status(), StatusCode::OK);
    let ack = read_json(res).await;
    assert_eq!(ack["vehicle"]["port"], json!(9999));
}

use std::sync::Arc;

use axum::{
    body::{to_bytes, Body},
    http::Request,
    Router,
};
use hyper::StatusCode;
use serde_json::{json, Value};
use tower::ServiceExt;
use tracker_routing::{
    create_router,
    test_support::{point, test_service, ScriptedUpstream},
    AppState,
};

fn test_app() -> (Router, Arc<ScriptedUpstream>) {
    let upstream = Arc::new(ScriptedUpstream::new());
    let service = test_service(Arc::clone(&upstream));
    (create_router(AppState { service }), upstream)
}

fn request(method: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri("/api/routing");
    match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Vec<u8>) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), 16 * 1024 * 1024).await.unwrap();
    (status, bytes.to_vec())
}

async fn send_json(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let (status, bytes) = send(app, request).await;
    (status, serde_json::from_slice(&bytes).unwrap())
}

fn ndjson_lines(bytes: &[u8]) -> Vec<Value> {
    std::str::from_utf8(bytes)
        .unwrap()
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).unwrap())
        .collect()
}

#[tokio::test]
async fn compute_returns_combined_route() {
    let (app, upstream) = test_app();
    let payload = json!({"waypoints": [[45.0, 5.0], [45.1, 5.1], [45.2, 5.2]]});

    let (status, body) = send_json(&app, request("POST", Some(payload))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], json!(true));
    assert_eq!(body["cached"], json!(true));
    assert_eq!(body["waypoints"], json!(3));
    assert_eq!(body["route"]["distance"], json!(2000.0));
    assert_eq!(body["route"]["geometry"]["type"], json!("LineString"));
    assert_eq!(body["route"]["geometry"]["coordinates"].as_array().unwrap().len(), 5);
    assert_eq!(upstream.total_calls(), 2);
}

#[tokio::test]
async fn repeated_compute_is_served_from_cache() {
    let (app, upstream) = test_app();
    let payload = json!({"waypoints": [[45.0, 5.0], [45.1, 5.1]]});

    let (first, _) = send_json(&app, request("POST", Some(payload.clone()))).await;
    let (second, _) = send_json(&app, request("POST", Some(payload))).await;

    assert_eq!(first, StatusCode::OK);
    assert_eq!(second, StatusCode::OK);
    assert_eq!(upstream.total_calls(), 1);
}

#[tokio::test]
async fn validation_errors_are_bad_requests() {
    let (app, upstream) = test_app();
    let too_many: Vec<Value> = (0..101)
        .map(|i| json!([45.0 + f64::from(i) * 0.001, 5.0]))
        .collect();

    let cases = [
        (json!({"waypoints": "nope"}), "Invalid waypoints provided"),
        (json!({"waypoints": [[1, 2]]}), "At least 2 valid waypoints required"),
        (json!({"waypoints": [[91, 0], [0, 0]]}), "At least 2 valid waypoints required"),
        (json!({ "waypoints": too_many }), "Too many waypoints (max 100)"),
    ];

    for (payload, message) in cases {
        let (status, body) = send_json(&app, request("POST", Some(payload))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": message }));
    }
    assert_eq!(upstream.total_calls(), 0);
}

#[tokio::test]
async fn malformed_body_is_rejected() {
    let (app, _) = test_app();
    let request = Request::builder()
        .method("POST")
        .uri("/api/routing")
        .header("content-type", "application/json")
        .body(Body::from("{not json"))
        .unwrap();

    let (status, body) = send_json(&app, request).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"], json!("Invalid waypoints provided"));
}

#[tokio::test]
async fn unroutable_request_is_server_error() {
    let (app, upstream) = test_app();
    let (a, b) = (point(45.0, 5.0), point(45.1, 5.1));
    upstream.fail_segment(a, b);

    let payload = json!({"waypoints": [[45.0, 5.0], [45.1, 5.1]]});
    let (status, body) = send_json(&app, request("POST", Some(payload))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"], json!("No valid route segments available"));
    assert_eq!(upstream.calls_for(a, b), 3);
}

#[tokio::test]
async fn stream_emits_ndjson_events() {
    let (app, _) = test_app();
    let payload = json!({"waypoints": [[45.0, 5.0], [45.1, 5.1], [45.2, 5.2]], "stream": true});

    let response = app
        .clone()
        .oneshot(request("POST", Some(payload)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let headers = response.headers();
    assert_eq!(headers["content-type"], "application/x-ndjson");
    assert_eq!(headers["cache-control"], "no-cache");
    assert_eq!(headers["x-accel-buffering"], "no");

    let bytes = to_bytes(response.into_body(), 16 * 1024 * 1024).await.unwrap();
    let events = ndjson_lines(&bytes);

    assert_eq!(events.first().unwrap()["type"], json!("status"));
    assert_eq!(events.first().unwrap()["totalSegments"], json!(2));
    let segments: Vec<&Value> = events.iter().filter(|e| e["type"] == "segment").collect();
    assert_eq!(segments.len(), 2);
    assert_eq!(segments.last().unwrap()["progress"], json!(2));

    let last = events.last().unwrap();
    assert_eq!(last["type"], json!("complete_route"));
    assert_eq!(last["waypoints"], json!(3));
    assert_eq!(last["segments"]["fetched"], json!(2));
    assert_eq!(last["segments"]["total"], json!(2));
}

#[tokio::test]
async fn stream_of_cached_route_completes_immediately() {
    let (app, upstream) = test_app();
    let waypoints = json!([[45.0, 5.0], [45.1, 5.1]]);

    send(&app, request("POST", Some(json!({ "waypoints": waypoints })))).await;
    let (status, bytes) = send(
        &app,
        request("POST", Some(json!({ "waypoints": waypoints, "stream": true }))),
    )
    .await;
    let events = ndjson_lines(&bytes);

    assert_eq!(status, StatusCode::OK);
    assert_eq!(events.len(), 2);
    assert_eq!(events[1]["type"], json!("complete_route"));
    assert_eq!(events[1]["segments"]["cached"], json!(1));
    assert_eq!(upstream.total_calls(), 1);
}

#[tokio::test]
async fn stream_reports_failures_then_error() {
    let (app, upstream) = test_app();
    upstream.fail_segment(point(45.0, 5.0), point(45.1, 5.1));

    let payload = json!({"waypoints": [[45.0, 5.0], [45.1, 5.1]], "stream": 1});
    let (status, bytes) = send(&app, request("POST", Some(payload))).await;
    let events = ndjson_lines(&bytes);
    let kinds: Vec<&str> = events.iter().map(|e| e["type"].as_str().unwrap()).collect();

    assert_eq!(status, StatusCode::OK);
    assert_eq!(kinds, ["status", "status", "segment_error", "warning", "error"]);
    assert_eq!(events[3]["failedSegments"], json!([0]));
    assert_eq!(events[4]["message"], json!("No valid route segments available"));
}

#[tokio::test]
async fn stats_reflect_cache_contents() {
    let (app, _) = test_app();
    let payload = json!({"waypoints": [[45.0, 5.0], [45.1, 5.1], [45.2, 5.2]]});
    send(&app, request("POST", Some(payload))).await;

    let (status, body) = send_json(&app, request("GET", None)).await;
    let stats = &body["stats"];

    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["totalRoutesInCache"], json!(1));
    assert_eq!(stats["validRoutesInCache"], json!(1));
    assert_eq!(stats["totalSegmentsInCache"], json!(2));
    assert_eq!(stats["validSegmentsInCache"], json!(2));
    assert_eq!(stats["cacheTTL"], json!(86_400_000));
    assert_eq!(stats["pendingRequestTTL"], json!(300_000));
}

#[tokio::test]
async fn delete_runs_cleanup() {
    let (app, _) = test_app();
    let payload = json!({"waypoints": [[45.0, 5.0], [45.1, 5.1]]});
    send(&app, request("POST", Some(payload))).await;

    let (status, body) = send_json(&app, request("DELETE", None)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], json!("Cache cleanup completed"));
    // nothing has expired yet
    assert_eq!(body["deletedRoutes"], json!(0));
    assert_eq!(body["deletedSegments"], json!(0));

    let (_, stats) = send_json(&app, request("GET", None)).await;
    assert_eq!(stats["stats"]["totalRoutesInCache"], json!(1));
}

#[tokio::test]
async fn health_check() {
    let (app, _) = test_app();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();

    let (status, body) = send(&app, request).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, b"ok");
}

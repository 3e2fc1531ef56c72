mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use std::sync::atomic::Ordering;
use tower::ServiceExt;

use common::{Harness, BUCKET, USER_HEADER};
use quickpitch::config::ServerConfig;
use quickpitch::server::create_router;

fn router(harness: &Harness) -> Router {
    create_router(harness.app_state(), &ServerConfig::default())
}

async fn send(app: Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

fn as_user(user: &str, method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(USER_HEADER, user)
        .header("content-type", "application/json");
    match body {
        Some(body) => builder.body(Body::from(body.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn create_pitch(harness: &Harness, user: &str) -> Value {
    let (status, body) = send(
        router(harness),
        as_user(user, "POST", "/pitch", Some(json!({ "name": "My Pitch" }))),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["data"].clone()
}

#[tokio::test]
async fn test_health() {
    let harness = Harness::new();
    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let (status, body) = send(router(&harness), request).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}

#[tokio::test]
async fn test_create_pitch_returns_keys_and_upload_urls() {
    let harness = Harness::new();
    let (status, body) = send(
        router(&harness),
        as_user("alice", "POST", "/pitch", Some(json!({ "name": "My Pitch" }))),
    )
    .await;

    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["status"], "success");
    assert_eq!(body["code"], 201);
    let data = &body["data"];
    let resume_key = data["resume_file_key"].as_str().unwrap();
    let video_key = data["video_file_key"].as_str().unwrap();
    assert!(resume_key.ends_with(".pdf"));
    assert!(video_key.ends_with(".mp4"));
    assert!(data["resume_upload_url"].as_str().unwrap().contains(resume_key));
    assert!(data["video_upload_url"].as_str().unwrap().contains(video_key));
    assert_eq!(data["upload_method"], "PUT");
    assert!(data["id"].as_str().is_some());
}

#[tokio::test]
async fn test_unauthenticated_requests_get_401() {
    let harness = Harness::new();
    let request = Request::builder()
        .method("POST")
        .uri("/pitch")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "name": "My Pitch" }).to_string()))
        .unwrap();
    let (status, body) = send(router(&harness), request).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["status"], "error");

    // Identity provider outage also answers 401
    harness.identity.fail.store(true, Ordering::SeqCst);
    let (status, _) = send(router(&harness), as_user("alice", "GET", "/pitch", None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_create_pitch_validation() {
    let harness = Harness::new();
    let (status, body) = send(
        router(&harness),
        as_user("alice", "POST", "/pitch", Some(json!({ "name": "x" }))),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], 400);

    let (status, _) = send(router(&harness), as_user("alice", "POST", "/pitch", None)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_storage_outage_on_create_is_503() {
    let harness = Harness::new();
    harness.storage.fail_presign.store(true, Ordering::SeqCst);
    let (status, body) = send(
        router(&harness),
        as_user("alice", "POST", "/pitch", Some(json!({ "name": "My Pitch" }))),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["status"], "error");
}

#[tokio::test]
async fn test_finalize_flow_over_http() {
    let harness = Harness::new();
    let created = create_pitch(&harness, "alice").await;
    let id = created["id"].as_str().unwrap();
    let uri = format!("/pitch/{id}/finalize");

    let (status, _) = send(router(&harness), as_user("alice", "PATCH", &uri, None)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    harness
        .storage
        .put(BUCKET, created["resume_file_key"].as_str().unwrap())
        .await;
    let (status, body) = send(router(&harness), as_user("alice", "PATCH", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "queued");
    assert_eq!(body["data"]["messageId"], "msg-1");

    let (status, body) = send(router(&harness), as_user("alice", "PATCH", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "Pitch already finalized");

    harness.queue.fail.store(true, Ordering::SeqCst);
    let second = create_pitch(&harness, "alice").await;
    harness
        .storage
        .put(BUCKET, second["resume_file_key"].as_str().unwrap())
        .await;
    let uri = format!("/pitch/{}/finalize", second["id"].as_str().unwrap());
    let (status, _) = send(router(&harness), as_user("alice", "PATCH", &uri, None)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_read_list_delete_are_owner_scoped() {
    let harness = Harness::new();
    let created = create_pitch(&harness, "alice").await;
    let id = created["id"].as_str().unwrap();
    let uri = format!("/pitch/{id}");

    let (status, body) = send(router(&harness), as_user("alice", "GET", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "draft");
    assert_eq!(body["data"]["resumeObjectKey"], created["resume_file_key"]);

    let (status, body) = send(router(&harness), as_user("bob", "GET", &uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["message"], "resource not found");

    let (_, body) = send(router(&harness), as_user("bob", "GET", "/pitch", None)).await;
    assert_eq!(body["data"], json!([]));
    let (_, body) = send(router(&harness), as_user("alice", "GET", "/pitch", None)).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);

    let (status, _) = send(router(&harness), as_user("bob", "DELETE", &uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, body) = send(router(&harness), as_user("alice", "DELETE", &uri, None)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["id"], id);
    let (status, _) = send(router(&harness), as_user("alice", "GET", &uri, None)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

fn webhook_request(headers: &[(&str, String)], body: &[u8]) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/webhooks/completion")
        .header("content-type", "application/json");
    for (name, value) in headers {
        builder = builder.header(*name, value.as_str());
    }
    builder.body(Body::from(body.to_vec())).unwrap()
}

#[tokio::test]
async fn test_completion_webhook() {
    let harness = Harness::new();
    let gate = harness.gate();
    let created = create_pitch(&harness, "alice").await;
    let body = serde_json::to_vec(&json!({
        "submissionId": created["id"],
        "objectKey": created["resume_file_key"],
    }))
    .unwrap();
    let signed: Vec<(&str, String)> = common::signed_headers(&gate, "msg_1", &body)
        .into_iter()
        .collect();

    let (status, response) = send(router(&harness), webhook_request(&signed, &body)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(response["data"]["status"], "success");

    // Replay is acknowledged and changes nothing
    let (status, _) = send(router(&harness), webhook_request(&signed, &body)).await;
    assert_eq!(status, StatusCode::OK);

    let uri = format!("/pitch/{}", created["id"].as_str().unwrap());
    let (_, pitch) = send(router(&harness), as_user("alice", "GET", &uri, None)).await;
    assert_eq!(pitch["data"]["status"], "success");
}

#[tokio::test]
async fn test_forged_webhooks_get_identical_401() {
    let harness = Harness::new();
    let gate = harness.gate();
    let body = br#"{"submissionId":"abc","objectKey":"a.pdf"}"#;
    let signed: Vec<(&str, String)> = common::signed_headers(&gate, "msg_1", body)
        .into_iter()
        .collect();

    let tampered_body = br#"{"submissionId":"xyz","objectKey":"a.pdf"}"#;
    let (status_a, body_a) = send(router(&harness), webhook_request(&signed, tampered_body)).await;

    let missing: Vec<(&str, String)> = signed
        .iter()
        .filter(|(name, _)| *name != "webhook-signature")
        .cloned()
        .collect();
    let (status_b, body_b) = send(router(&harness), webhook_request(&missing, body)).await;

    let stale: Vec<(&str, String)> = signed
        .iter()
        .map(|(name, value)| match *name {
            "webhook-timestamp" => (*name, "1000000000".to_string()),
            _ => (*name, value.clone()),
        })
        .collect();
    let (status_c, body_c) = send(router(&harness), webhook_request(&stale, body)).await;

    assert_eq!(status_a, StatusCode::UNAUTHORIZED);
    assert_eq!(status_b, StatusCode::UNAUTHORIZED);
    assert_eq!(status_c, StatusCode::UNAUTHORIZED);
    assert_eq!(body_a, body_b);
    assert_eq!(body_b, body_c);
}

#[tokio::test]
async fn test_authentic_but_unusable_events_are_acknowledged() {
    let harness = Harness::new();
    let gate = harness.gate();

    for body in [
        br#"{"submissionId":"unknown","objectKey":"a.pdf"}"#.to_vec(),
        br#"{"objectKey":"a.pdf"}"#.to_vec(),
    ] {
        let signed: Vec<(&str, String)> = common::signed_headers(&gate, "msg_x", &body)
            .into_iter()
            .collect();
        let (status, response) = send(router(&harness), webhook_request(&signed, &body)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(response["message"], "Event ignored");
    }
}

#[tokio::test]
async fn test_request_id_is_propagated() {
    let harness = Harness::new();
    let request = Request::builder()
        .uri("/health")
        .header("x-request-id", "req-123")
        .body(Body::empty())
        .unwrap();
    let response = router(&harness).oneshot(request).await.unwrap();
    assert_eq!(response.headers()["x-request-id"], "req-123");

    let request = Request::builder().uri("/health").body(Body::empty()).unwrap();
    let response = router(&harness).oneshot(request).await.unwrap();
    assert!(response.headers().contains_key("x-request-id"));
}

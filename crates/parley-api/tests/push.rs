mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Json, Router,
    extract::State,
    http::{HeaderMap, Method, StatusCode, header},
    routing::post,
};
use serde_json::{Value, json};

use parley_api::push::{MAX_BODY_CHARS, PushClient};

use common::{app_with_push, call, direct, sign_in};

/// Requests seen by the fake push gateway: (Authorization header, JSON body).
#[derive(Clone, Default)]
struct Captured(Arc<Mutex<Vec<(Option<String>, Value)>>>);

impl Captured {
    fn snapshot(&self) -> Vec<(Option<String>, Value)> {
        self.0.lock().unwrap().clone()
    }

    /// Wait until at least `n` requests arrived; fan-out runs detached.
    async fn wait_for(&self, n: usize) -> Vec<(Option<String>, Value)> {
        for _ in 0..250 {
            let seen = self.snapshot();
            if seen.len() >= n {
                return seen;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("expected {} push requests, got {}", n, self.snapshot().len());
    }
}

async fn fake_gateway(
    State(captured): State<Captured>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    let delivered = body["tokens"].as_array().map_or(0, |tokens| tokens.len());
    let auth = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);
    captured.0.lock().unwrap().push((auth, body));
    Json(json!({ "success_count": delivered, "failure_count": 0 }))
}

/// Start the fake gateway and return a router whose push client points at it.
async fn app_with_fake_gateway() -> (Router, Captured) {
    let captured = Captured::default();
    let gateway = Router::new()
        .route("/send", post(fake_gateway))
        .with_state(captured.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, gateway).await.unwrap();
    });

    let push = PushClient::new(Some(format!("http://{}/send", addr)), Some("k".into())).unwrap();
    (app_with_push(push), captured)
}

async fn register(app: &Router, token: &str, device: &str) {
    let (status, _) = call(
        app,
        Method::POST,
        "/push/tokens",
        Some(token),
        Some(json!({ "token": device })),
    )
    .await;
    assert_eq!(status, StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn send_and_forward_notify_other_participants() {
    let (app, captured) = app_with_fake_gateway().await;
    let (ada, _) = sign_in(&app, "ada").await;
    let (bob, bob_id) = sign_in(&app, "bob").await;
    let cid = direct(&app, &ada, &bob_id).await;
    register(&app, &ada, "ada-dev").await;
    register(&app, &bob, "bob-dev").await;

    let long = "x".repeat(150);
    let (status, sent) = call(
        &app,
        Method::POST,
        &format!("/conversations/{}/messages", cid),
        Some(&ada),
        Some(json!({ "content": long })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let seen = captured.wait_for(1).await;
    let (auth, body) = &seen[0];
    assert_eq!(auth.as_deref(), Some("Bearer k"));
    assert_eq!(body["tokens"], json!(["bob-dev"]));
    assert_eq!(body["notification"]["title"], "ada");
    assert_eq!(body["notification"]["body"], "x".repeat(MAX_BODY_CHARS));
    assert_eq!(body["data"]["body"], "x".repeat(MAX_BODY_CHARS));
    assert_eq!(body["webpush"]["fcm_options"]["link"], "/chat");

    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/messages/{}/forward", sent["id"].as_str().unwrap()),
        Some(&ada),
        Some(json!({ "target_conversation_id": cid })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let seen = captured.wait_for(2).await;
    assert_eq!(seen[1].1["tokens"], json!(["bob-dev"]));
}

#[tokio::test]
async fn explicit_send_reports_delivery_counts() {
    let (app, captured) = app_with_fake_gateway().await;
    let (ada, ada_id) = sign_in(&app, "ada").await;
    let (bob, bob_id) = sign_in(&app, "bob").await;
    register(&app, &bob, "bob-dev").await;

    let (status, body) = call(
        &app,
        Method::POST,
        "/notifications/send",
        Some(&ada),
        Some(json!({ "recipient_user_ids": [bob_id], "sender_name": "ada", "body": "hi" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true, "sent": 1, "tokens_found": 1 }));

    let seen = captured.snapshot();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].1["notification"]["body"], "hi");

    // No registered devices: nothing goes out
    let (status, body) = call(
        &app,
        Method::POST,
        "/notifications/send",
        Some(&bob),
        Some(json!({ "recipient_user_ids": [ada_id], "sender_name": "bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "ok": true, "sent": 0, "tokens_found": 0 }));
    assert_eq!(captured.snapshot().len(), 1);
}

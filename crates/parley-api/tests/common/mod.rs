//! Helpers shared by the integration tests.
#![allow(dead_code)]

use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use http_body_util::BodyExt;
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;

use parley_api::push::PushClient;
use parley_api::{AppStateInner, router};
use parley_db::Database;
use parley_gateway::auth::TokenVerifier;
use parley_gateway::dispatcher::Dispatcher;

pub const SECRET: &str = "router-test-secret";

pub fn app_with_push(push: PushClient) -> Router {
    let state = Arc::new(AppStateInner {
        db: Arc::new(Database::open_in_memory().unwrap()),
        dispatcher: Dispatcher::new(),
        verifier: TokenVerifier::new(SECRET, None),
        push,
    });
    router(state)
}

pub fn app() -> Router {
    app_with_push(PushClient::disabled())
}

pub fn token(sub: &str) -> String {
    let claims = json!({
        "sub": sub,
        "exp": chrono::Utc::now().timestamp() + 3600,
    });
    encode(&Header::default(), &claims, &EncodingKey::from_secret(SECRET.as_bytes())).unwrap()
}

pub async fn call(app: &Router, method: Method, uri: &str, token: Option<&str>, body: Option<Value>) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        req = req.header(header::AUTHORIZATION, format!("Bearer {}", token));
    }
    let req = match body {
        Some(body) => req
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => req.body(Body::empty()).unwrap(),
    };

    let res = app.clone().oneshot(req).await.unwrap();
    let status = res.status();
    let bytes = res.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

/// Sync a user and return (token, id).
pub async fn sign_in(app: &Router, name: &str) -> (String, String) {
    let token = token(&format!("idp|{}", name));
    let (status, body) = call(app, Method::POST, "/users/sync", Some(&token), Some(json!({ "name": name }))).await;
    assert_eq!(status, StatusCode::OK);
    (token, body["id"].as_str().unwrap().to_string())
}

/// Open the 1:1 conversation between the token's user and `other_id`.
pub async fn direct(app: &Router, token: &str, other_id: &str) -> String {
    let (status, created) = call(
        app,
        Method::POST,
        "/conversations/direct",
        Some(token),
        Some(json!({ "other_user_id": other_id })),
    )
    .await;
    assert!(status.is_success());
    created["conversation_id"].as_str().unwrap().to_string()
}

mod common;

use std::net::SocketAddr;
use std::time::Duration;

use axum::{
    Router,
    http::{Method, StatusCode},
};
use futures_util::{SinkExt, StreamExt};
use jsonwebtoken::{EncodingKey, Header, encode};
use serde_json::{Value, json};
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use common::{app, call, direct, sign_in, token};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

/// Serve the router on an ephemeral port. The returned clone shares its state.
async fn serve(app: &Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = app.clone();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

async fn open(addr: SocketAddr, token: &str) -> Socket {
    let (mut ws, _) = connect_async(format!("ws://{}/gateway", addr)).await.unwrap();
    let identify = json!({ "type": "Identify", "data": { "token": token } });
    ws.send(Message::text(identify.to_string())).await.unwrap();
    ws
}

/// Identify and wait for Ready.
async fn connect(addr: SocketAddr, token: &str) -> Socket {
    let mut ws = open(addr, token).await;
    next_event(&mut ws, "Ready").await.expect("no Ready");
    ws
}

/// Next JSON text frame, or None once the socket is closed or quiet for `wait`.
async fn recv_json(ws: &mut Socket, wait: Duration) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + wait;
    loop {
        let frame = tokio::time::timeout_at(deadline, ws.next()).await.ok()??;
        match frame {
            Ok(Message::Text(text)) => return serde_json::from_str(text.as_str()).ok(),
            Ok(Message::Close(_)) | Err(_) => return None,
            Ok(_) => continue,
        }
    }
}

/// Skip ahead to the next event of the given type.
async fn next_event(ws: &mut Socket, kind: &str) -> Option<Value> {
    let deadline = tokio::time::Instant::now() + WAIT;
    loop {
        let left = deadline.saturating_duration_since(tokio::time::Instant::now());
        let event = recv_json(ws, left).await?;
        if event["type"] == kind {
            return Some(event);
        }
    }
}

/// Everything that arrives within `window`.
async fn drain(ws: &mut Socket, window: Duration) -> Vec<Value> {
    let mut events = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    loop {
        let left = deadline.saturating_duration_since(tokio::time::Instant::now());
        match recv_json(ws, left).await {
            Some(event) => events.push(event),
            None => return events,
        }
    }
}

#[tokio::test]
async fn conversation_events_reach_participants_only() {
    let app = app();
    let addr = serve(&app).await;
    let (ada, _) = sign_in(&app, "ada").await;
    let (bob, bob_id) = sign_in(&app, "bob").await;
    let (eve, _) = sign_in(&app, "eve").await;

    let mut ada_ws = connect(addr, &ada).await;
    let mut bob_ws = connect(addr, &bob).await;
    let mut eve_ws = connect(addr, &eve).await;

    let cid = direct(&app, &ada, &bob_id).await;
    let (status, _) = call(
        &app,
        Method::POST,
        &format!("/conversations/{}/messages", cid),
        Some(&ada),
        Some(json!({ "content": "hello bob" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let created = next_event(&mut bob_ws, "MessageCreate").await.expect("bob missed the message");
    assert_eq!(created["data"]["conversation_id"], cid.as_str());
    assert_eq!(created["data"]["content"], "hello bob");
    assert_eq!(created["data"]["sender_name"], "ada");

    let typing = json!({ "type": "StartTyping", "data": { "conversation_id": cid } });
    ada_ws.send(Message::text(typing.to_string())).await.unwrap();

    let typing = next_event(&mut bob_ws, "TypingStart").await.expect("bob missed typing");
    assert_eq!(typing["data"]["name"], "ada");
    assert_eq!(typing["data"]["conversation_id"], cid.as_str());

    let seen = drain(&mut eve_ws, Duration::from_millis(500)).await;
    assert!(
        seen.iter().all(|e| e["data"]["conversation_id"].is_null()),
        "outsider saw conversation events: {:?}",
        seen
    );
}

#[tokio::test]
async fn socket_and_rest_presence_agree() {
    let app = app();
    let addr = serve(&app).await;
    let (ada, ada_id) = sign_in(&app, "ada").await;
    let (bob, _) = sign_in(&app, "bob").await;

    let mut bob_ws = connect(addr, &bob).await;
    let mut ada_ws = connect(addr, &ada).await;

    let (_, map) = call(&app, Method::GET, "/presence", Some(&bob), None).await;
    assert_eq!(map[&ada_id]["online"], true);

    ada_ws.close(None).await.unwrap();
    let offline = loop {
        let event = next_event(&mut bob_ws, "PresenceUpdate").await.expect("no offline update");
        if event["data"]["user_id"] == ada_id.as_str() && event["data"]["online"] == false {
            break event;
        }
    };
    assert!(offline["data"]["last_seen_at"].is_string());

    let (_, map) = call(&app, Method::GET, "/presence", Some(&bob), None).await;
    assert_eq!(map[&ada_id]["online"], false);
    let (_, online) = call(&app, Method::GET, "/presence/online", Some(&bob), None).await;
    assert!(!online.as_array().unwrap().iter().any(|id| id == ada_id.as_str()));

    let _ada_ws = connect(addr, &ada).await;
    let (_, map) = call(&app, Method::GET, "/presence", Some(&bob), None).await;
    assert_eq!(map[&ada_id]["online"], true);
}

#[tokio::test]
async fn newcomer_is_told_who_is_online() {
    let app = app();
    let addr = serve(&app).await;
    let (ada, ada_id) = sign_in(&app, "ada").await;
    let (bob, _) = sign_in(&app, "bob").await;

    let _ada_ws = connect(addr, &ada).await;
    let mut bob_ws = open(addr, &bob).await;

    let ready = next_event(&mut bob_ws, "Ready").await.expect("no Ready");
    assert_eq!(ready["data"]["name"], "bob");
    let peer = next_event(&mut bob_ws, "PresenceUpdate").await.expect("no peer presence");
    assert_eq!(peer["data"]["user_id"], ada_id.as_str());
    assert_eq!(peer["data"]["online"], true);
}

#[tokio::test]
async fn identify_rejects_unsynced_and_forged_tokens() {
    let app = app();
    let addr = serve(&app).await;

    // Valid signature, but the profile was never synced
    let mut ws = open(addr, &token("idp|ghost")).await;
    assert!(drain(&mut ws, WAIT).await.iter().all(|e| e["type"] != "Ready"));

    sign_in(&app, "mallory").await;
    let claims = json!({ "sub": "idp|mallory", "exp": chrono::Utc::now().timestamp() + 3600 });
    let forged = encode(&Header::default(), &claims, &EncodingKey::from_secret(b"wrong")).unwrap();
    let mut ws = open(addr, &forged).await;
    assert!(drain(&mut ws, WAIT).await.iter().all(|e| e["type"] != "Ready"));
}

use std::time::Duration;

use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};
use uuid::Uuid;

use parley_types::api::{
    Claims, RegisterPushTokenRequest, SendNotificationRequest, SendNotificationResponse,
    UnregisterPushTokenRequest,
};
use parley_types::time::now_ms;

use crate::error::ApiError;
use crate::extract::Json;
use crate::state::AppState;

/// Longest notification body, in characters.
pub const MAX_BODY_CHARS: usize = 100;
pub const DEFAULT_BODY: &str = "New message";
const CLICK_LINK: &str = "/chat";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push delivery is not configured")]
    Disabled,

    #[error("push request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Serialize)]
struct PushPayload<'a> {
    tokens: &'a [String],
    notification: PushText<'a>,
    data: PushText<'a>,
    webpush: WebPush<'a>,
}

#[derive(Debug, Clone, Copy, Serialize)]
struct PushText<'a> {
    title: &'a str,
    body: &'a str,
}

#[derive(Debug, Serialize)]
struct WebPush<'a> {
    fcm_options: FcmOptions<'a>,
}

#[derive(Debug, Serialize)]
struct FcmOptions<'a> {
    link: &'a str,
}

/// Per-token delivery counts reported by the push gateway.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct PushOutcome {
    #[serde(default)]
    pub success_count: usize,
    #[serde(default)]
    pub failure_count: usize,
}

/// HTTP client for the multicast push gateway. Disabled when no endpoint is configured.
#[derive(Clone)]
pub struct PushClient {
    target: Option<PushTarget>,
}

#[derive(Clone)]
struct PushTarget {
    http: reqwest::Client,
    endpoint: String,
    key: Option<String>,
}

impl PushClient {
    pub fn new(endpoint: Option<String>, key: Option<String>) -> Result<Self, PushError> {
        let Some(endpoint) = endpoint else {
            return Ok(Self::disabled());
        };
        let http = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            target: Some(PushTarget { http, endpoint, key }),
        })
    }

    pub fn disabled() -> Self {
        Self { target: None }
    }

    pub fn is_enabled(&self) -> bool {
        self.target.is_some()
    }

    /// Send one notification to every token in a single multicast request.
    pub async fn send(&self, tokens: &[String], title: &str, body: &str) -> Result<PushOutcome, PushError> {
        let target = self.target.as_ref().ok_or(PushError::Disabled)?;
        if tokens.is_empty() {
            return Ok(PushOutcome::default());
        }

        let text = PushText { title, body };
        let payload = PushPayload {
            tokens,
            notification: text,
            data: text,
            webpush: WebPush {
                fcm_options: FcmOptions { link: CLICK_LINK },
            },
        };

        let mut request = target.http.post(&target.endpoint).json(&payload);
        if let Some(key) = &target.key {
            request = request.bearer_auth(key);
        }

        let outcome: PushOutcome = request.send().await?.error_for_status()?.json().await?;
        if outcome.failure_count > 0 {
            warn!(
                "Push delivery failed for {} of {} tokens",
                outcome.failure_count,
                tokens.len()
            );
        }
        Ok(outcome)
    }
}

/// Notification body: the message cut to `MAX_BODY_CHARS`, or the default when empty.
pub fn notification_body(body: Option<&str>) -> String {
    match body.map(str::trim) {
        Some(text) if !text.is_empty() => text.chars().take(MAX_BODY_CHARS).collect(),
        _ => DEFAULT_BODY.to_string(),
    }
}

/// Notify the other participants of a conversation about a new message.
/// Runs detached; failures are only logged.
pub fn spawn_fan_out(state: AppState, sender_id: Uuid, sender_name: String, conversation_id: Uuid, body: String) {
    if !state.push.is_enabled() {
        return;
    }

    tokio::spawn(async move {
        let tokens = state
            .blocking(move |db| {
                let recipients = db.other_participant_ids(sender_id, conversation_id)?;
                db.push_tokens_for(&recipients)
            })
            .await;

        let tokens = match tokens {
            Ok(tokens) if tokens.is_empty() => {
                debug!("No push tokens for conversation {}", conversation_id);
                return;
            }
            Ok(tokens) => tokens,
            Err(e) => {
                warn!("Push fan-out for {} skipped: {}", conversation_id, e);
                return;
            }
        };

        let body = notification_body(Some(&body));
        if let Err(e) = state.push.send(&tokens, &sender_name, &body).await {
            warn!("Push fan-out for {} failed: {}", conversation_id, e);
        }
    });
}

pub async fn register_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RegisterPushTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let now = now_ms();
    state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.register_push_token(me.id, &req.token, req.user_agent.as_deref(), now)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn unregister_token(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<UnregisterPushTokenRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let removed = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.unregister_push_token(me.id, &req.token)
        })
        .await?;
    debug!("Push token unregistered: {}", removed);
    Ok(StatusCode::NO_CONTENT)
}

/// Explicit notification request from a client.
pub async fn send_notification(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendNotificationRequest>,
) -> Result<Json<SendNotificationResponse>, ApiError> {
    let sender_name = req
        .sender_name
        .as_deref()
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string);
    let Some(sender_name) = sender_name.filter(|_| !req.recipient_user_ids.is_empty()) else {
        return Err(ApiError::BadRequest("missing recipient_user_ids or sender_name"));
    };
    if !state.push.is_enabled() {
        return Err(ApiError::PushDisabled);
    }

    let recipients = req.recipient_user_ids;
    let tokens = state
        .blocking(move |db| {
            db.require_user(&claims.sub)?;
            db.push_tokens_for(&recipients)
        })
        .await?;

    if tokens.is_empty() {
        warn!("Push send: no tokens found for recipients");
        return Ok(Json(SendNotificationResponse {
            ok: true,
            sent: 0,
            tokens_found: 0,
        }));
    }

    let body = notification_body(req.body.as_deref());
    let outcome = state
        .push
        .send(&tokens, &sender_name, &body)
        .await
        .map_err(|e| {
            warn!("Push send failed: {}", e);
            ApiError::Internal
        })?;

    info!("Push sent to {} of {} tokens", outcome.success_count, tokens.len());
    Ok(Json(SendNotificationResponse {
        ok: true,
        sent: outcome.success_count,
        tokens_found: tokens.len(),
    }))
}

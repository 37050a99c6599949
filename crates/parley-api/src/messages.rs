use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use uuid::Uuid;

use parley_types::api::{Claims, EditMessageRequest, ForwardMessageRequest, SendMessageRequest};
use parley_types::events::GatewayEvent;
use parley_types::models::{Message, MessagePage, SearchHit};
use parley_types::time::{from_millis, now_ms};

use crate::error::ApiError;
use crate::extract::{Json, Path, Query};
use crate::push;
use crate::state::AppState;
use crate::views;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    pub limit: Option<u32>,
    /// `next_cursor` of the previous page; fetches older messages.
    pub cursor: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
}

pub async fn list(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<MessagePage>, ApiError> {
    let page = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.list_messages(me.id, conversation_id, query.limit, query.cursor)
        })
        .await?;

    Ok(Json(MessagePage {
        messages: page.messages.into_iter().map(views::message).collect(),
        next_cursor: page.next_cursor,
    }))
}

pub async fn send(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let now = now_ms();
    let view = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            let row = db.send_message(me.id, conversation_id, &req.content, req.reply_to_message_id, now)?;
            db.message_view(me.id, row.id)
        })
        .await?;

    let message = views::message(view);
    announce_new(&state, &message).await;
    Ok((StatusCode::CREATED, Json(message)))
}

pub async fn search(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<SearchQuery>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<SearchHit>>, ApiError> {
    let hits = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.search_messages(me.id, conversation_id, &query.q, query.limit)
        })
        .await?;
    Ok(Json(hits.into_iter().map(views::search_hit).collect()))
}

pub async fn edit(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<EditMessageRequest>,
) -> Result<Json<Message>, ApiError> {
    let now = now_ms();
    let view = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.edit_message(me.id, message_id, &req.content, now)?;
            db.message_view(me.id, message_id)
        })
        .await?;

    let message = views::message(view);
    state
        .notify_conversation(GatewayEvent::MessageUpdate {
            id: message.id,
            conversation_id: message.conversation_id,
            content: message.content.clone(),
            edited_at: message.edited_at.unwrap_or_else(|| from_millis(now)),
        })
        .await;

    Ok(Json(message))
}

/// Soft delete. Deleting an already deleted message is a no-op.
pub async fn delete(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Message>, ApiError> {
    let now = now_ms();
    let view = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.soft_delete_message(me.id, message_id, now)?;
            db.message_view(me.id, message_id)
        })
        .await?;

    let message = views::message(view);
    state
        .notify_conversation(GatewayEvent::MessageDelete {
            id: message.id,
            conversation_id: message.conversation_id,
        })
        .await;

    Ok(Json(message))
}

pub async fn forward(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ForwardMessageRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let now = now_ms();
    let view = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            let row = db.forward_message(me.id, message_id, req.target_conversation_id, now)?;
            db.message_view(me.id, row.id)
        })
        .await?;

    let message = views::message(view);
    announce_new(&state, &message).await;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Gateway event plus push fan-out for a freshly stored message.
async fn announce_new(state: &AppState, message: &Message) {
    state
        .notify_conversation(GatewayEvent::MessageCreate {
            id: message.id,
            conversation_id: message.conversation_id,
            sender_id: message.sender_id,
            sender_name: message.sender_name.clone(),
            content: message.content.clone(),
            reply_to_message_id: message.reply_to_message_id,
            created_at: message.created_at,
        })
        .await;

    push::spawn_fan_out(
        state.clone(),
        message.sender_id,
        message.sender_name.clone(),
        message.conversation_id,
        message.content.clone(),
    );
}

use axum::{
    Extension,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{
    Claims, ConversationCreated, CreateDirectRequest, CreateGroupRequest, MarkReadRequest,
};
use parley_types::events::GatewayEvent;
use parley_types::models::{ConversationDetail, ConversationSummary, UserBrief};
use parley_types::time::{from_millis, now_ms};

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::state::AppState;
use crate::views;

pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<ConversationSummary>>, ApiError> {
    let rows = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.list_conversations(me.id)
        })
        .await?;
    Ok(Json(rows.into_iter().map(views::conversation_summary).collect()))
}

/// Open (or reuse) the 1:1 conversation with another user.
pub async fn create_direct(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateDirectRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let now = now_ms();
    let (conversation_id, created) = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.get_or_create_direct(me.id, req.other_user_id, now)
        })
        .await?;

    let status = if created {
        state
            .notify_conversation(GatewayEvent::ConversationCreate { conversation_id })
            .await;
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    Ok((status, Json(ConversationCreated { conversation_id, created })))
}

pub async fn create_group(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateGroupRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let now = now_ms();
    let conversation_id = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.create_group(me.id, &req.name, &req.member_ids, now)
        })
        .await?;

    state
        .notify_conversation(GatewayEvent::ConversationCreate { conversation_id })
        .await;

    Ok((
        StatusCode::CREATED,
        Json(ConversationCreated {
            conversation_id,
            created: true,
        }),
    ))
}

pub async fn detail(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ConversationDetail>, ApiError> {
    let row = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.conversation_detail(me.id, conversation_id)
        })
        .await?;
    Ok(Json(views::conversation_detail(row)))
}

pub async fn members(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<UserBrief>>, ApiError> {
    let rows = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.group_members(me.id, conversation_id)
        })
        .await?;
    Ok(Json(rows.into_iter().map(views::user_brief).collect()))
}

pub async fn leave(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let user_id = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.leave_group(me.id, conversation_id)?;
            Ok(me.id)
        })
        .await?;

    let event = GatewayEvent::MemberLeave {
        conversation_id,
        user_id,
    };
    state.dispatcher.send_to_user(user_id, event.clone()).await;
    state.notify_conversation(event).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Clear the caller's unread counter. The body is optional.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let req: MarkReadRequest = if body.is_empty() {
        MarkReadRequest::default()
    } else {
        serde_json::from_slice(&body).map_err(|e| ApiError::Rejected {
            status: StatusCode::BAD_REQUEST,
            message: format!("Failed to parse the request body as JSON: {}", e),
        })?
    };
    let now = now_ms();
    let participant = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.mark_read(me.id, conversation_id, req.last_read_message_id, now)
        })
        .await?;

    state
        .notify_conversation(GatewayEvent::ReadReceipt {
            conversation_id,
            user_id: participant.user_id,
            last_read_message_id: participant.last_read_message_id,
            read_at: from_millis(participant.last_read_at.unwrap_or(now)),
        })
        .await;

    Ok(StatusCode::NO_CONTENT)
}

use axum::{
    Extension,
    extract::State,
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use parley_types::api::{Claims, SetTypingRequest};
use parley_types::events::GatewayEvent;
use parley_types::models::{PresenceMap, PresenceStatus, TypingUser};
use parley_types::time::{from_millis, now_ms};

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::state::AppState;

/// REST fallback for clients without a gateway connection.
pub async fn heartbeat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let now = now_ms();
    state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.touch_presence(me.id, now)
        })
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn map(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<PresenceMap>, ApiError> {
    let now = now_ms();
    let rows = state
        .blocking(move |db| {
            db.require_user(&claims.sub)?;
            db.presence_map(now)
        })
        .await?;

    Ok(Json(
        rows.into_iter()
            .map(|row| {
                let status = PresenceStatus {
                    online: row.online,
                    last_seen_at: from_millis(row.last_seen_at),
                };
                (row.user_id, status)
            })
            .collect(),
    ))
}

pub async fn online(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<Uuid>>, ApiError> {
    let now = now_ms();
    let ids = state
        .blocking(move |db| {
            db.require_user(&claims.sub)?;
            db.online_user_ids(now)
        })
        .await?;
    Ok(Json(ids))
}

pub async fn set_typing(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetTypingRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let now = now_ms();
    let is_typing = req.is_typing;
    let (me, others) = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.set_typing(me.id, conversation_id, is_typing, now)?;
            let others = db.other_participant_ids(me.id, conversation_id)?;
            Ok((me, others))
        })
        .await?;

    let event = if is_typing {
        GatewayEvent::TypingStart {
            conversation_id,
            user_id: me.id,
            name: me.name,
        }
    } else {
        GatewayEvent::TypingStop {
            conversation_id,
            user_id: me.id,
        }
    };
    state.notify(&others, event).await;

    Ok(StatusCode::NO_CONTENT)
}

/// Who else is typing right now.
pub async fn typing_users(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<TypingUser>>, ApiError> {
    let now = now_ms();
    let rows = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.typing_users(me.id, conversation_id, now)
        })
        .await?;

    Ok(Json(
        rows.into_iter()
            .map(|row| TypingUser {
                id: row.user_id,
                name: row.name,
            })
            .collect(),
    ))
}

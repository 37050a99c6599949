use axum::{Extension, extract::State};
use uuid::Uuid;

use parley_types::api::{Claims, ToggleReactionRequest, ToggleReactionResponse};
use parley_types::events::GatewayEvent;
use parley_types::models::{ReactionMap, ReactionSummary};
use parley_types::time::now_ms;

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::state::AppState;

pub async fn toggle(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ToggleReactionRequest>,
) -> Result<Json<ToggleReactionResponse>, ApiError> {
    let now = now_ms();
    let emoji = req.emoji.clone();
    let (user_id, (added, conversation_id)) = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            Ok((me.id, db.toggle_reaction(me.id, message_id, &emoji, now)?))
        })
        .await?;

    let event = if added {
        GatewayEvent::ReactionAdd {
            message_id,
            conversation_id,
            user_id,
            emoji: req.emoji,
        }
    } else {
        GatewayEvent::ReactionRemove {
            message_id,
            conversation_id,
            user_id,
            emoji: req.emoji,
        }
    };
    state.notify_conversation(event).await;

    Ok(Json(ToggleReactionResponse { added }))
}

/// Tallies for every reacted message of a conversation.
pub async fn for_conversation(
    State(state): State<AppState>,
    Path(conversation_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<ReactionMap>, ApiError> {
    let rows = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.reactions_for_conversation(me.id, conversation_id)
        })
        .await?;

    let map = rows
        .into_iter()
        .map(|(message_id, tallies)| {
            let tallies = tallies
                .into_iter()
                .map(|t| ReactionSummary {
                    emoji: t.emoji,
                    count: t.count,
                    has_reacted: t.has_reacted,
                })
                .collect();
            (message_id, tallies)
        })
        .collect();
    Ok(Json(map))
}

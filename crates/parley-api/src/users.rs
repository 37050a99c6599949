use axum::{Extension, extract::State};
use tracing::info;
use uuid::Uuid;

use parley_db::Error as DbError;
use parley_types::api::{Claims, SyncUserRequest};
use parley_types::models::User;
use parley_types::time::now_ms;

use crate::error::ApiError;
use crate::extract::{Json, Path};
use crate::state::AppState;
use crate::views;

/// Mirror the signed-in identity into the user table. The external id always
/// comes from the verified token, never from the body.
pub async fn sync(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SyncUserRequest>,
) -> Result<Json<User>, ApiError> {
    let now = now_ms();
    let row = state
        .blocking(move |db| {
            let name = if req.name.trim().is_empty() {
                claims.name.as_deref().unwrap_or_default()
            } else {
                req.name.as_str()
            };
            let image_url = req.image_url.as_deref().or(claims.picture.as_deref());
            let email = req.email.as_deref().or(claims.email.as_deref());
            db.sync_user(&claims.sub, name, image_url, email, now)
        })
        .await?;

    info!("Synced user {} ({})", row.name, row.id);
    Ok(Json(views::user(row)))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, ApiError> {
    let row = state.blocking(move |db| db.require_user(&claims.sub)).await?;
    Ok(Json(views::user(row)))
}

/// Everyone except the caller, by name.
pub async fn list(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<Vec<User>>, ApiError> {
    let rows = state
        .blocking(move |db| {
            let me = db.require_user(&claims.sub)?;
            db.list_users_except(me.id)
        })
        .await?;
    Ok(Json(rows.into_iter().map(views::user).collect()))
}

pub async fn get(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<User>, ApiError> {
    let row = state
        .blocking(move |db| {
            db.require_user(&claims.sub)?;
            db.user_by_id(user_id)?.ok_or(DbError::NotFound("user"))
        })
        .await?;
    Ok(Json(views::user(row)))
}

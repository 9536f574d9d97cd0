//! Channel Handlers
//!
//! CRUD over channel records plus the active-users listing. Joining and
//! leaving channels happens over the control channel, not here.

use axum::extract::{Path, State};
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::db::{self, Channel};

use super::error::ApiError;
use super::AppState;

/// Channel creation request.
#[derive(Debug, Deserialize)]
pub struct CreateChannelRequest {
    pub name: String,
    #[serde(default)]
    pub is_public: bool,
}

/// Channel rename request.
#[derive(Debug, Deserialize)]
pub struct UpdateChannelRequest {
    pub name: String,
}

/// A user currently active in a channel.
#[derive(Debug, Serialize)]
pub struct ActiveUserResponse {
    pub id: Uuid,
    pub username: String,
}

fn validate_name(name: &str) -> Result<(), ApiError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed.len() > 100 {
        return Err(ApiError::Validation(
            "channel name must be 1-100 characters".into(),
        ));
    }
    Ok(())
}

/// Create a channel.
///
/// POST /api/channels
pub async fn create_channel(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Json(body): Json<CreateChannelRequest>,
) -> Result<Json<Channel>, ApiError> {
    validate_name(&body.name)?;
    let channel = db::create_channel(&state.db, user.id, body.name.trim(), body.is_public).await?;
    Ok(Json(channel))
}

/// List channels created by the caller.
///
/// GET /api/channels
pub async fn list_my_channels(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Vec<Channel>>, ApiError> {
    let channels = db::list_channels_by_creator(&state.db, user.id).await?;
    Ok(Json(channels))
}

/// List publicly visible channels.
///
/// GET /api/channels/public
pub async fn list_public_channels(
    State(state): State<AppState>,
) -> Result<Json<Vec<Channel>>, ApiError> {
    let channels = db::list_public_channels(&state.db).await?;
    Ok(Json(channels))
}

/// Fetch one channel.
///
/// GET /api/channels/{id}
pub async fn get_channel(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Channel>, ApiError> {
    let channel = db::find_channel_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(channel))
}

/// Rename a channel. Creator only.
///
/// PUT /api/channels/{id}
pub async fn update_channel(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
    Json(body): Json<UpdateChannelRequest>,
) -> Result<Json<Channel>, ApiError> {
    validate_name(&body.name)?;

    let channel = db::find_channel_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if channel.creator_id != user.id {
        return Err(ApiError::Forbidden);
    }

    let updated = db::update_channel_name(&state.db, id, body.name.trim())
        .await?
        .ok_or(ApiError::NotFound)?;
    Ok(Json(updated))
}

/// Delete a channel. Creator only.
///
/// DELETE /api/channels/{id}
pub async fn delete_channel(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    Path(id): Path<Uuid>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let channel = db::find_channel_by_id(&state.db, id)
        .await?
        .ok_or(ApiError::NotFound)?;
    if channel.creator_id != user.id {
        return Err(ApiError::Forbidden);
    }

    db::delete_channel(&state.db, id).await?;
    Ok(Json(serde_json::json!({ "deleted": true })))
}

/// List users currently active in a channel, with IDs.
///
/// GET /api/channels/{id}/active
///
/// The control channel's `participants` frames carry usernames only;
/// this endpoint is the ID-bearing representation.
pub async fn active_users(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<ActiveUserResponse>>, ApiError> {
    if db::find_channel_by_id(&state.db, id).await?.is_none() {
        return Err(ApiError::NotFound);
    }

    let members = state.active.in_channel(id).await;
    let mut users = Vec::with_capacity(members.len());
    for member in members {
        // Users deleted mid-session are skipped rather than failing the
        // whole listing.
        if let Some(user) = db::find_user_by_id(&state.db, member.user_id).await? {
            users.push(ActiveUserResponse {
                id: user.id,
                username: user.username,
            });
        }
    }

    Ok(Json(users))
}

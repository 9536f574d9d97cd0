//! Authentication Handlers
//!
//! Registration and login endpoints.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::AppState;
use crate::db;

use super::error::AuthError;
use super::jwt::generate_token;
use super::password::{hash_password, verify_password};

/// Registration request body.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

/// Login request body.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Public user representation.
#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: Uuid,
    pub username: String,
}

/// Response returned after successful register/login.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub token: String,
    pub user: UserResponse,
}

fn validate_credentials(username: &str, password: &str) -> Result<(), AuthError> {
    if username.len() < 3 || username.len() > 32 {
        return Err(AuthError::Validation(
            "username must be 3-32 characters".into(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(AuthError::Validation(
            "username may only contain letters, digits and underscores".into(),
        ));
    }
    if password.len() < 8 {
        return Err(AuthError::Validation(
            "password must be at least 8 characters".into(),
        ));
    }
    Ok(())
}

/// Register a new user.
///
/// POST /api/register
pub async fn register(
    State(state): State<AppState>,
    Json(body): Json<RegisterRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    validate_credentials(&body.username, &body.password)?;

    if db::find_user_by_username(&state.db, &body.username)
        .await?
        .is_some()
    {
        return Err(AuthError::UsernameTaken);
    }

    let password_hash = hash_password(&body.password)?;
    let user = db::create_user(&state.db, &body.username, &password_hash).await?;

    info!(user_id = %user.id, username = %user.username, "User registered");

    let token = generate_token(user.id, &state.config.jwt_secret, state.config.jwt_expiry)?;

    Ok(Json(AuthResponse {
        token,
        user: UserResponse {
            id: user.id,
            username: user.username,
        },
    }))
}

/// Log in with username and password.
///
/// POST /api/login
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<AuthResponse>, AuthError> {
    let user = db::find_user_by_username(&state.db, &body.username)
        .await?
        .ok_or(AuthError::InvalidCredentials)?;

    if !verify_password(&body.password, &user.password_hash)? {
        return Err(AuthError::InvalidCredentials);
    }

    let token = generate_token(user.id, &state.config.jwt_secret, state.config.jwt_expiry)?;

    Ok(Json(AuthResponse {
        token,
        user: UserResponse {
            id: user.id,
            username: user.username,
        },
    }))
}

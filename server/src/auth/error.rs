//! Authentication Errors

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use thiserror::Error;

/// Errors that can occur during authentication.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Missing Authorization header.
    #[error("Missing Authorization header")]
    MissingAuthHeader,

    /// Malformed Authorization header.
    #[error("Invalid Authorization header")]
    InvalidAuthHeader,

    /// Token validation failed.
    #[error("Invalid or expired token")]
    InvalidToken,

    /// No user for the token subject.
    #[error("User not found")]
    UserNotFound,

    /// Username already registered.
    #[error("Username already taken")]
    UsernameTaken,

    /// Wrong username or password.
    #[error("Invalid username or password")]
    InvalidCredentials,

    /// Request validation failed.
    #[error("{0}")]
    Validation(String),

    /// Password hashing failed.
    #[error("Password hashing failed")]
    PasswordHash,

    /// Database error.
    #[error("Database error")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            Self::MissingAuthHeader | Self::InvalidAuthHeader | Self::InvalidToken => {
                (StatusCode::UNAUTHORIZED, "UNAUTHORIZED")
            }
            Self::UserNotFound => (StatusCode::UNAUTHORIZED, "USER_NOT_FOUND"),
            Self::UsernameTaken => (StatusCode::CONFLICT, "USERNAME_TAKEN"),
            Self::InvalidCredentials => (StatusCode::UNAUTHORIZED, "INVALID_CREDENTIALS"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::PasswordHash | Self::Database(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let message = match &self {
            // Do not leak internal causes
            Self::PasswordHash | Self::Database(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };

        let body = Json(serde_json::json!({
            "error": message,
            "code": code,
        }));

        (status, body).into_response()
    }
}

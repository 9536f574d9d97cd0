//! Database Queries
//!
//! Runtime queries (no compile-time `DATABASE_URL` required).

use sqlx::PgPool;
use tracing::error;
use uuid::Uuid;

use super::models::{Channel, User};

/// Log and return a database error with context.
macro_rules! db_error {
    ($query:expr) => {
        |e| {
            error!(query = $query, error = %e, "Database query failed");
            e
        }
    };
    ($query:expr, $($field:tt)*) => {
        |e| {
            error!(query = $query, $($field)*, error = %e, "Database query failed");
            e
        }
    };
}

// ============================================================================
// User Queries
// ============================================================================

/// Create a new user. Fails on duplicate username (unique constraint).
pub async fn create_user(
    pool: &PgPool,
    username: &str,
    password_hash: &str,
) -> sqlx::Result<User> {
    sqlx::query_as::<_, User>(
        "INSERT INTO users (username, password_hash) VALUES ($1, $2) RETURNING *",
    )
    .bind(username)
    .bind(password_hash)
    .fetch_one(pool)
    .await
    .map_err(db_error!("create_user", username = %username))
}

/// Find user by ID.
pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error!("find_user_by_id", user_id = %id))
}

/// Find user by username.
pub async fn find_user_by_username(pool: &PgPool, username: &str) -> sqlx::Result<Option<User>> {
    sqlx::query_as::<_, User>("SELECT * FROM users WHERE username = $1")
        .bind(username)
        .fetch_optional(pool)
        .await
        .map_err(db_error!("find_user_by_username", username = %username))
}

// ============================================================================
// Channel Queries
// ============================================================================

/// Create a new channel.
pub async fn create_channel(
    pool: &PgPool,
    creator_id: Uuid,
    name: &str,
    is_public: bool,
) -> sqlx::Result<Channel> {
    sqlx::query_as::<_, Channel>(
        "INSERT INTO channels (creator_id, name, is_public) VALUES ($1, $2, $3) RETURNING *",
    )
    .bind(creator_id)
    .bind(name)
    .bind(is_public)
    .fetch_one(pool)
    .await
    .map_err(db_error!("create_channel", creator_id = %creator_id))
}

/// Find channel by ID.
pub async fn find_channel_by_id(pool: &PgPool, id: Uuid) -> sqlx::Result<Option<Channel>> {
    sqlx::query_as::<_, Channel>("SELECT * FROM channels WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
        .map_err(db_error!("find_channel_by_id", channel_id = %id))
}

/// Rename a channel. Returns the updated row, or `None` if it does not exist.
pub async fn update_channel_name(
    pool: &PgPool,
    id: Uuid,
    name: &str,
) -> sqlx::Result<Option<Channel>> {
    sqlx::query_as::<_, Channel>(
        "UPDATE channels SET name = $2, updated_at = NOW() WHERE id = $1 RETURNING *",
    )
    .bind(id)
    .bind(name)
    .fetch_optional(pool)
    .await
    .map_err(db_error!("update_channel_name", channel_id = %id))
}

/// Delete a channel. Returns whether a row was removed.
pub async fn delete_channel(pool: &PgPool, id: Uuid) -> sqlx::Result<bool> {
    let result = sqlx::query("DELETE FROM channels WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await
        .map_err(db_error!("delete_channel", channel_id = %id))?;
    Ok(result.rows_affected() > 0)
}

/// List all public channels.
pub async fn list_public_channels(pool: &PgPool) -> sqlx::Result<Vec<Channel>> {
    sqlx::query_as::<_, Channel>(
        "SELECT * FROM channels WHERE is_public ORDER BY created_at DESC",
    )
    .fetch_all(pool)
    .await
    .map_err(db_error!("list_public_channels"))
}

/// List channels created by a user.
pub async fn list_channels_by_creator(pool: &PgPool, creator_id: Uuid) -> sqlx::Result<Vec<Channel>> {
    sqlx::query_as::<_, Channel>(
        "SELECT * FROM channels WHERE creator_id = $1 ORDER BY created_at DESC",
    )
    .bind(creator_id)
    .fetch_all(pool)
    .await
    .map_err(db_error!("list_channels_by_creator", creator_id = %creator_id))
}

//! Database Models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

/// User model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    /// Unique user ID.
    pub id: Uuid,
    /// Unique username for login.
    pub username: String,
    /// Argon2id password hash.
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// When the user was created.
    pub created_at: DateTime<Utc>,
}

/// Voice channel model.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Channel {
    /// Unique channel ID.
    pub id: Uuid,
    /// User who created the channel.
    pub creator_id: Uuid,
    /// Channel name.
    pub name: String,
    /// Whether the channel is listed publicly.
    pub is_public: bool,
    /// When the channel was created.
    pub created_at: DateTime<Utc>,
    /// When the channel was last updated.
    pub updated_at: DateTime<Utc>,
}

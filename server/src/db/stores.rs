//! Postgres-backed store implementations for the signaling layer.

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::voice::{ChannelRef, ChannelStore, UserRef, UserStore};

use super::queries;

/// [`UserStore`] backed by the users table.
#[derive(Clone)]
pub struct PgUserStore {
    pool: PgPool,
}

impl PgUserStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserStore for PgUserStore {
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<UserRef>> {
        let user = queries::find_user_by_id(&self.pool, id).await?;
        Ok(user.map(|u| UserRef {
            id: u.id,
            username: u.username,
        }))
    }
}

/// [`ChannelStore`] backed by the channels table.
#[derive(Clone)]
pub struct PgChannelStore {
    pool: PgPool,
}

impl PgChannelStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChannelStore for PgChannelStore {
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<ChannelRef>> {
        let channel = queries::find_channel_by_id(&self.pool, id).await?;
        Ok(channel.map(|c| ChannelRef {
            id: c.id,
            name: c.name,
        }))
    }
}

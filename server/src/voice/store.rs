//! External Store Contracts
//!
//! The signaling coordinator consumes user and channel records through
//! these minimal seams; persistence lives behind them (Postgres in
//! production, in-memory fakes in tests).

use async_trait::async_trait;
use uuid::Uuid;

/// User record as needed by signaling.
#[derive(Debug, Clone)]
pub struct UserRef {
    pub id: Uuid,
    pub username: String,
}

/// Channel record as needed by signaling.
#[derive(Debug, Clone)]
pub struct ChannelRef {
    pub id: Uuid,
    pub name: String,
}

/// Read access to user records.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<UserRef>>;
}

/// Read access to channel records.
#[async_trait]
pub trait ChannelStore: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> anyhow::Result<Option<ChannelRef>>;
}

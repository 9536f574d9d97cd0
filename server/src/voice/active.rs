//! Active-User Directory
//!
//! Records which users are currently active in which channel. An entry
//! exists exactly while the user holds a live [`super::MediaPeer`] for
//! the same channel; the coordinator maintains that pairing.

use std::collections::HashMap;

use tokio::sync::RwLock;
use uuid::Uuid;

/// A user currently participating in a channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActiveUser {
    pub user_id: Uuid,
    pub channel_id: Uuid,
}

/// Directory of active users, keyed by user.
///
/// `in_channel` scans the map; channel populations are small (tens of
/// users), so no reverse index is kept.
#[derive(Default)]
pub struct ActiveUserDirectory {
    users: RwLock<HashMap<Uuid, ActiveUser>>,
}

impl ActiveUserDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, user: ActiveUser) {
        let mut users = self.users.write().await;
        users.insert(user.user_id, user);
    }

    pub async fn remove(&self, user_id: Uuid) -> Option<ActiveUser> {
        let mut users = self.users.write().await;
        users.remove(&user_id)
    }

    pub async fn get(&self, user_id: Uuid) -> Option<ActiveUser> {
        let users = self.users.read().await;
        users.get(&user_id).copied()
    }

    /// All active users in a channel.
    pub async fn in_channel(&self, channel_id: Uuid) -> Vec<ActiveUser> {
        let users = self.users.read().await;
        users
            .values()
            .filter(|u| u.channel_id == channel_id)
            .copied()
            .collect()
    }
}

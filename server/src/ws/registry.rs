//! Control-Channel Registry
//!
//! Owns each connected user's control-plane writer. At most one
//! [`ControlSession`] exists per user; attaching a second supersedes the
//! first. Writes to one user are serialized through the session's write
//! lock; the registry map itself only guards lookup and insert/remove.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::observability;

use super::events::ServerFrame;

/// Low-level frame writer for one control connection.
///
/// Implemented by the WebSocket sink; tests substitute a capture buffer.
#[async_trait]
pub trait FrameSink: Send + Sync {
    /// Send a text frame.
    async fn send_text(&mut self, text: String) -> Result<(), axum::Error>;
    /// Send a protocol-level ping.
    async fn send_ping(&mut self) -> Result<(), axum::Error>;
    /// Send a close frame. Errors are irrelevant to callers.
    async fn send_close(&mut self);
}

/// One user's control session: the writer plus its serialization lock.
pub struct ControlSession {
    /// Owning user.
    pub user_id: Uuid,
    /// Unique id distinguishing this session from its successors.
    pub session_id: Uuid,
    writer: Mutex<Box<dyn FrameSink>>,
}

impl ControlSession {
    pub fn new(user_id: Uuid, sink: Box<dyn FrameSink>) -> Self {
        Self {
            user_id,
            session_id: Uuid::now_v7(),
            writer: Mutex::new(sink),
        }
    }

    /// Serialize and send one frame. Holds the per-session write lock
    /// for the duration of the write so frames never interleave.
    pub async fn send(&self, frame: &ServerFrame) -> Result<(), axum::Error> {
        let text = serde_json::to_string(frame).map_err(axum::Error::new)?;
        let mut writer = self.writer.lock().await;
        writer.send_text(text).await
    }

    /// Send a protocol-level keep-alive ping.
    pub async fn send_ping(&self) -> Result<(), axum::Error> {
        let mut writer = self.writer.lock().await;
        writer.send_ping().await
    }

    /// Close the underlying connection.
    pub async fn close(&self) {
        let mut writer = self.writer.lock().await;
        writer.send_close().await;
    }
}

/// Registry of connected control sessions, keyed by user.
#[derive(Default)]
pub struct ControlRegistry {
    sessions: RwLock<HashMap<Uuid, Arc<ControlSession>>>,
}

impl ControlRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a session for its user, superseding any prior one.
    ///
    /// Returns the superseded session so the caller can release its
    /// media peer and close its connection; the registry itself never
    /// calls back into the signaling layer.
    pub async fn attach(
        &self,
        session: Arc<ControlSession>,
    ) -> Option<Arc<ControlSession>> {
        let evicted = {
            let mut sessions = self.sessions.write().await;
            sessions.insert(session.user_id, session.clone())
        };

        if evicted.is_none() {
            observability::record_ws_connected();
        }

        evicted
    }

    /// Remove the session for `user_id`, but only if `session_id` still
    /// identifies it. A superseded session's late teardown therefore
    /// cannot remove its successor. Returns whether a removal happened.
    pub async fn detach(&self, user_id: Uuid, session_id: Uuid) -> bool {
        let removed = {
            let mut sessions = self.sessions.write().await;
            match sessions.get(&user_id) {
                Some(current) if current.session_id == session_id => {
                    sessions.remove(&user_id);
                    true
                }
                _ => false,
            }
        };

        if removed {
            observability::record_ws_disconnected();
        }

        removed
    }

    /// Send a frame to a user, if connected.
    ///
    /// Send failures are logged but do not remove the session; the
    /// session's own reader observes the broken connection and drives
    /// teardown.
    pub async fn send(&self, user_id: Uuid, frame: &ServerFrame) {
        let session = {
            let sessions = self.sessions.read().await;
            sessions.get(&user_id).cloned()
        };

        let Some(session) = session else {
            debug!(user_id = %user_id, "Dropping frame for disconnected user");
            return;
        };

        if let Err(e) = session.send(frame).await {
            warn!(user_id = %user_id, error = %e, "Failed to send control frame");
        }
    }

    /// Fetch the session registered for a user.
    pub async fn get(&self, user_id: Uuid) -> Option<Arc<ControlSession>> {
        let sessions = self.sessions.read().await;
        sessions.get(&user_id).cloned()
    }

    /// Users with an attached control session.
    pub async fn connected_users(&self) -> Vec<Uuid> {
        let sessions = self.sessions.read().await;
        sessions.keys().copied().collect()
    }
}


#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::test_support::{attach_session, CaptureSink};
    use super::*;

    #[tokio::test]
    async fn send_reaches_attached_user() {
        let registry = ControlRegistry::new();
        let user = Uuid::new_v4();
        let (_, captured) = attach_session(&registry, user).await;

        registry.send(user, &ServerFrame::Pong).await;

        let captured = captured.lock().await;
        assert_eq!(captured.frames, vec![r#"{"type":"pong"}"#.to_string()]);
    }

    #[tokio::test]
    async fn send_to_unknown_user_is_a_noop() {
        let registry = ControlRegistry::new();
        registry.send(Uuid::new_v4(), &ServerFrame::Pong).await;
    }

    #[tokio::test]
    async fn send_failure_keeps_session_attached() {
        let registry = ControlRegistry::new();
        let user = Uuid::new_v4();

        let (mut sink, _captured) = CaptureSink::new();
        sink.broken = true;
        let session = Arc::new(ControlSession::new(user, Box::new(sink)));
        registry.attach(session).await;

        registry.send(user, &ServerFrame::Pong).await;
        assert!(registry.get(user).await.is_some());
    }

    #[tokio::test]
    async fn attach_supersedes_previous_session() {
        let registry = ControlRegistry::new();
        let user = Uuid::new_v4();

        let (first, _) = attach_session(&registry, user).await;

        let (sink, second_captured) = CaptureSink::new();
        let second = Arc::new(ControlSession::new(user, Box::new(sink)));
        let evicted = registry.attach(second.clone()).await;

        assert_eq!(
            evicted.map(|s| s.session_id),
            Some(first.session_id),
            "prior session must be handed back for teardown"
        );

        // Frames now land on the successor.
        registry.send(user, &ServerFrame::Pong).await;
        assert_eq!(second_captured.lock().await.frames.len(), 1);
    }

    #[tokio::test]
    async fn detach_is_identity_guarded() {
        let registry = ControlRegistry::new();
        let user = Uuid::new_v4();

        let (first, _) = attach_session(&registry, user).await;
        let (second, _) = attach_session(&registry, user).await;

        // The superseded session cannot remove its successor.
        assert!(!registry.detach(user, first.session_id).await);
        assert!(registry.get(user).await.is_some());

        assert!(registry.detach(user, second.session_id).await);
        assert!(registry.get(user).await.is_none());
    }

    #[tokio::test]
    async fn connected_users_lists_attached() {
        let registry = ControlRegistry::new();
        let u1 = Uuid::new_v4();
        let u2 = Uuid::new_v4();
        attach_session(&registry, u1).await;
        attach_session(&registry, u2).await;

        let mut users = registry.connected_users().await;
        users.sort();
        let mut expected = vec![u1, u2];
        expected.sort();
        assert_eq!(users, expected);
    }
}

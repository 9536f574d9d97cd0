//! Media Peers
//!
//! Server-side WebRTC endpoint for one user: the peer connection plus
//! the single outbound Opus track other participants' audio is written
//! to. Peers are owned exclusively by the [`PeerRegistry`]; everything
//! else refers to them by user ID.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use uuid::Uuid;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;

use super::error::VoiceError;

/// One user's media endpoint while joined to a channel.
pub struct MediaPeer {
    /// Owning user.
    pub user_id: Uuid,
    /// Channel the peer is joined to.
    pub channel_id: Uuid,
    /// The WebRTC peer connection.
    pub conn: Arc<RTCPeerConnection>,
    /// Outbound audio track carrying other participants' packets.
    pub audio_track: Arc<TrackLocalStaticRTP>,
}

impl MediaPeer {
    /// Close the underlying peer connection.
    pub async fn close(&self) -> Result<(), VoiceError> {
        self.conn.close().await?;
        Ok(())
    }
}

/// Registry of live media peers, keyed by user.
///
/// Operations on the peer itself are not serialized here; the peer
/// connection synchronizes internally and callers interact with it
/// through the returned `Arc`.
#[derive(Default)]
pub struct PeerRegistry {
    peers: RwLock<HashMap<Uuid, Arc<MediaPeer>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn add(&self, peer: Arc<MediaPeer>) {
        let mut peers = self.peers.write().await;
        peers.insert(peer.user_id, peer);
    }

    pub async fn get(&self, user_id: Uuid) -> Option<Arc<MediaPeer>> {
        let peers = self.peers.read().await;
        peers.get(&user_id).cloned()
    }

    pub async fn remove(&self, user_id: Uuid) -> Option<Arc<MediaPeer>> {
        let mut peers = self.peers.write().await;
        peers.remove(&user_id)
    }
}

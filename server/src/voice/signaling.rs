//! Signaling Coordinator
//!
//! Implements the per-user signaling protocol: validates joins against
//! the channel store, drives SDP exchange and ICE relay on the user's
//! media peer, publishes participant-list updates, and tears state down
//! on leave. All registry mutations for a user funnel through here so
//! the peer registry and active-user directory never disagree.
//!
//! Per user the life cycle is: connected (control session only) →
//! joined (media peer + active entry) → back to connected on leave. A
//! second join while joined implicitly leaves first.

use std::sync::Arc;

use tracing::{debug, error, info, warn};
use uuid::Uuid;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

use crate::observability;
use crate::ws::{ControlRegistry, ParticipantList, ServerFrame, UserAction};

use super::active::{ActiveUser, ActiveUserDirectory};
use super::error::VoiceError;
use super::factory::PeerFactory;
use super::peer::PeerRegistry;
use super::store::{ChannelStore, UserStore};

/// Drives the signaling state machine for all users.
pub struct SignalingCoordinator {
    control: Arc<ControlRegistry>,
    peers: Arc<PeerRegistry>,
    active: Arc<ActiveUserDirectory>,
    factory: Arc<PeerFactory>,
    users: Arc<dyn UserStore>,
    channels: Arc<dyn ChannelStore>,
}

impl SignalingCoordinator {
    pub fn new(
        control: Arc<ControlRegistry>,
        peers: Arc<PeerRegistry>,
        active: Arc<ActiveUserDirectory>,
        factory: Arc<PeerFactory>,
        users: Arc<dyn UserStore>,
        channels: Arc<dyn ChannelStore>,
    ) -> Self {
        Self {
            control,
            peers,
            active,
            factory,
            users,
            channels,
        }
    }

    /// Handle a join request.
    ///
    /// Validation failures are answered with an error frame and succeed
    /// from the session's point of view; the session always survives a
    /// bad join.
    pub async fn handle_join(&self, user_id: Uuid, channel_id: &str) -> Result<(), VoiceError> {
        if channel_id.is_empty() {
            self.control
                .send(user_id, &ServerFrame::error("channel_id is required"))
                .await;
            return Ok(());
        }

        let channel_id = match Uuid::parse_str(channel_id) {
            Ok(id) => id,
            Err(_) => {
                self.control
                    .send(user_id, &ServerFrame::error("invalid channel_id"))
                    .await;
                return Ok(());
            }
        };

        match self.channels.get_by_id(channel_id).await {
            Ok(Some(_)) => {}
            Ok(None) => {
                self.control
                    .send(user_id, &ServerFrame::error("channel not found"))
                    .await;
                return Ok(());
            }
            Err(e) => {
                error!(channel_id = %channel_id, error = %e, "Channel lookup failed");
                self.control
                    .send(user_id, &ServerFrame::error("channel not found"))
                    .await;
                return Ok(());
            }
        }

        // A second join while joined is an implicit leave first.
        if self.peers.get(user_id).await.is_some() {
            debug!(user_id = %user_id, "Already joined, leaving previous channel");
            self.handle_leave(user_id).await?;
        }

        let peer = match self.factory.create_peer(user_id, channel_id).await {
            Ok(peer) => peer,
            Err(e) => {
                error!(user_id = %user_id, channel_id = %channel_id, error = %e, "Failed to create peer");
                return Ok(());
            }
        };

        // Registry order is (peer, active, broadcast); leave unwinds in
        // reverse so no observer sees one without the other.
        self.peers.add(peer).await;
        self.active
            .add(ActiveUser {
                user_id,
                channel_id,
            })
            .await;

        observability::record_voice_join();
        info!(user_id = %user_id, channel_id = %channel_id, "User joined voice channel");

        self.broadcast_participants(channel_id).await;

        Ok(())
    }

    /// Apply a remote SDP offer and answer it on the control channel.
    pub async fn handle_offer(&self, user_id: Uuid, sdp: String) -> Result<(), VoiceError> {
        let peer = self
            .peers
            .get(user_id)
            .await
            .ok_or(VoiceError::PeerNotFound(user_id))?;

        let offer =
            RTCSessionDescription::offer(sdp).map_err(|e| VoiceError::Signaling(e.to_string()))?;
        peer.conn.set_remote_description(offer).await?;

        let answer = peer.conn.create_answer(None).await?;
        peer.conn.set_local_description(answer.clone()).await?;

        self.control
            .send(user_id, &ServerFrame::Answer { sdp: answer.sdp })
            .await;

        Ok(())
    }

    /// Apply a remote SDP answer.
    pub async fn handle_answer(&self, user_id: Uuid, sdp: String) -> Result<(), VoiceError> {
        let peer = self
            .peers
            .get(user_id)
            .await
            .ok_or(VoiceError::PeerNotFound(user_id))?;

        let answer =
            RTCSessionDescription::answer(sdp).map_err(|e| VoiceError::Signaling(e.to_string()))?;
        peer.conn.set_remote_description(answer).await?;

        Ok(())
    }

    /// Add a remote ICE candidate.
    pub async fn handle_candidate(
        &self,
        user_id: Uuid,
        candidate: RTCIceCandidateInit,
    ) -> Result<(), VoiceError> {
        let peer = self
            .peers
            .get(user_id)
            .await
            .ok_or(VoiceError::PeerNotFound(user_id))?;

        peer.conn.add_ice_candidate(candidate).await?;

        Ok(())
    }

    /// Announce a mute state change to the other members.
    ///
    /// Signaling only; the media itself is not gated.
    pub async fn handle_mute(&self, user_id: Uuid, is_muted: bool) -> Result<(), VoiceError> {
        let peer = self
            .peers
            .get(user_id)
            .await
            .ok_or(VoiceError::PeerNotFound(user_id))?;

        let user = self
            .users
            .get_by_id(user_id)
            .await
            .map_err(|e| VoiceError::Store(e.to_string()))?
            .ok_or_else(|| VoiceError::Store(format!("user not found: {user_id}")))?;

        let frame = ServerFrame::UserAction {
            data: UserAction {
                user_name: user.username,
                is_muted,
            },
        };

        for member in self.active.in_channel(peer.channel_id).await {
            if member.user_id == user_id {
                continue;
            }
            self.control.send(member.user_id, &frame).await;
        }

        Ok(())
    }

    /// Tear down the user's media state.
    ///
    /// Succeeds silently when the user holds no media peer, so it is
    /// safe to call from every teardown path. The peer connection is
    /// closed here, at the moment it leaves the registry, and nowhere
    /// else.
    pub async fn handle_leave(&self, user_id: Uuid) -> Result<(), VoiceError> {
        let Some(peer) = self.peers.get(user_id).await else {
            return Ok(());
        };
        let channel_id = peer.channel_id;
        drop(peer);

        self.active.remove(user_id).await;

        if let Some(peer) = self.peers.remove(user_id).await {
            if let Err(e) = peer.close().await {
                warn!(user_id = %user_id, error = %e, "Error closing peer connection");
            }
        }

        info!(user_id = %user_id, channel_id = %channel_id, "User left voice channel");

        self.broadcast_participants(channel_id).await;

        Ok(())
    }

    /// Answer an application-level ping.
    pub async fn handle_ping(&self, user_id: Uuid) {
        self.control.send(user_id, &ServerFrame::Pong).await;
    }

    /// Send the channel's current member list to every active member.
    ///
    /// Usernames are resolved through the user store; members that
    /// cannot be resolved are skipped rather than failing the whole
    /// broadcast, and a failed delivery to one member never blocks the
    /// others.
    pub async fn broadcast_participants(&self, channel_id: Uuid) {
        let members = self.active.in_channel(channel_id).await;

        let mut list = Vec::with_capacity(members.len());
        for member in &members {
            match self.users.get_by_id(member.user_id).await {
                Ok(Some(user)) => list.push(user.username),
                Ok(None) => {
                    debug!(user_id = %member.user_id, "Skipping unresolvable participant");
                }
                Err(e) => {
                    warn!(user_id = %member.user_id, error = %e, "Participant lookup failed");
                }
            }
        }

        let frame = ServerFrame::Participants {
            data: ParticipantList { list },
        };

        for member in &members {
            self.control.send(member.user_id, &frame).await;
        }
    }
}

#[cfg(test)]
#[path = "signaling_test.rs"]
mod signaling_test;

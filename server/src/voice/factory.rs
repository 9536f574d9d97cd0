//! Peer Factory
//!
//! Builds media peers: a shared WebRTC API instance configured for
//! Opus audio, ICE servers derived from configuration, and the per-peer
//! callbacks (inbound-track fan-out, local-candidate relay).

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::{MediaEngine, MIME_TYPE_OPUS};
use webrtc::api::{APIBuilder, API};
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::interceptor::registry::Registry;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::rtp_transceiver::rtp_codec::{
    RTCRtpCodecCapability, RTCRtpCodecParameters, RTPCodecType,
};
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;

use crate::config::Config;
use crate::ws::{ControlRegistry, ServerFrame};

use super::active::ActiveUserDirectory;
use super::error::VoiceError;
use super::forward::spawn_audio_forwarder;
use super::peer::{MediaPeer, PeerRegistry};

/// Constructs media peers wired into the registries.
pub struct PeerFactory {
    api: API,
    ice_servers: Vec<RTCIceServer>,
    control: Arc<ControlRegistry>,
    peers: Arc<PeerRegistry>,
    active: Arc<ActiveUserDirectory>,
}

impl PeerFactory {
    /// Build the shared WebRTC API (Opus-only media engine plus default
    /// interceptors) and capture the effective ICE server list.
    pub fn new(
        config: &Config,
        control: Arc<ControlRegistry>,
        peers: Arc<PeerRegistry>,
        active: Arc<ActiveUserDirectory>,
    ) -> Result<Self, VoiceError> {
        let mut media_engine = MediaEngine::default();

        media_engine.register_codec(
            RTCRtpCodecParameters {
                capability: RTCRtpCodecCapability {
                    mime_type: MIME_TYPE_OPUS.to_owned(),
                    clock_rate: 48000,
                    channels: 2,
                    sdp_fmtp_line: "minptime=10;useinbandfec=1".to_owned(),
                    rtcp_feedback: vec![],
                },
                payload_type: 111,
                ..Default::default()
            },
            RTPCodecType::Audio,
        )?;

        let mut registry = Registry::new();
        registry = register_default_interceptors(registry, &mut media_engine)
            .map_err(|e| VoiceError::WebRtc(e.to_string()))?;

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_interceptor_registry(registry)
            .build();

        let ice_servers = vec![
            RTCIceServer {
                urls: vec![config.stun_server.clone()],
                ..Default::default()
            },
            RTCIceServer {
                urls: vec![config.turn_url("udp")],
                username: config.turn_username.clone(),
                credential: config.turn_password.clone(),
                ..Default::default()
            },
            RTCIceServer {
                urls: vec![config.turn_url("tcp")],
                username: config.turn_username.clone(),
                credential: config.turn_password.clone(),
                ..Default::default()
            },
        ];

        info!("Peer factory initialized");

        Ok(Self {
            api,
            ice_servers,
            control,
            peers,
            active,
        })
    }

    /// Create a media peer for a user joining a channel.
    ///
    /// The peer carries one outbound Opus track; its inbound tracks each
    /// get a fan-out worker, and its local ICE candidates are relayed to
    /// the owning user's control channel. On partial failure the
    /// half-built connection is closed before the error is returned.
    pub async fn create_peer(
        &self,
        user_id: Uuid,
        channel_id: Uuid,
    ) -> Result<Arc<MediaPeer>, VoiceError> {
        let conn = Arc::new(
            self.api
                .new_peer_connection(RTCConfiguration {
                    ice_servers: self.ice_servers.clone(),
                    ..Default::default()
                })
                .await?,
        );

        let audio_track = Arc::new(TrackLocalStaticRTP::new(
            RTCRtpCodecCapability {
                mime_type: MIME_TYPE_OPUS.to_owned(),
                ..Default::default()
            },
            "audio".to_owned(),
            "roomcast".to_owned(),
        ));

        if let Err(e) = conn
            .add_track(audio_track.clone() as Arc<dyn TrackLocal + Send + Sync>)
            .await
        {
            let _ = conn.close().await;
            return Err(e.into());
        }

        // Inbound tracks: one fan-out worker per track. The callback runs
        // on a library thread, so it only spawns and returns.
        let peers = self.peers.clone();
        let active = self.active.clone();
        conn.on_track(Box::new(move |track, _receiver, _transceiver| {
            let peers = peers.clone();
            let active = active.clone();

            debug!(
                user_id = %user_id,
                channel_id = %channel_id,
                track_id = %track.id(),
                kind = ?track.kind(),
                "Received track from peer"
            );

            Box::pin(async move {
                spawn_audio_forwarder(user_id, track, peers, active);
            })
        }));

        // Local ICE candidates go back to the user as candidate frames.
        let control = self.control.clone();
        conn.on_ice_candidate(Box::new(move |candidate| {
            let control = control.clone();

            Box::pin(async move {
                let Some(candidate) = candidate else { return };
                match candidate.to_json() {
                    Ok(init) => {
                        control
                            .send(user_id, &ServerFrame::Candidate { candidate: init })
                            .await;
                    }
                    Err(e) => {
                        warn!(user_id = %user_id, error = %e, "Failed to serialize ICE candidate");
                    }
                }
            })
        }));

        conn.on_peer_connection_state_change(Box::new(move |state: RTCPeerConnectionState| {
            Box::pin(async move {
                debug!(
                    user_id = %user_id,
                    channel_id = %channel_id,
                    state = ?state,
                    "Peer connection state changed"
                );

                if matches!(
                    state,
                    RTCPeerConnectionState::Failed | RTCPeerConnectionState::Disconnected
                ) {
                    // Teardown is driven by the control channel; the
                    // coordinator closes the peer when it removes it.
                    warn!(user_id = %user_id, "Peer connection failed/disconnected");
                }
            })
        }));

        Ok(Arc::new(MediaPeer {
            user_id,
            channel_id,
            conn,
            audio_track,
        }))
    }
}

//! RTP Audio Fan-Out
//!
//! One worker per inbound audio track. Each received packet is written
//! unmodified to every other active member's outbound track; the server
//! never buffers, reorders, or rewrites media.

use std::sync::Arc;

use tokio::spawn;
use tracing::{debug, warn};
use uuid::Uuid;
use webrtc::rtp::packet::Packet as RtpPacket;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::TrackLocalWriter;
use webrtc::track::track_remote::TrackRemote;

use crate::observability;

use super::active::ActiveUserDirectory;
use super::peer::PeerRegistry;

/// Spawn the forwarding worker for one inbound track.
///
/// The worker exits when the track read fails (end of stream, peer
/// closed, or any transport error); teardown of the peer itself is the
/// coordinator's business.
pub fn spawn_audio_forwarder(
    source_user_id: Uuid,
    track: Arc<TrackRemote>,
    peers: Arc<PeerRegistry>,
    active: Arc<ActiveUserDirectory>,
) {
    spawn(async move {
        if track.kind() != RTPCodecType::Audio {
            warn!(
                source = %source_user_id,
                kind = ?track.kind(),
                "Ignoring non-audio track"
            );
            return;
        }

        let mut buf = vec![0u8; 1500]; // MTU size

        loop {
            match track.read(&mut buf).await {
                Ok((packet, _attributes)) => {
                    forward_packet(source_user_id, &packet, &peers, &active).await;
                }
                Err(e) => {
                    debug!(source = %source_user_id, error = %e, "Track read ended");
                    break;
                }
            }
        }
    });
}

/// Write one packet to every other active member of the sender's
/// current channel.
///
/// The sender's channel is resolved through the directory on every
/// packet, so a worker left over from a previous join goes silent as
/// soon as the directory entry changes. Per-recipient write failures
/// are logged and skipped; one slow or broken subscriber never blocks
/// the rest.
async fn forward_packet(
    source_user_id: Uuid,
    packet: &RtpPacket,
    peers: &PeerRegistry,
    active: &ActiveUserDirectory,
) {
    let Some(sender) = active.get(source_user_id).await else {
        return;
    };

    for member in active.in_channel(sender.channel_id).await {
        if member.user_id == source_user_id {
            continue;
        }

        let Some(peer) = peers.get(member.user_id).await else {
            warn!(
                source = %source_user_id,
                recipient = %member.user_id,
                "Active user has no media peer"
            );
            continue;
        };

        if let Err(e) = peer.audio_track.write_rtp(packet).await {
            warn!(
                source = %source_user_id,
                recipient = %member.user_id,
                error = %e,
                "Failed to forward RTP packet"
            );
        } else {
            observability::record_rtp_forwarded();
        }
    }
}

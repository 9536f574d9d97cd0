//! Control-Channel Wire Format
//!
//! Every frame is a JSON object. Inbound frames arrive as an envelope
//! `{"type": <string>, "data": <object>}` whose payload is decoded
//! according to the type; outbound frames are serialized from
//! [`ServerFrame`].

use serde::{Deserialize, Serialize};
use serde_json::value::RawValue;
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;

/// Inbound envelope. `data` is decoded per `type` by the session loop.
#[derive(Debug, Deserialize)]
pub struct ClientFrame {
    /// Message type: join, offer, answer, candidate, mute, leave, ping.
    #[serde(rename = "type")]
    pub kind: String,
    /// Type-specific payload.
    #[serde(default)]
    pub data: Option<Box<RawValue>>,
}

impl ClientFrame {
    /// Decode the payload for this frame.
    ///
    /// A missing `data` member is treated as an empty object so that
    /// payload-less frames (`leave`, `ping`) and clients that omit the
    /// member entirely both parse.
    pub fn payload<'de, T: Deserialize<'de>>(&'de self) -> serde_json::Result<T> {
        match &self.data {
            Some(raw) => serde_json::from_str(raw.get()),
            None => serde_json::from_str("{}"),
        }
    }
}

/// `join` payload.
#[derive(Debug, Deserialize)]
pub struct JoinData {
    /// Channel to join, as a UUID string. Validated by the coordinator.
    #[serde(default)]
    pub channel_id: String,
}

/// `offer` / `answer` payload.
#[derive(Debug, Deserialize)]
pub struct SdpData {
    /// SDP text.
    pub sdp: String,
}

/// `candidate` payload.
#[derive(Debug, Deserialize)]
pub struct CandidateData {
    /// ICE candidate init object.
    pub candidate: RTCIceCandidateInit,
}

/// `mute` payload.
#[derive(Debug, Deserialize)]
pub struct MuteData {
    pub is_muted: bool,
}

/// Participant list carried by `participants` frames.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ParticipantList {
    /// Usernames of the channel's active members.
    pub list: Vec<String>,
}

/// Body of a `user_action` frame.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserAction {
    pub user_name: String,
    pub is_muted: bool,
}

/// Outbound frames emitted by the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    /// SDP answer to a client's offer.
    Answer { sdp: String },
    /// Server-side ICE candidate relayed to the client.
    Candidate { candidate: RTCIceCandidateInit },
    /// Active-member list for the client's channel.
    Participants { data: ParticipantList },
    /// Another member's mute state changed.
    UserAction { data: UserAction },
    /// Reply to an application-level ping.
    Pong,
    /// Validation or collaborator error.
    Error { message: String },
}

impl ServerFrame {
    /// Error frame with the given reason.
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

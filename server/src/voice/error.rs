//! Voice Service Errors

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur during signaling and media handling.
#[derive(Debug, Error)]
pub enum VoiceError {
    /// No media peer registered for the user.
    #[error("peer not found: {0}")]
    PeerNotFound(Uuid),

    /// WebRTC error.
    #[error("WebRTC error: {0}")]
    WebRtc(String),

    /// Signaling error.
    #[error("signaling error: {0}")]
    Signaling(String),

    /// External store (user/channel lookup) failed.
    #[error("store error: {0}")]
    Store(String),
}

impl From<webrtc::Error> for VoiceError {
    fn from(err: webrtc::Error) -> Self {
        Self::WebRtc(err.to_string())
    }
}
